use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::SessionRecorder,
    error::{SourceError, TrackingError},
    metrics::{EngineMetrics, MetricsSnapshot},
    models::{IntervalPlan, SessionSummary, TrackingStatus},
    settings::EngineConfig,
    source::{GeoSampleSource, SampleSink, SourceEnvelope, SourceEvent, Subscription},
};

use super::{
    events::TrackingEvent,
    state::{StateEvent, TrackingSnapshot, TrackingState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const COMMAND_QUEUE_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, TrackingError>>;

enum Command {
    Start {
        plan: Option<IntervalPlan>,
        reply: Reply<TrackingSnapshot>,
    },
    Pause {
        reply: Reply<TrackingSnapshot>,
    },
    Resume {
        reply: Reply<TrackingSnapshot>,
    },
    Stop {
        notes: Option<String>,
        reply: Reply<SessionSummary>,
    },
    Snapshot {
        reply: oneshot::Sender<TrackingSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the tracking engine task.
///
/// The engine owns the session exclusively. Lifecycle calls, source
/// deliveries and ticker wakeups are all processed one at a time by that
/// task, so no two mutations ever overlap.
#[derive(Clone)]
pub struct TrackingController {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<TrackingEvent>,
    metrics: EngineMetrics,
}

impl TrackingController {
    pub fn spawn<S, R>(config: EngineConfig, source: S, recorder: R) -> (Self, JoinHandle<()>)
    where
        S: GeoSampleSource,
        R: SessionRecorder,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (source_tx, source_rx) = mpsc::channel(config.sample_queue_capacity);
        let (events, _) = broadcast::channel(config.event_buffer_capacity);
        let metrics = EngineMetrics::new();

        let engine = Engine {
            state: TrackingState::new(config.accumulator),
            config,
            source,
            recorder,
            events: events.clone(),
            metrics: metrics.clone(),
            source_tx,
            subscription: None,
            generation: 0,
            ticks_since_heartbeat: 0,
        };
        let handle = tokio::spawn(engine.run(command_rx, source_rx));

        (
            Self {
                commands: command_tx,
                events,
                metrics,
            },
            handle,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Starts a session; `None` falls back to the configured default plan.
    pub async fn start(&self, plan: Option<IntervalPlan>) -> Result<TrackingSnapshot, TrackingError> {
        self.request(|reply| Command::Start { plan, reply }).await?
    }

    pub async fn pause(&self) -> Result<TrackingSnapshot, TrackingError> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<TrackingSnapshot, TrackingError> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// Finalizes the session and hands it to the recorder.
    ///
    /// On [`TrackingError::PersistenceFailure`] the session is still gone from
    /// the engine; the error carries the summary for a retry.
    pub async fn stop(&self, notes: Option<String>) -> Result<SessionSummary, TrackingError> {
        self.request(|reply| Command::Stop { notes, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<TrackingSnapshot, TrackingError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Closes any live subscription and ends the engine task.
    pub async fn shutdown(&self) -> Result<(), TrackingError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrackingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| TrackingError::EngineUnavailable)?;
        reply_rx.await.map_err(|_| TrackingError::EngineUnavailable)
    }
}

struct Engine<S, R> {
    state: TrackingState,
    config: EngineConfig,
    source: S,
    recorder: R,
    events: broadcast::Sender<TrackingEvent>,
    metrics: EngineMetrics,
    source_tx: mpsc::Sender<SourceEnvelope>,
    subscription: Option<Subscription>,
    generation: u64,
    ticks_since_heartbeat: u32,
}

impl<S, R> Engine<S, R>
where
    S: GeoSampleSource,
    R: SessionRecorder,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut source_rx: mpsc::Receiver<SourceEnvelope>,
    ) {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // queued fixes are folded before any lifecycle call that follows them
                biased;
                Some(envelope) = source_rx.recv() => self.on_source_event(envelope),
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown().await;
                        break;
                    };
                    if !self.handle(command, &mut ticker).await {
                        break;
                    }
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }

        log_info!("tracking engine stopped");
    }

    /// Returns `false` once the engine should exit.
    async fn handle(&mut self, command: Command, ticker: &mut Interval) -> bool {
        match command {
            Command::Start { plan, reply } => {
                let result = self.start(plan);
                if result.is_ok() {
                    ticker.reset();
                }
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Command::Resume { reply } => {
                let result = self.resume();
                if result.is_ok() {
                    ticker.reset();
                }
                let _ = reply.send(result);
            }
            Command::Stop { notes, reply } => {
                let result = self.stop(notes).await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot(Instant::now()));
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, plan: Option<IntervalPlan>) -> Result<TrackingSnapshot, TrackingError> {
        let plan = plan.or(self.config.default_plan);
        let now = Instant::now();
        let events = self.state.start(plan, now, Utc::now())?;

        self.metrics.record_session_started();
        self.ticks_since_heartbeat = 0;
        log_info!(
            "session {} started (intervals: {:?})",
            self.state.session_id().unwrap_or_default(),
            plan
        );

        self.open_subscription();
        self.publish(events);

        let snapshot = self.state.snapshot(now);
        self.emit(TrackingEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    fn pause(&mut self) -> Result<TrackingSnapshot, TrackingError> {
        let now = Instant::now();
        let events = self.state.pause(now)?;
        self.publish(events);

        let snapshot = self.state.snapshot(now);
        log_info!(
            "session paused at {:.1}s active",
            snapshot.active_elapsed_seconds
        );
        self.emit(TrackingEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    fn resume(&mut self) -> Result<TrackingSnapshot, TrackingError> {
        let now = Instant::now();
        self.state.resume(now)?;

        let snapshot = self.state.snapshot(now);
        log_info!(
            "session resumed after {:.1}s paused in total",
            snapshot.paused_seconds
        );
        self.emit(TrackingEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    async fn stop(&mut self, notes: Option<String>) -> Result<SessionSummary, TrackingError> {
        let now = Instant::now();
        let (summary, events) = self.state.stop(notes, now, Utc::now())?;
        self.publish(events);
        self.close_subscription().await;
        self.metrics.record_session_stopped();

        log_info!(
            "session {} stopped: {:.1} m in {:.1}s",
            summary.id,
            summary.distance_meters,
            summary.duration_seconds
        );
        self.emit(TrackingEvent::StateChanged(TrackingSnapshot::stopped(&summary)));

        match self.recorder.persist(&summary).await {
            Ok(()) => {
                self.emit(TrackingEvent::SessionCompleted {
                    summary: summary.clone(),
                    persisted: true,
                });
                Ok(summary)
            }
            Err(err) => {
                self.metrics.record_persistence_failure();
                log_error!("failed to persist session {}: {err:#}", summary.id);
                self.emit(TrackingEvent::SessionCompleted {
                    summary: summary.clone(),
                    persisted: false,
                });
                Err(TrackingError::PersistenceFailure {
                    summary: Box::new(summary),
                    source: err,
                })
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(session_id) = self.state.session_id() {
            log_warn!("engine shutting down with session {session_id} still live; it will not be recorded");
        }
        self.close_subscription().await;
    }

    fn on_tick(&mut self) {
        if self.state.status() != TrackingStatus::Active {
            return;
        }

        let now = Instant::now();
        let events = self.state.tick(now);
        self.publish(events);

        self.ticks_since_heartbeat += 1;
        if self.ticks_since_heartbeat >= self.config.heartbeat_every_ticks {
            self.ticks_since_heartbeat = 0;
            self.emit(TrackingEvent::Heartbeat(self.state.snapshot(now)));
        }
    }

    fn on_source_event(&mut self, envelope: SourceEnvelope) {
        if self.subscription.is_none() || envelope.generation != self.generation {
            self.metrics.record_dropped_stale_subscription();
            return;
        }

        match envelope.event {
            SourceEvent::Sample(sample) => {
                let events = self.state.on_sample(sample);
                self.publish(events);
            }
            SourceEvent::Failed(error) => self.report_source_error(error),
        }
    }

    fn open_subscription(&mut self) {
        self.generation += 1;
        let sink = SampleSink::new(
            self.generation,
            self.source_tx.clone(),
            CancellationToken::new(),
            self.metrics.overflow_counter(),
        );

        match self.source.subscribe(sink) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(error) => self.report_source_error(error),
        }
    }

    async fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(err) = subscription.close().await {
                log_error!("failed to close position source: {err:#}");
            }
        }
    }

    fn report_source_error(&self, error: SourceError) {
        self.metrics.record_source_error();
        log_warn!("position source error: {error}");
        self.emit(TrackingEvent::SourceUnavailable(error));
    }

    fn publish(&self, events: Vec<StateEvent>) {
        for event in events {
            match event {
                StateEvent::Accepted { .. } => self.metrics.record_accepted(),
                StateEvent::Rejected { sample, reason } => {
                    self.metrics.record_rejected(&reason);
                    log_debug!(
                        "rejected fix captured at {}: {:?}",
                        sample.captured_at_millis,
                        reason
                    );
                    self.emit(TrackingEvent::SampleRejected { sample, reason });
                }
                StateEvent::Dropped { sample, status } => {
                    self.metrics.record_dropped_inactive();
                    log_debug!(
                        "dropped fix captured at {} while {}",
                        sample.captured_at_millis,
                        status
                    );
                }
                StateEvent::Interval(event) => {
                    log_info!("interval event: {:?}", event);
                    self.emit(TrackingEvent::Interval(event));
                }
            }
        }
    }

    fn emit(&self, event: TrackingEvent) {
        let _ = self.events.send(event);
    }
}
