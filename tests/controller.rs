use std::time::Duration;

use pacekeeper::{
    db::{Database, MemoryRecorder, SessionRecorder},
    models::{IntervalPhase, PositionSample},
    source::ChannelSource,
    tracking::IntervalEvent,
    EngineConfig, IntervalPlan, SourceError, TrackingController, TrackingError, TrackingEvent,
    TrackingStatus, Transition,
};
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Fix `i` of a northbound run covering ~100 m every 10 s.
fn north(i: i64) -> PositionSample {
    PositionSample::new(40.0 + 0.0009 * i as f64, -74.0, i * 10_000)
}

fn spawn_memory() -> (TrackingController, ChannelSource, MemoryRecorder) {
    let source = ChannelSource::new();
    let recorder = MemoryRecorder::new();
    let (controller, _engine) =
        TrackingController::spawn(EngineConfig::default(), source.clone(), recorder.clone());
    (controller, source, recorder)
}

fn drain(events: &mut broadcast::Receiver<TrackingEvent>) -> Vec<TrackingEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[tokio::test(start_paused = true)]
async fn paused_time_is_excluded_from_duration_and_pace() {
    let (controller, source, recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    assert!(source.is_subscribed());
    for i in 0..=3 {
        assert!(source.push(north(i)));
    }
    sleep(Duration::from_secs(30)).await;

    let paused = controller.pause().await.unwrap();
    assert_eq!(paused.status, TrackingStatus::Paused);
    assert_eq!(paused.accepted_samples, 4);
    assert!(close(paused.active_elapsed_seconds, 30.0));

    sleep(Duration::from_secs(20)).await;
    let frozen = controller.snapshot().await.unwrap();
    assert!(close(frozen.active_elapsed_seconds, 30.0));
    assert!(close(frozen.paused_seconds, 20.0));

    controller.resume().await.unwrap();
    for i in 4..=5 {
        assert!(source.push(north(i)));
    }
    sleep(Duration::from_secs(20)).await;

    let summary = controller.stop(Some("tempo".into())).await.unwrap();
    assert!(close(summary.duration_seconds, 50.0));
    assert!(close(summary.paused_seconds, 20.0));
    assert_eq!(summary.samples.len(), 6);
    assert!(summary.distance_meters > 495.0 && summary.distance_meters < 505.0);
    let pace = summary.average_pace_seconds_per_km.unwrap();
    assert!(close(pace, 50.0 / (summary.distance_meters / 1000.0)));
    assert_eq!(summary.notes.as_deref(), Some("tempo"));

    assert_eq!(recorder.sessions(), vec![summary]);
    assert_eq!(
        controller.snapshot().await.unwrap().status,
        TrackingStatus::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn hundred_meters_then_a_pause() {
    let (controller, source, _recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    source.push(PositionSample::new(40.0, -74.0, 0));
    sleep(Duration::from_secs(10)).await;
    source.push(PositionSample::new(40.0009, -74.0, 10_000));

    let moving = controller.snapshot().await.unwrap();
    assert!((moving.distance_meters - 100.0).abs() < 2.0);
    let pace = moving.current_pace_seconds_per_km.unwrap();
    assert!((pace - 100.0).abs() < 2.0, "{pace}");

    controller.pause().await.unwrap();
    sleep(Duration::from_secs(20)).await;
    let resumed = controller.resume().await.unwrap();
    assert!(close(resumed.active_elapsed_seconds, 10.0));

    let summary = controller.stop(None).await.unwrap();
    assert!(close(summary.duration_seconds, 10.0));
    assert!((summary.distance_meters - 100.0).abs() < 2.0);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_calls_from_the_wrong_state_are_refused() {
    let (controller, _source, recorder) = spawn_memory();

    assert!(matches!(
        controller.pause().await,
        Err(TrackingError::InvalidTransition {
            action: Transition::Pause,
            from: TrackingStatus::Idle
        })
    ));
    assert!(controller.stop(None).await.is_err());

    controller.start(None).await.unwrap();
    assert!(matches!(
        controller.start(None).await,
        Err(TrackingError::InvalidTransition {
            action: Transition::Start,
            from: TrackingStatus::Active
        })
    ));
    assert!(controller.resume().await.is_err());
    assert!(recorder.sessions().is_empty());

    controller.stop(None).await.unwrap();
    assert!(matches!(
        controller.start(Some(IntervalPlan::new(30, 0, 3))).await,
        Err(TrackingError::InvalidPlan(_))
    ));
    assert_eq!(
        controller.snapshot().await.unwrap().status,
        TrackingStatus::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn fixes_arriving_while_paused_are_dropped() {
    let (controller, source, _recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    assert!(source.push(north(0)));
    controller.pause().await.unwrap();

    // still subscribed, but the engine discards what arrives
    assert!(source.push(north(1)));
    assert!(source.push(north(2)));
    controller.resume().await.unwrap();

    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.accepted_samples, 1);
    assert_eq!(snapshot.distance_meters, 0.0);
    assert_eq!(controller.metrics().dropped_inactive, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_releases_the_source_subscription() {
    let (controller, source, _recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    controller.stop(None).await.unwrap();
    assert!(!source.is_subscribed());
    assert!(!source.push(north(0)));

    controller.start(None).await.unwrap();
    assert_eq!(source.subscribe_count(), 2);
    assert!(source.is_subscribed());

    controller.shutdown().await.unwrap();
    assert!(!source.is_subscribed());
    assert!(matches!(
        controller.snapshot().await,
        Err(TrackingError::EngineUnavailable)
    ));
}

#[tokio::test(start_paused = true)]
async fn source_failures_are_published_without_ending_the_session() {
    let (controller, source, _recorder) = spawn_memory();
    let mut events = controller.subscribe();

    source.refuse_next_subscribe(SourceError::PermissionDenied);
    let started = controller.start(None).await.unwrap();
    assert_eq!(started.status, TrackingStatus::Active);
    assert!(!source.is_subscribed());
    controller.stop(None).await.unwrap();

    controller.start(None).await.unwrap();
    assert!(source.fail(SourceError::SignalLost));
    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.status, TrackingStatus::Active);

    let failures: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            TrackingEvent::SourceUnavailable(error) => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![SourceError::PermissionDenied, SourceError::SignalLost]
    );
    assert_eq!(controller.metrics().source_errors, 2);
}

#[tokio::test(start_paused = true)]
async fn implausible_jumps_are_rejected_and_announced() {
    let (controller, source, _recorder) = spawn_memory();
    let mut events = controller.subscribe();

    controller.start(None).await.unwrap();
    source.push(north(0));
    // ~1 km in 10 s
    source.push(PositionSample::new(40.009, -74.0, 10_000));
    source.push(north(2));

    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.accepted_samples, 2);
    assert_eq!(snapshot.rejected_samples, 1);
    assert_eq!(controller.metrics().rejected.implausible_speed, 1);

    let rejected = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, TrackingEvent::SampleRejected { .. }))
        .count();
    assert_eq!(rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_hands_back_the_summary() {
    let (controller, source, recorder) = spawn_memory();
    let mut events = controller.subscribe();
    recorder.set_failing(true);

    controller.start(None).await.unwrap();
    source.push(north(0));
    source.push(north(1));
    sleep(Duration::from_secs(10)).await;

    let err = controller.stop(None).await.unwrap_err();
    assert!(matches!(err, TrackingError::PersistenceFailure { .. }));
    let summary = err.into_summary().unwrap();
    assert_eq!(summary.samples.len(), 2);
    assert_eq!(controller.metrics().persistence_failures, 1);

    // the session is gone from the engine either way
    assert_eq!(
        controller.snapshot().await.unwrap().status,
        TrackingStatus::Idle
    );
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        TrackingEvent::SessionCompleted { persisted: false, .. }
    )));

    recorder.set_failing(false);
    recorder.persist(&summary).await.unwrap();
    assert_eq!(recorder.sessions(), vec![summary]);
}

#[tokio::test(start_paused = true)]
async fn interval_plan_runs_to_completion_on_the_ticker() {
    let (controller, _source, _recorder) = spawn_memory();
    let mut events = controller.subscribe();

    controller
        .start(Some(IntervalPlan::new(60, 30, 2)))
        .await
        .unwrap();
    sleep(Duration::from_secs(200)).await;

    let snapshot = controller.snapshot().await.unwrap();
    let interval = snapshot.interval.unwrap();
    assert_eq!(interval.completed_intervals, 2);
    assert!(interval.finished);
    assert_eq!(interval.phase, IntervalPhase::Rest);

    let phases: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            TrackingEvent::Interval(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            IntervalEvent::WorkStarted { interval: 1 },
            IntervalEvent::RestStarted { interval: 1 },
            IntervalEvent::WorkStarted { interval: 2 },
            IntervalEvent::RestStarted { interval: 2 },
            IntervalEvent::IntervalsComplete { completed: 2 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn interval_countdown_holds_while_paused() {
    let (controller, _source, _recorder) = spawn_memory();

    controller
        .start(Some(IntervalPlan::new(60, 30, 0)))
        .await
        .unwrap();
    sleep(Duration::from_millis(10_500)).await;
    controller.pause().await.unwrap();
    sleep(Duration::from_secs(120)).await;

    let paused = controller.snapshot().await.unwrap().interval.unwrap();
    assert_eq!(paused.phase, IntervalPhase::Work);
    assert_eq!(paused.remaining_seconds, 50);

    controller.resume().await.unwrap();
    sleep(Duration::from_millis(50_200)).await;
    let resumed = controller.snapshot().await.unwrap().interval.unwrap();
    assert_eq!(resumed.phase, IntervalPhase::Rest);
    assert_eq!(resumed.completed_intervals, 0);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_follow_the_configured_cadence() {
    let source = ChannelSource::new();
    let config = EngineConfig {
        heartbeat_every_ticks: 5,
        ..EngineConfig::default()
    };
    let (controller, _engine) = TrackingController::spawn(config, source, MemoryRecorder::new());
    let mut events = controller.subscribe();

    controller.start(None).await.unwrap();
    sleep(Duration::from_millis(20_500)).await;

    let heartbeats = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, TrackingEvent::Heartbeat(_)))
        .count();
    assert_eq!(heartbeats, 4);
}

#[tokio::test(start_paused = true)]
async fn bus_closes_after_completion_once_every_handle_is_gone() {
    let source = ChannelSource::new();
    let (controller, engine) =
        TrackingController::spawn(EngineConfig::default(), source.clone(), MemoryRecorder::new());
    let mut events = controller.subscribe();

    controller.start(None).await.unwrap();
    source.push(north(0));
    let summary = controller.stop(None).await.unwrap();
    controller.shutdown().await.unwrap();
    engine.await.unwrap();
    drop(controller);

    let mut completed = None;
    loop {
        match events.recv().await {
            Ok(TrackingEvent::SessionCompleted { summary, persisted }) => {
                completed = Some((summary, persisted));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Closed) => break,
            Err(err) => panic!("unexpected bus error: {err:?}"),
        }
    }
    assert_eq!(completed, Some((summary, true)));
}

#[tokio::test(start_paused = true)]
async fn invalid_coordinates_are_rejected_and_counted() {
    let (controller, source, _recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    source.push(PositionSample::new(f64::NAN, -74.0, 0));
    source.push(north(1));
    source.push(north(2));

    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.accepted_samples, 2);
    assert!((snapshot.distance_meters - 100.0).abs() < 2.0);
    assert_eq!(controller.metrics().rejected.invalid_coordinate, 1);
}

#[tokio::test(start_paused = true)]
async fn extreme_capture_time_does_not_take_the_engine_down() {
    let (controller, source, _recorder) = spawn_memory();

    controller.start(None).await.unwrap();
    source.push(PositionSample::new(40.0, -74.0, 1_000));
    source.push(PositionSample::new(40.0, -74.0, i64::MIN));

    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.status, TrackingStatus::Active);
    assert_eq!(snapshot.rejected_samples, 1);
    assert_eq!(controller.metrics().rejected.stale, 1);
}

#[tokio::test(start_paused = true)]
async fn sessions_land_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();
    let source = ChannelSource::new();
    let (controller, engine) =
        TrackingController::spawn(EngineConfig::default(), source.clone(), db.clone());

    controller
        .start(Some(IntervalPlan::new(5, 5, 1)))
        .await
        .unwrap();
    for i in 0..3 {
        source.push(north(i));
    }
    sleep(Duration::from_secs(20)).await;
    let summary = controller.stop(Some("track".into())).await.unwrap();
    controller.shutdown().await.unwrap();
    engine.await.unwrap();

    let stored = db.get_session_summary(&summary.id).await.unwrap().unwrap();
    assert_eq!(stored.samples, summary.samples);
    assert_eq!(stored.distance_meters, summary.distance_meters);
    assert_eq!(stored.interval, summary.interval);
    assert_eq!(stored.notes.as_deref(), Some("track"));

    let listed = db.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].sample_count, 3);
}
