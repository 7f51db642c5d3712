use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use pacekeeper::{
    db::{Database, MemoryRecorder, SessionRecorder},
    geo::format_pace,
    source::{ReplaySource, SimulatedRun},
    IntervalPlan, SessionSummary, SettingsStore, TrackerSettings, TrackingController,
    TrackingError,
};

#[derive(Parser)]
#[command(name = "pacekeeper", version, about = "Track runs from recorded or simulated GPS fixes")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// SQLite database for finished sessions (kept in memory when omitted)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON array of position samples through the engine
    Replay {
        file: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Generate a jittered straight-line run and track it
    Simulate {
        #[arg(long, default_value_t = 60)]
        seconds: u32,
        /// Target pace in seconds per kilometer
        #[arg(long, default_value_t = 330.0)]
        pace: f64,
        #[arg(long, default_value_t = 1.5)]
        jitter: f64,
        /// Throw every n-th fix off course (0 = never)
        #[arg(long, default_value_t = 0)]
        spike_every: u32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List recorded sessions
    History,
}

#[derive(Args)]
struct RunArgs {
    /// Deliver fixes faster than real time. Durations are wall-clock, so pace shrinks too.
    #[arg(long, default_value_t = 1.0)]
    speedup: f64,
    #[arg(long, requires = "rest")]
    work: Option<u32>,
    #[arg(long, requires = "work")]
    rest: Option<u32>,
    /// Number of work/rest rounds (0 = until stopped)
    #[arg(long, default_value_t = 0)]
    intervals: u32,
    #[arg(long)]
    notes: Option<String>,
    /// Print engine events as JSON lines
    #[arg(long)]
    events: bool,
}

impl RunArgs {
    fn plan(&self) -> Option<IntervalPlan> {
        match (self.work, self.rest) {
            (Some(work), Some(rest)) => Some(IntervalPlan::new(work, rest, self.intervals)),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pacekeeper::init_logging();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => SettingsStore::new(path.clone())?.settings(),
        None => TrackerSettings::default(),
    };

    match cli.command {
        Command::Replay { file, run } => {
            let source = ReplaySource::from_json_file(&file)?;
            track(&settings, cli.db, source, run).await
        }
        Command::Simulate {
            seconds,
            pace,
            jitter,
            spike_every,
            seed,
            run,
        } => {
            let samples = SimulatedRun {
                seconds,
                pace_seconds_per_km: pace,
                jitter_meters: jitter,
                spike_every,
                seed,
                started_at_millis: chrono::Utc::now().timestamp_millis(),
                ..SimulatedRun::default()
            }
            .generate();
            track(&settings, cli.db, ReplaySource::new(samples), run).await
        }
        Command::History => {
            let path = cli.db.context("--db is required for history")?;
            let db = Database::new(path)?;
            for session in db.list_sessions().await? {
                println!(
                    "{}  {}  {:>8.2} km  {:>7.0}s  {}  {} fixes{}",
                    session.id,
                    session.started_at.format("%Y-%m-%d %H:%M"),
                    session.distance_meters / 1000.0,
                    session.duration_seconds,
                    format_pace(session.average_pace_seconds_per_km),
                    session.sample_count,
                    session
                        .notes
                        .as_deref()
                        .map(|notes| format!("  \"{notes}\""))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

async fn track(
    settings: &TrackerSettings,
    db: Option<PathBuf>,
    source: ReplaySource,
    run: RunArgs,
) -> Result<()> {
    let source = source.with_speedup(run.speedup)?;
    match db {
        Some(path) => run_session(settings, source, Database::new(path)?, run).await,
        None => run_session(settings, source, MemoryRecorder::new(), run).await,
    }
}

async fn run_session<R: SessionRecorder>(
    settings: &TrackerSettings,
    source: ReplaySource,
    recorder: R,
    run: RunArgs,
) -> Result<()> {
    let span = source.span();
    let (controller, engine) = TrackingController::spawn(settings.engine_config(), source, recorder);

    let printer = run.events.then(|| {
        let mut events = controller.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Ok(line) = serde_json::to_string(&event) {
                            println!("{line}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event printer skipped {skipped} events")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    controller.start(run.plan()).await?;

    // let the last fix land before stopping
    let wait = span.saturating_add(Duration::from_millis(500));
    info!("tracking for {:.1}s; press Ctrl-C to stop early", wait.as_secs_f64());
    tokio::select! {
        _ = tokio::time::sleep(wait) => {}
        _ = tokio::signal::ctrl_c() => warn!("interrupted, stopping session"),
    }

    let result = controller.stop(run.notes).await;
    let metrics = controller.metrics();
    controller.shutdown().await?;
    engine.await.context("engine task panicked")?;
    // the bus closes once the last sender is gone; the printer then drains and exits
    drop(controller);
    if let Some(printer) = printer {
        printer.await.context("event printer panicked")?;
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(err @ TrackingError::PersistenceFailure { .. }) => {
            warn!("{err}");
            err.into_summary().context("persistence failure without summary")?
        }
        Err(err) => return Err(err.into()),
    };

    print_summary(&summary);
    println!(
        "diagnostics: {} accepted, {} rejected, {} queue overflow, {} source errors",
        metrics.accepted_samples,
        metrics.rejected.total(),
        metrics.queue_overflow,
        metrics.source_errors
    );
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!("session   {}", summary.id);
    println!("distance  {:.2} km", summary.distance_meters / 1000.0);
    println!("duration  {:.1}s (paused {:.1}s)", summary.duration_seconds, summary.paused_seconds);
    println!("pace      {}", format_pace(summary.average_pace_seconds_per_km));
    println!(
        "fixes     {} accepted, {} rejected",
        summary.samples.len(),
        summary.rejected_samples
    );
    if let Some(interval) = summary.interval {
        println!(
            "intervals {} completed, ended in {:?}{}",
            interval.completed_intervals,
            interval.phase,
            if interval.finished { " (plan finished)" } else { "" }
        );
    }
}
