use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::time::{self, Duration};

use crate::error::SourceError;
use crate::models::PositionSample;

use super::{GeoSampleSource, SampleSink, Subscription};

/// Plays back a recorded list of fixes, spacing them by their capture times.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Arc<Vec<PositionSample>>,
    speedup: f64,
}

impl ReplaySource {
    pub fn new(samples: Vec<PositionSample>) -> Self {
        Self {
            samples: Arc::new(samples),
            speedup: 1.0,
        }
    }

    /// Plays `speedup` times faster than real time.
    pub fn with_speedup(mut self, speedup: f64) -> Result<Self> {
        if !speedup.is_finite() || speedup <= 0.0 {
            bail!("speedup must be a positive number, got {speedup}");
        }
        self.speedup = speedup;
        Ok(self)
    }

    /// Loads a JSON array of position samples.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read samples from {}", path.display()))?;
        let samples: Vec<PositionSample> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse samples in {}", path.display()))?;
        Ok(Self::new(samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall-clock length of the whole playback at the configured speedup.
    pub fn span(&self) -> Duration {
        (0..self.samples.len())
            .map(|index| self.gap_before(index))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Real-time wait before delivering the fix at `index`.
    fn gap_before(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let delta_ms = self.samples[index]
            .captured_at_millis
            .saturating_sub(self.samples[index - 1].captured_at_millis);
        // out-of-order fixes in the recording are delivered back to back
        Duration::try_from_secs_f64(delta_ms.max(0) as f64 / 1000.0 / self.speedup)
            .unwrap_or(Duration::MAX)
    }
}

impl GeoSampleSource for ReplaySource {
    fn subscribe(&self, sink: SampleSink) -> Result<Subscription, SourceError> {
        if self.samples.is_empty() {
            return Err(SourceError::Unavailable("replay contains no samples".into()));
        }

        let subscription = sink.subscription();
        let replay = self.clone();
        let task = tokio::spawn(async move {
            for index in 0..replay.samples.len() {
                tokio::select! {
                    _ = time::sleep(replay.gap_before(index)) => {
                        sink.on_sample(replay.samples[index]);
                    }
                    _ = sink.closed() => {
                        info!("replay cancelled after {index} samples");
                        return;
                    }
                }
            }
            info!("replay delivered all {} samples", replay.samples.len());
        });

        Ok(subscription.with_task(task))
    }
}
