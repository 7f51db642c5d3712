use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::geo::AccumulatorConfig;
use crate::models::IntervalPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub max_speed_mps: Option<f64>,
    pub max_accuracy_meters: Option<f64>,
    pub reorder_window_ms: u64,
    pub tick_interval_ms: u64,
    pub heartbeat_every_ticks: u32,
    pub sample_queue_capacity: usize,
    pub event_buffer_capacity: usize,
    pub default_interval_plan: Option<IntervalPlan>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        let accumulator = AccumulatorConfig::default();
        Self {
            max_speed_mps: accumulator.max_speed_mps,
            max_accuracy_meters: accumulator.max_accuracy_meters,
            reorder_window_ms: accumulator.reorder_window_ms,
            tick_interval_ms: 1000,
            heartbeat_every_ticks: 10,
            sample_queue_capacity: 256,
            event_buffer_capacity: 64,
            default_interval_plan: None,
        }
    }
}

impl TrackerSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            accumulator: AccumulatorConfig {
                max_speed_mps: self.max_speed_mps,
                max_accuracy_meters: self.max_accuracy_meters,
                reorder_window_ms: self.reorder_window_ms,
            },
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            heartbeat_every_ticks: self.heartbeat_every_ticks.max(1),
            sample_queue_capacity: self.sample_queue_capacity.max(1),
            event_buffer_capacity: self.event_buffer_capacity.max(1),
            default_plan: self.default_interval_plan,
        }
    }
}

/// Runtime knobs for a [`TrackingController`](crate::tracking::TrackingController).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub accumulator: AccumulatorConfig,
    pub tick_interval: Duration,
    pub heartbeat_every_ticks: u32,
    pub sample_queue_capacity: usize,
    pub event_buffer_capacity: usize,
    /// Used when `start` is called without a plan.
    pub default_plan: Option<IntervalPlan>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        TrackerSettings::default().engine_config()
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings in {}: {err}",
                    path.display()
                );
                TrackerSettings::default()
            })
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> TrackerSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        self.settings().engine_config()
    }

    pub fn update(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings(), TrackerSettings::default());
        assert_eq!(store.engine_config().tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"maxSpeedMps": null, "reorderWindowMs": 3000,
                "defaultIntervalPlan": {"workSeconds": 60, "restSeconds": 30, "totalIntervals": 4}}"#,
        )
        .unwrap();

        let config = SettingsStore::new(path).unwrap().engine_config();
        assert_eq!(config.accumulator.max_speed_mps, None);
        assert_eq!(config.accumulator.reorder_window_ms, 3000);
        assert_eq!(config.default_plan, Some(IntervalPlan::new(60, 30, 4)));
        assert_eq!(config.sample_queue_capacity, 256);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), TrackerSettings::default());
    }

    #[test]
    fn update_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        let settings = TrackerSettings {
            max_accuracy_meters: Some(30.0),
            heartbeat_every_ticks: 5,
            ..TrackerSettings::default()
        };
        store.update(settings.clone()).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.settings(), settings);
    }
}
