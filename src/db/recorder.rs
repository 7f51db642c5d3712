use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::models::SessionSummary;

use super::Database;

/// Destination for finished sessions. Called exactly once per stop.
pub trait SessionRecorder: Send + Sync + 'static {
    fn persist(&self, summary: &SessionSummary) -> impl Future<Output = Result<()>> + Send;
}

impl SessionRecorder for Database {
    async fn persist(&self, summary: &SessionSummary) -> Result<()> {
        self.insert_session_summary(summary).await
    }
}

/// Keeps summaries in memory; can be told to fail for retry paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    sessions: Arc<Mutex<Vec<SessionSummary>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        match self.sessions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionRecorder for MemoryRecorder {
    async fn persist(&self, summary: &SessionSummary) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("recorder unavailable");
        }
        let mut guard = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(summary.clone());
        Ok(())
    }
}
