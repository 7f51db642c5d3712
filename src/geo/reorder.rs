use std::collections::BTreeMap;

use crate::models::PositionSample;

/// Holds fixes back for a short window so late arrivals are released in
/// capture-time order.
///
/// A fix is released once the newest capture time seen is at least
/// `window_ms` past it. With a zero window every fix is released as soon as
/// it arrives; ordering is then enforced downstream by rejecting stale fixes.
///
/// The buffer only moves when fixes arrive. If the source goes quiet the tail
/// stays pending until the owner calls [`drain`](Self::drain); the tracking
/// state does that once no fix has arrived for a full window.
#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    window_ms: u64,
    // (capture time, arrival seq) keeps duplicates distinct
    pending: BTreeMap<(i64, u64), PositionSample>,
    newest_seen: Option<i64>,
    seq: u64,
}

impl ReorderBuffer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: BTreeMap::new(),
            newest_seen: None,
            seq: 0,
        }
    }

    pub fn push(&mut self, sample: PositionSample) -> Vec<PositionSample> {
        let captured = sample.captured_at_millis;
        self.pending.insert((captured, self.seq), sample);
        self.seq += 1;

        let newest = self.newest_seen.map_or(captured, |seen| seen.max(captured));
        self.newest_seen = Some(newest);

        let horizon = newest.saturating_sub(self.window_ms.min(i64::MAX as u64) as i64);
        let mut released = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > horizon {
                break;
            }
            released.push(entry.remove());
        }
        released
    }

    /// Releases everything still held, oldest first.
    pub fn drain(&mut self) -> Vec<PositionSample> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Total fixes pushed so far.
    pub fn arrivals(&self) -> u64 {
        self.seq
    }
}
