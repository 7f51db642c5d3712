use std::sync::{Arc, Mutex};

use crate::error::SourceError;
use crate::models::PositionSample;

use super::{GeoSampleSource, SampleSink, Subscription};

#[derive(Debug, Default)]
struct ChannelInner {
    sink: Option<SampleSink>,
    refuse_next: Option<SourceError>,
    subscribe_count: u64,
}

/// Source fed by hand: whoever holds a clone pushes fixes into the current subscription.
///
/// Used by the replay tooling and by tests that need exact control over
/// arrival order.
#[derive(Debug, Clone, Default)]
pub struct ChannelSource {
    inner: Arc<Mutex<ChannelInner>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a fix; returns `false` when nobody is subscribed or the queue refused it.
    pub fn push(&self, sample: PositionSample) -> bool {
        self.current_sink()
            .map(|sink| sink.on_sample(sample))
            .unwrap_or(false)
    }

    pub fn fail(&self, error: SourceError) -> bool {
        self.current_sink()
            .map(|sink| sink.on_error(error))
            .unwrap_or(false)
    }

    /// Makes the next `subscribe` call fail with `error`.
    pub fn refuse_next_subscribe(&self, error: SourceError) {
        self.lock().refuse_next = Some(error);
    }

    pub fn is_subscribed(&self) -> bool {
        self.current_sink().is_some()
    }

    pub fn subscribe_count(&self) -> u64 {
        self.lock().subscribe_count
    }

    fn current_sink(&self) -> Option<SampleSink> {
        self.lock()
            .sink
            .as_ref()
            .filter(|sink| !sink.is_closed())
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl GeoSampleSource for ChannelSource {
    fn subscribe(&self, sink: SampleSink) -> Result<Subscription, SourceError> {
        let mut inner = self.lock();
        inner.subscribe_count += 1;
        if let Some(error) = inner.refuse_next.take() {
            return Err(error);
        }
        let subscription = sink.subscription();
        inner.sink = Some(sink);
        Ok(subscription)
    }
}
