use serde::{Deserialize, Serialize};

/// A single position fix delivered by a [`GeoSampleSource`](crate::source::GeoSampleSource).
///
/// `captured_at_millis` is the authoritative ordering key; arrival order is
/// not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at_millis: i64,
    /// Horizontal accuracy radius reported by the device, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, captured_at_millis: i64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at_millis,
            accuracy_meters: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }
}
