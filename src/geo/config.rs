/// Sanity thresholds applied to incoming fixes before they count toward distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorConfig {
    /// Fastest plausible speed between accepted fixes (m/s). `None` disables the check.
    pub max_speed_mps: Option<f64>,

    /// Fixes reporting a worse accuracy radius than this are ignored.
    pub max_accuracy_meters: Option<f64>,

    /// How long a fix is held back so late arrivals can be slotted in by capture time.
    pub reorder_window_ms: u64,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: Some(12.0),
            max_accuracy_meters: None,
            reorder_window_ms: 0,
        }
    }
}
