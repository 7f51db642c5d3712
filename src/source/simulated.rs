use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::EARTH_RADIUS_METERS;
use crate::models::PositionSample;

/// Parameters for a synthetic northbound run with GPS jitter.
#[derive(Debug, Clone)]
pub struct SimulatedRun {
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub seconds: u32,
    /// Target pace in seconds per kilometer.
    pub pace_seconds_per_km: f64,
    /// Uniform position noise applied to each fix, in meters.
    pub jitter_meters: f64,
    /// Every n-th fix is thrown far off course; 0 disables spikes.
    pub spike_every: u32,
    pub seed: u64,
    pub started_at_millis: i64,
}

impl Default for SimulatedRun {
    fn default() -> Self {
        Self {
            start_latitude: 40.0,
            start_longitude: -74.0,
            seconds: 600,
            pace_seconds_per_km: 330.0,
            jitter_meters: 1.5,
            spike_every: 0,
            seed: 7,
            started_at_millis: 0,
        }
    }
}

impl SimulatedRun {
    /// One fix per second, deterministic for a given seed.
    pub fn generate(&self) -> Vec<PositionSample> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let speed_mps = 1000.0 / self.pace_seconds_per_km.max(1.0);
        let meters_per_degree_lat = EARTH_RADIUS_METERS.to_radians();
        let meters_per_degree_lon =
            meters_per_degree_lat * self.start_latitude.to_radians().cos().max(1e-6);

        (0..=self.seconds)
            .map(|second| {
                let mut north = speed_mps * second as f64;
                let mut east = 0.0;
                if self.jitter_meters > 0.0 {
                    north += rng.gen_range(-self.jitter_meters..self.jitter_meters);
                    east += rng.gen_range(-self.jitter_meters..self.jitter_meters);
                }
                let spiked = self.spike_every > 0 && second > 0 && second % self.spike_every == 0;
                if spiked {
                    east += rng.gen_range(300.0..600.0);
                }

                PositionSample::new(
                    self.start_latitude + north / meters_per_degree_lat,
                    self.start_longitude + east / meters_per_degree_lon,
                    self.started_at_millis + i64::from(second) * 1000,
                )
            })
            .collect()
    }
}
