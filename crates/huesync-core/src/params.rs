use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::{MIN_BRIGHTNESS, intensity_to_interval, intensity_to_interval_ms};

/// User-tunable output settings, read by the active engine on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncParameters {
    /// Output brightness in `[0.1, 1.0]`.
    pub brightness: f64,
    /// Update rate in `[0, 1]`; higher means faster frames.
    pub intensity: f64,
}

impl SyncParameters {
    /// Clamp both settings into their valid ranges.
    pub fn new(brightness: f64, intensity: f64) -> Self {
        Self {
            brightness: brightness.clamp(MIN_BRIGHTNESS, 1.0),
            intensity: intensity.clamp(0.0, 1.0),
        }
    }

    pub fn interval(&self) -> Duration {
        intensity_to_interval(self.intensity)
    }

    pub fn interval_ms(&self) -> u64 {
        intensity_to_interval_ms(self.intensity)
    }
}

impl Default for SyncParameters {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_out_of_range_values() {
        let params = SyncParameters::new(0.0, 4.0);
        assert!((params.brightness - MIN_BRIGHTNESS).abs() < f64::EPSILON);
        assert_eq!(params.interval_ms(), 100);
        assert_eq!(SyncParameters::new(2.0, -1.0).interval(), Duration::from_millis(600));
    }
}
