use serde::{Deserialize, Serialize};

/// Tuning parameters for the listener.
///
/// The amplitude floors and the beat threshold are empirical values
/// carried as configuration rather than constants; the defaults are the
/// ones the pipeline was tuned with and work for typical room audio.
///
/// All fractions are relative to [`crate::FULL_SCALE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Duration of one capture frame in seconds. The device buffer size
    /// is `sample_rate * data_time` samples per channel.
    pub data_time: f64,

    /// Length of the AGC history in seconds. The window holds
    /// `round(agc_time / data_time)` per-frame peaks.
    pub agc_time: f64,

    /// Fraction of full scale substituted for the normalization
    /// reference when the AGC reference falls to (near) zero.
    pub floor_fraction: f32,

    /// Fraction of full scale the AGC window is seeded with, so
    /// normalization is defined before any real data arrives.
    pub seed_fraction: f32,

    /// Beat gate: fire when `peak * seconds_since_last_fire` exceeds
    /// this, with `peak` in raw sample units. Louder peaks re-fire
    /// sooner, quiet ones wait longer.
    pub beat_threshold: f64,

    /// Capture from the default input device when true; otherwise
    /// resolve the default output device and capture its mix through a
    /// loopback-capable endpoint.
    pub capture_input: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            data_time: 1.0 / 20.0,
            agc_time: 10.0,
            floor_fraction: 0.02,
            seed_fraction: 0.1,
            beat_threshold: 0.5,
            capture_input: true,
        }
    }
}

impl ListenerConfig {
    /// Samples per channel in one frame at the given rate.
    pub fn buffer_size(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.data_time) as usize
    }

    /// Number of slots in the AGC window. Never zero.
    pub fn agc_len(&self) -> usize {
        ((self.agc_time / self.data_time).round() as usize).max(1)
    }

    pub fn floor_amplitude(&self) -> f32 {
        self.floor_fraction * crate::FULL_SCALE
    }

    pub fn seed_amplitude(&self) -> f32 {
        self.seed_fraction * crate::FULL_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let config = ListenerConfig::default();
        assert_eq!(config.agc_len(), 200); // 10s / 50ms
        assert_eq!(config.buffer_size(44100), 2205);

        let coarse = ListenerConfig {
            data_time: 0.2,
            agc_time: 2.0,
            ..ListenerConfig::default()
        };
        assert_eq!(coarse.agc_len(), 10);
    }

    #[test]
    fn test_agc_len_never_zero() {
        let config = ListenerConfig {
            data_time: 10.0,
            agc_time: 0.1,
            ..ListenerConfig::default()
        };
        assert_eq!(config.agc_len(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ListenerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ListenerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agc_len(), config.agc_len());
        assert!((back.beat_threshold - config.beat_threshold).abs() < 1e-12);
    }
}
