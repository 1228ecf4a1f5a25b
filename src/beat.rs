/// An amplitude onset, handed synchronously to the registered callback.
#[derive(Debug, Clone)]
pub struct BeatEvent {
    /// Seconds since the stream was opened.
    pub timestamp: f64,
    /// The most recent spectral frame; empty when spectral analysis is
    /// not enabled.
    pub spectrum: Vec<f32>,
}

/// Callbacks run inside the capture callback; anything non-trivial
/// should hand the event off to another thread.
pub type BeatCallback = Box<dyn FnMut(BeatEvent) + Send>;

/// Self-scaling onset gate.
///
/// Fires when `peak * elapsed_since_last_fire > threshold`, with `peak`
/// in raw sample units: a loud peak re-fires after a short gap, a quiet
/// one has to wait longer. The fire timestamp advances only on a fire,
/// so sustained loudness keeps a steady cadence instead of firing every
/// frame.
pub struct BeatDetector {
    threshold: f64,
    last_fire: f64,
}

impl BeatDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_fire: 0.0,
        }
    }

    /// Evaluate the gate for one frame. Returns true and records the
    /// fire time when the gate opens.
    pub fn check(&mut self, peak: f32, now: f64) -> bool {
        if peak as f64 * (now - self.last_fire) > self.threshold {
            self.last_fire = now;
            return true;
        }
        false
    }

    pub fn last_fire(&self) -> f64 {
        self.last_fire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_boundary_is_strict() {
        // peak * elapsed == threshold must not fire.
        let mut gate = BeatDetector::new(0.5);
        assert!(!gate.check(0.5, 1.0));
        assert!(gate.check(0.5001, 1.0));
    }

    #[test]
    fn test_louder_peaks_refire_sooner() {
        let mut gate = BeatDetector::new(0.5);
        assert!(gate.check(16000.0, 0.1));

        // 1 ms later: 16000 * 0.001 = 16 > 0.5, loud re-fires fast.
        assert!(gate.check(16000.0, 0.101));

        // A quiet peak needs much more elapsed time.
        assert!(!gate.check(10.0, 0.11));
        assert!(gate.check(10.0, 0.3));
    }

    #[test]
    fn test_last_fire_updates_only_on_fire() {
        let mut gate = BeatDetector::new(0.5);
        assert!(gate.check(100.0, 1.0));
        assert_eq!(gate.last_fire(), 1.0);

        assert!(!gate.check(0.1, 1.5));
        assert_eq!(gate.last_fire(), 1.0);

        assert!(gate.check(100.0, 2.0));
        assert_eq!(gate.last_fire(), 2.0);
    }

    #[test]
    fn test_silence_never_fires() {
        let mut gate = BeatDetector::new(0.5);
        for i in 1..100 {
            assert!(!gate.check(0.0, i as f64));
        }
    }
}
