use crate::agc::AgcTracker;
use crate::NormalizedChannels;

/// Decodes one interleaved 16-bit frame, feeds the AGC window, and
/// produces normalized per-channel sample arrays.
///
/// Runs on the capture delivery path: all output buffers are allocated
/// once at construction and reused, so processing a frame is O(buffer)
/// with no heap growth.
pub struct FrameProcessor {
    channels: usize,
    floor: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    mono: Vec<f32>,
}

impl FrameProcessor {
    pub fn new(channels: usize, buffer_size: usize, floor: f32) -> Self {
        let channels = channels.clamp(1, 2);
        Self {
            channels,
            floor,
            left: Vec::with_capacity(buffer_size),
            right: Vec::with_capacity(buffer_size),
            mono: Vec::with_capacity(buffer_size),
        }
    }

    /// Largest sample magnitude in the raw buffer.
    pub fn peak(raw: &[i16]) -> f32 {
        raw.iter()
            .fold(0i32, |acc, &s| acc.max((s as i32).abs())) as f32
    }

    /// Process one frame: push its peak into `agc`, derive the
    /// normalization scale from the updated reference, and fill the
    /// left/right/mono buffers.
    ///
    /// Returns the frame peak in raw sample units.
    pub fn process(&mut self, raw: &[i16], agc: &mut AgcTracker) -> f32 {
        let peak = Self::peak(raw);
        agc.push(peak);

        let reference = agc.reference();
        let scale = if reference > self.floor {
            1.0 / reference
        } else {
            1.0 / self.floor
        };

        self.left.clear();
        self.right.clear();
        self.mono.clear();

        if self.channels >= 2 {
            // Interleaved stereo: even indices left, odd indices right.
            for pair in raw.chunks_exact(2) {
                let l = pair[0] as f32 * scale;
                let r = pair[1] as f32 * scale;
                self.left.push(l);
                self.right.push(r);
                self.mono.push((l + r) * 0.5);
            }
        } else {
            for &s in raw {
                let v = s as f32 * scale;
                self.left.push(v);
                self.right.push(v);
                self.mono.push(v);
            }
        }

        peak
    }

    /// Mono mix of the most recently processed frame.
    pub fn mono(&self) -> &[f32] {
        &self.mono
    }

    pub fn channels(&self) -> NormalizedChannels {
        NormalizedChannels {
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FULL_SCALE;

    fn tracker() -> AgcTracker {
        AgcTracker::new(10, 0.0)
    }

    #[test]
    fn test_silence_uses_floor_scale() {
        let floor = 0.02 * FULL_SCALE;
        let mut proc = FrameProcessor::new(1, 8, floor);
        let mut agc = tracker();

        let peak = proc.process(&[0i16; 8], &mut agc);
        assert_eq!(peak, 0.0);
        assert!(proc.mono().iter().all(|&v| v == 0.0));

        // A sample at exactly the floor amplitude would normalize to 1.0
        // via 1/floor.
        let s = floor as i16;
        proc.process(&[s; 8], &mut agc);
        assert!((proc.mono()[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_stereo_deinterleave() {
        let mut proc = FrameProcessor::new(2, 4, 0.02 * FULL_SCALE);
        let mut agc = tracker();

        proc.process(&[1000, -1000, 2000, -2000], &mut agc);
        let ch = proc.channels();
        assert_eq!(ch.left.len(), 2);
        assert_eq!(ch.right.len(), 2);
        assert!(ch.left.iter().all(|&v| v > 0.0));
        assert!(ch.right.iter().all(|&v| v < 0.0));
        // Peak-normalized: the loudest sample maps to magnitude 1.
        assert!((ch.left[1] - 1.0).abs() < 1e-6);
        assert!((ch.right[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mono_replicated_into_both_channels() {
        let mut proc = FrameProcessor::new(1, 4, 0.02 * FULL_SCALE);
        let mut agc = tracker();

        proc.process(&[4000, -4000, 2000, 0], &mut agc);
        let ch = proc.channels();
        assert_eq!(ch.left, ch.right);
        assert_eq!(ch.left.len(), 4);
    }

    #[test]
    fn test_peak_handles_i16_min() {
        assert_eq!(FrameProcessor::peak(&[i16::MIN]), 32768.0);
        assert_eq!(FrameProcessor::peak(&[-5, 3]), 5.0);
        assert_eq!(FrameProcessor::peak(&[]), 0.0);
    }

    #[test]
    fn test_scale_follows_agc_reference() {
        let mut proc = FrameProcessor::new(1, 4, 0.02 * FULL_SCALE);
        let mut agc = tracker();

        // Loud frame sets the reference.
        proc.process(&[16000, 16000, 16000, 16000], &mut agc);
        assert!((proc.mono()[0] - 1.0).abs() < 1e-6);

        // A quieter frame is scaled against the retained loud reference.
        proc.process(&[8000, 8000, 8000, 8000], &mut agc);
        assert!((proc.mono()[0] - 0.5).abs() < 1e-6);
    }
}
