use crate::FULL_SCALE;

/// Rolling window of per-frame peak amplitudes used as the automatic
/// gain control reference.
///
/// The window is a fixed-length ring: `push` advances the write index
/// (wrapping to 0) and overwrites that slot, so the slot at the current
/// index is always the most recent frame's peak. The length is fixed at
/// construction and never changes while a stream is live; the listener
/// only rebuilds the tracker between `stop()` and `start()`.
pub struct AgcTracker {
    maxima: Vec<f32>,
    index: usize,
}

impl AgcTracker {
    /// A window of `len` slots, all seeded with `seed` so the
    /// normalization reference is non-zero before real data arrives.
    pub fn new(len: usize, seed: f32) -> Self {
        assert!(len > 0, "AGC window must have at least one slot");
        Self {
            maxima: vec![seed; len],
            index: 0,
        }
    }

    /// Record one frame's peak amplitude, evicting the oldest slot.
    pub fn push(&mut self, peak: f32) {
        self.index += 1;
        if self.index >= self.maxima.len() {
            self.index = 0;
        }
        self.maxima[self.index] = peak;
    }

    /// Current normalization reference: the largest magnitude in the
    /// window.
    pub fn reference(&self) -> f32 {
        self.maxima.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()))
    }

    /// Reference expressed as a fraction of full scale, nominally in
    /// [0, 1].
    pub fn agc_level(&self) -> f32 {
        self.reference() / FULL_SCALE
    }

    /// Most recent peak relative to the window reference; 0 when the
    /// window holds only silence.
    pub fn relative_volume(&self) -> f32 {
        if self.maxima.iter().sum::<f32>() == 0.0 {
            return 0.0;
        }
        self.maxima[self.index] / self.reference()
    }

    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    /// The raw window contents in storage order. Spectral magnitudes of
    /// a ring are invariant to rotation, so the loudness-periodicity
    /// transform consumes this directly.
    pub fn as_slice(&self) -> &[f32] {
        &self.maxima
    }
}
