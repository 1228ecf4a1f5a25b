use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Frequency-to-bin mapping: `round(f / rate * n_fft)`.
pub fn bin_index(freq: f32, rate: f32, n_fft: usize) -> usize {
    (freq / rate * n_fft as f32).round() as usize
}

/// Windowed spectral decomposition of a real-valued signal, sliced to a
/// configured bin range.
///
/// Two sampling domains share this type: the audio domain, where the
/// rate is the device sample rate and the input is the mono-mixed frame,
/// and the loudness domain, where one AGC slot is one time step spaced
/// `data_time` seconds apart and the transform surfaces periodicity in
/// loudness across the AGC window.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    n_fft: usize,
    bin_min: usize,
    bin_max: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// Analyzer over audio samples at `sample_rate` Hz.
    pub fn for_audio(n_fft: usize, f_min: f32, f_max: f32, sample_rate: f32) -> Self {
        Self::new(n_fft, f_min, f_max, sample_rate)
    }

    /// Analyzer over the AGC history, where the sampling interval is one
    /// frame (`data_time` seconds) and the transform length is the AGC
    /// window length.
    pub fn for_loudness(agc_len: usize, f_min: f32, f_max: f32, data_time: f64) -> Self {
        Self::new(agc_len, f_min, f_max, 1.0 / data_time as f32)
    }

    fn new(n_fft: usize, f_min: f32, f_max: f32, rate: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        let scratch_len = fft.get_inplace_scratch_len();

        // Only the real-signal half of the transform is meaningful.
        let half = n_fft / 2 + 1;
        let bin_min = bin_index(f_min, rate, n_fft).min(half);
        let bin_max = bin_index(f_max, rate, n_fft).clamp(bin_min, half);

        log::info!(
            "spectral analyzer: n_fft {} rate {} bins [{}, {})",
            n_fft,
            rate,
            bin_min,
            bin_max
        );

        Self {
            fft,
            n_fft,
            bin_min,
            bin_max,
            buffer: vec![Complex::new(0.0, 0.0); n_fft],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Magnitudes of the transform of `signal`, normalized by the
    /// transform length and sliced to the configured bin range. Input
    /// shorter than `n_fft` is zero-padded, longer input is truncated.
    pub fn compute(&mut self, signal: &[f32]) -> Vec<f32> {
        let n = self.n_fft.min(signal.len());
        for (slot, &x) in self.buffer.iter_mut().zip(&signal[..n]) {
            *slot = Complex::new(x, 0.0);
        }
        for slot in self.buffer.iter_mut().skip(n) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer[self.bin_min..self.bin_max]
            .iter()
            .map(|c| c.norm() / self.n_fft as f32)
            .collect()
    }

    pub fn bin_range(&self) -> (usize, usize) {
        (self.bin_min, self.bin_max)
    }
}

/// Group a spectrum into caller-defined bands.
///
/// For each adjacent pair `(f0, f1)` in `band_edges`, the bins `a` and
/// `b` are derived with [`bin_index`]; the band value is
/// `max(spectrum[a..b])` when the pair spans more than one bin, or
/// `spectrum[a]` when both edges land on the same bin (descending pairs
/// are treated the same way). Edges beyond the spectrum yield 0. One
/// output per adjacent pair, in input order.
pub fn group(spectrum: &[f32], band_edges: &[f32], rate: f32, n_fft: usize) -> Vec<f32> {
    band_edges
        .windows(2)
        .map(|pair| {
            let a = bin_index(pair[0], rate, n_fft);
            let b = bin_index(pair[1], rate, n_fft);
            if a >= spectrum.len() {
                return 0.0;
            }
            if b > a {
                spectrum[a..b.min(spectrum.len())]
                    .iter()
                    .fold(0.0f32, |acc, &v| acc.max(v))
            } else {
                spectrum[a]
            }
        })
        .collect()
}
