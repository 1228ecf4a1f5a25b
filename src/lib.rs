pub mod agc;
pub mod beat;
pub mod config;
pub mod listener;
pub mod pipeline;
pub mod processor;
pub mod source;
pub mod spectral;

pub use agc::AgcTracker;
pub use beat::{BeatDetector, BeatEvent};
pub use config::ListenerConfig;
pub use listener::Listener;
pub use processor::FrameProcessor;
pub use source::{AudioSource, CpalSource, StreamHandle, StreamParams};
pub use spectral::SpectralAnalyzer;

/// Maximum representable magnitude for 16-bit signed samples.
pub const FULL_SCALE: f32 = 32768.0;

/// Normalized left/right sample arrays for the most recent frame,
/// values roughly in [-1, 1]. Mono input is replicated into both sides.
#[derive(Debug, Clone, Default)]
pub struct NormalizedChannels {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Everything the capture callback publishes per frame, swapped in as
/// one value so a polling reader never observes a half-written update.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub channels: NormalizedChannels,
    /// Magnitudes over the configured bin range, empty until
    /// spectrum limits are set.
    pub spectrum: Vec<f32>,
    /// Loudness-periodicity magnitudes over the AGC window, empty until
    /// loudness spectrum limits are set.
    pub loudness_spectrum: Vec<f32>,
    pub agc_level: f32,
    pub relative_volume: f32,
    pub peak: f32,
    /// Seconds since the stream was opened.
    pub timestamp: f64,
}
