use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{info, warn};

use crate::beat::BeatEvent;
use crate::config::ListenerConfig;
use crate::pipeline::{Control, Pipeline, SharedState};
use crate::source::{AudioSource, CpalSource, FrameSink, StreamHandle, StreamParams};
use crate::spectral;
use crate::{NormalizedChannels, Snapshot};

/// The capture facade: owns the audio source and the stream handle,
/// builds the per-frame pipeline, and exposes polling accessors over the
/// latest published snapshot.
///
/// Lifecycle: `start()` resolves the device and begins delivery;
/// `stop()` pauses delivery without releasing the device; a later
/// `start()` resumes the same stream when the device and sample rate
/// are unchanged (the AGC history survives), and rebuilds the pipeline
/// and buffers otherwise. Rebuilding only ever happens with the old
/// stream already dropped, so a resize can never race a live callback.
pub struct Listener {
    config: ListenerConfig,
    source: Box<dyn AudioSource>,
    stream: Option<Box<dyn StreamHandle>>,
    shared: Arc<SharedState>,
    control: Option<Sender<Control>>,
    device_name: Option<String>,
    sample_rate: Option<u32>,
    spectrum_limits: Option<(usize, f32, f32)>,
    loudness_limits: Option<(f32, f32)>,
}

impl Listener {
    /// A listener backed by the system's audio host.
    pub fn new(config: ListenerConfig) -> Self {
        let source = Box::new(CpalSource::new(config.capture_input));
        Self::with_source(config, source)
    }

    /// A listener over any [`AudioSource`] implementation.
    pub fn with_source(config: ListenerConfig, source: Box<dyn AudioSource>) -> Self {
        Self {
            config,
            source,
            stream: None,
            shared: Arc::new(SharedState::new()),
            control: None,
            device_name: None,
            sample_rate: None,
            spectrum_limits: None,
            loudness_limits: None,
        }
    }

    /// Resolve the device and begin delivery. Returns whether the
    /// stream became active; failures are logged, not raised.
    pub fn start(&mut self, device_hint: Option<&str>) -> bool {
        match self.try_start(device_hint) {
            Ok(active) => active,
            Err(err) => {
                warn!("listener start failed: {:#}", err);
                false
            }
        }
    }

    fn try_start(&mut self, device_hint: Option<&str>) -> anyhow::Result<bool> {
        let device = self.source.resolve(device_hint)?;
        info!(
            "device name: {} channels: {} sample rate: {}",
            device.name, device.channels, device.sample_rate
        );

        let unchanged = self.sample_rate == Some(device.sample_rate)
            && self.device_name.as_deref() == Some(device.name.as_str());

        if unchanged {
            if let Some(stream) = self.stream.as_mut() {
                stream.start()?;
                return Ok(stream.is_active());
            }
        }

        // Device or rate changed (or first start): drop the old stream
        // before any buffer is resized.
        self.stream = None;
        self.control = None;

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut pipeline = Pipeline::new(
            &self.config,
            device.sample_rate,
            device.channels as usize,
            Arc::clone(&self.shared),
            rx,
        );

        // Staged limits land on the first processed frame.
        if let Some((n_fft, f_min, f_max)) = self.spectrum_limits {
            let _ = tx.send(Control::SetSpectrumLimits { n_fft, f_min, f_max });
        }
        if let Some((f_min, f_max)) = self.loudness_limits {
            let _ = tx.send(Control::SetLoudnessSpectrumLimits { f_min, f_max });
        }

        let sink: FrameSink = Box::new(move |raw, now| pipeline.process(raw, now));
        let params = StreamParams {
            sample_rate: device.sample_rate,
            channels: device.channels.min(2),
            buffer_size: self.config.buffer_size(device.sample_rate),
        };

        let mut stream = self.source.open(&params, sink)?;
        stream.start()?;
        let active = stream.is_active();

        self.stream = Some(stream);
        self.control = Some(tx);
        self.sample_rate = Some(device.sample_rate);
        self.device_name = Some(device.name);
        Ok(active)
    }

    /// Pause delivery, keeping the device handle for a later restart.
    pub fn stop(&mut self) -> bool {
        match self.stream.as_mut() {
            Some(stream) => match stream.stop() {
                Ok(()) => true,
                Err(err) => {
                    warn!("listener stop failed: {:#}", err);
                    false
                }
            },
            None => false,
        }
    }

    /// Drop the stream handle entirely, releasing the device. The next
    /// `start()` opens a fresh stream.
    pub fn release(&mut self) {
        self.stream = None;
        self.control = None;
    }

    /// Consume-once: true at most once per processed frame.
    pub fn has_new_data(&self) -> bool {
        self.shared.consume_new_data()
    }

    /// Effective device sample rate, 0 before the first successful
    /// start.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(0)
    }

    /// Current AGC reference as a fraction of full scale, in [0, ~1].
    pub fn agc_level(&self) -> f32 {
        self.shared.snapshot().map_or(0.0, |s| s.agc_level)
    }

    /// Latest frame peak relative to the AGC reference, in [0, 1];
    /// 0 while the window holds only silence.
    pub fn relative_volume(&self) -> f32 {
        self.shared.snapshot().map_or(0.0, |s| s.relative_volume)
    }

    pub fn is_active(&self) -> bool {
        self.stream.as_ref().map_or(false, |s| s.is_active())
    }

    /// The latest full snapshot, `None` until the first frame arrives.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.shared.snapshot()
    }

    /// Latest normalized left/right arrays.
    pub fn channels(&self) -> Option<NormalizedChannels> {
        self.shared.snapshot().map(|s| s.channels)
    }

    /// Latest spectral frame, `None` before the first frame and empty
    /// until spectrum limits are set.
    pub fn spectrum(&self) -> Option<Vec<f32>> {
        self.shared.snapshot().map(|s| s.spectrum)
    }

    pub fn loudness_spectrum(&self) -> Option<Vec<f32>> {
        self.shared.snapshot().map(|s| s.loudness_spectrum)
    }

    /// Enable the audio-rate spectral transform. Takes effect with the
    /// next processed frame.
    pub fn set_spectrum_limits(&mut self, n_fft: usize, f_min: f32, f_max: f32) {
        self.spectrum_limits = Some((n_fft, f_min, f_max));
        if let Some(tx) = &self.control {
            let _ = tx.send(Control::SetSpectrumLimits { n_fft, f_min, f_max });
        }
    }

    /// Enable the loudness-periodicity transform over the AGC window.
    /// Takes effect with the next processed frame.
    pub fn set_loudness_spectrum_limits(&mut self, f_min: f32, f_max: f32) {
        self.loudness_limits = Some((f_min, f_max));
        if let Some(tx) = &self.control {
            let _ = tx.send(Control::SetLoudnessSpectrumLimits { f_min, f_max });
        }
    }

    /// Group a spectrum produced with the configured limits into bands
    /// defined by adjacent `band_edges` pairs. Empty until spectrum
    /// limits are set and a device is resolved.
    pub fn group(&self, spectrum: &[f32], band_edges: &[f32]) -> Vec<f32> {
        match (self.spectrum_limits, self.sample_rate) {
            (Some((n_fft, _, _)), Some(rate)) => {
                spectral::group(spectrum, band_edges, rate as f32, n_fft)
            }
            _ => Vec::new(),
        }
    }

    /// Register the onset callback; it runs on the capture thread, so
    /// hand non-trivial work off through a channel.
    pub fn set_beat_callback(&mut self, cb: impl FnMut(BeatEvent) + Send + 'static) {
        self.shared.set_beat_callback(Some(Box::new(cb)));
    }

    pub fn clear_beat_callback(&mut self) {
        self.shared.set_beat_callback(None);
    }
}
