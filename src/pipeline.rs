use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::agc::AgcTracker;
use crate::beat::{BeatCallback, BeatDetector, BeatEvent};
use crate::config::ListenerConfig;
use crate::processor::FrameProcessor;
use crate::spectral::SpectralAnalyzer;
use crate::Snapshot;

/// Configuration changes posted by the listener and applied at the top
/// of the next processed frame.
pub enum Control {
    SetSpectrumLimits { n_fft: usize, f_min: f32, f_max: f32 },
    SetLoudnessSpectrumLimits { f_min: f32, f_max: f32 },
}

/// State shared between the capture thread and polling consumers.
///
/// The capture thread is the only writer. Results are swapped in as one
/// `Snapshot` value under a single lock so a reader never sees a frame
/// half-published.
pub struct SharedState {
    snapshot: Mutex<Option<Snapshot>>,
    has_new_data: AtomicBool,
    beat_callback: Mutex<Option<BeatCallback>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
            has_new_data: AtomicBool::new(false),
            beat_callback: Mutex::new(None),
        }
    }

    /// Consume-once: true at most once per published frame, even under
    /// concurrent polling.
    pub fn consume_new_data(&self) -> bool {
        self.has_new_data.swap(false, Ordering::AcqRel)
    }

    /// The most recent published frame, `None` until the first frame
    /// has been processed.
    pub fn snapshot(&self) -> Option<Snapshot> {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_beat_callback(&self, cb: Option<BeatCallback>) {
        if let Ok(mut slot) = self.beat_callback.lock() {
            *slot = cb;
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-frame capture path: decode, AGC, normalization, optional
/// spectral transforms, beat gating, snapshot publish.
///
/// Owned outright by the delivery callback; nothing here is shared
/// field-by-field with the consumer side. Runs once per delivered
/// buffer and must stay O(buffer) with no blocking calls.
pub struct Pipeline {
    processor: FrameProcessor,
    agc: AgcTracker,
    spectral: Option<SpectralAnalyzer>,
    loudness: Option<SpectralAnalyzer>,
    beat: BeatDetector,
    shared: Arc<SharedState>,
    control: Receiver<Control>,
    sample_rate: u32,
    data_time: f64,
}

impl Pipeline {
    pub fn new(
        config: &ListenerConfig,
        sample_rate: u32,
        channels: usize,
        shared: Arc<SharedState>,
        control: Receiver<Control>,
    ) -> Self {
        let buffer_size = config.buffer_size(sample_rate);
        Self {
            processor: FrameProcessor::new(channels, buffer_size, config.floor_amplitude()),
            agc: AgcTracker::new(config.agc_len(), config.seed_amplitude()),
            spectral: None,
            loudness: None,
            beat: BeatDetector::new(config.beat_threshold),
            shared,
            control,
            sample_rate,
            data_time: config.data_time,
        }
    }

    /// Process one delivered buffer. `now` is seconds since the stream
    /// was opened.
    pub fn process(&mut self, raw: &[i16], now: f64) {
        self.apply_pending_controls();

        let peak = self.processor.process(raw, &mut self.agc);

        let spectrum = match self.spectral.as_mut() {
            Some(analyzer) => analyzer.compute(self.processor.mono()),
            None => Vec::new(),
        };
        let loudness_spectrum = match self.loudness.as_mut() {
            Some(analyzer) => analyzer.compute(self.agc.as_slice()),
            None => Vec::new(),
        };

        let snapshot = Snapshot {
            channels: self.processor.channels(),
            spectrum: spectrum.clone(),
            loudness_spectrum,
            agc_level: self.agc.agc_level(),
            relative_volume: self.agc.relative_volume(),
            peak,
            timestamp: now,
        };

        if let Ok(mut latest) = self.shared.snapshot.lock() {
            *latest = Some(snapshot);
        }
        self.shared.has_new_data.store(true, Ordering::Release);

        // The gate is only evaluated while a callback is registered, so
        // the fire timestamp tracks actual deliveries.
        if let Ok(mut slot) = self.shared.beat_callback.lock() {
            if let Some(cb) = slot.as_mut() {
                if self.beat.check(peak, now) {
                    cb(BeatEvent {
                        timestamp: now,
                        spectrum,
                    });
                }
            }
        }
    }

    fn apply_pending_controls(&mut self) {
        while let Ok(msg) = self.control.try_recv() {
            match msg {
                Control::SetSpectrumLimits { n_fft, f_min, f_max } => {
                    self.spectral = Some(SpectralAnalyzer::for_audio(
                        n_fft,
                        f_min,
                        f_max,
                        self.sample_rate as f32,
                    ));
                }
                Control::SetLoudnessSpectrumLimits { f_min, f_max } => {
                    self.loudness = Some(SpectralAnalyzer::for_loudness(
                        self.agc.len(),
                        f_min,
                        f_max,
                        self.data_time,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FULL_SCALE;
    use crossbeam_channel::Sender;

    // data_time 0.2 s, agc_time 2 s (10 AGC slots), 40 Hz rate for a
    // small 8-sample frame.
    fn test_config() -> ListenerConfig {
        ListenerConfig {
            data_time: 0.2,
            agc_time: 2.0,
            ..ListenerConfig::default()
        }
    }

    fn test_pipeline() -> (Pipeline, Arc<SharedState>, Sender<Control>) {
        let shared = Arc::new(SharedState::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let pipeline = Pipeline::new(&test_config(), 40, 1, Arc::clone(&shared), rx);
        (pipeline, shared, tx)
    }

    fn alternating_frame(amplitude: i16, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn test_has_new_data_consume_once() {
        let (mut pipeline, shared, _tx) = test_pipeline();
        assert!(!shared.consume_new_data());

        pipeline.process(&alternating_frame(1000, 8), 0.2);
        assert!(shared.consume_new_data());
        assert!(!shared.consume_new_data());

        pipeline.process(&alternating_frame(1000, 8), 0.4);
        assert!(shared.consume_new_data());
    }

    #[test]
    fn test_agc_level_stabilizes() {
        let (mut pipeline, shared, _tx) = test_pipeline();
        let frame = alternating_frame(16000, 8);
        for k in 1..=10 {
            pipeline.process(&frame, k as f64 * 0.2);
        }
        // All ten slots now hold 16000.
        let snap = shared.snapshot().unwrap();
        assert!((snap.agc_level - 16000.0 / FULL_SCALE).abs() < 1e-6);
        assert!((snap.relative_volume - 1.0).abs() < 1e-6);
        assert_eq!(snap.peak, 16000.0);
    }

    #[test]
    fn test_spectrum_limits_take_effect_next_frame() {
        let (mut pipeline, shared, tx) = test_pipeline();

        pipeline.process(&alternating_frame(1000, 8), 0.2);
        assert!(shared.snapshot().unwrap().spectrum.is_empty());

        tx.send(Control::SetSpectrumLimits {
            n_fft: 8,
            f_min: 0.0,
            f_max: 20.0,
        })
        .unwrap();
        pipeline.process(&alternating_frame(1000, 8), 0.4);
        assert!(!shared.snapshot().unwrap().spectrum.is_empty());
    }

    #[test]
    fn test_loudness_spectrum_over_agc_window() {
        let (mut pipeline, shared, tx) = test_pipeline();
        tx.send(Control::SetLoudnessSpectrumLimits {
            f_min: 0.0,
            f_max: 2.5,
        })
        .unwrap();
        pipeline.process(&alternating_frame(1000, 8), 0.2);
        let snap = shared.snapshot().unwrap();
        // 10-slot window at 5 Hz slot rate, bins [0, 5).
        assert_eq!(snap.loudness_spectrum.len(), 5);
    }

    #[test]
    fn test_beat_event_carries_latest_spectrum() {
        let (mut pipeline, shared, tx) = test_pipeline();
        tx.send(Control::SetSpectrumLimits {
            n_fft: 8,
            f_min: 0.0,
            f_max: 20.0,
        })
        .unwrap();

        let fired: Arc<Mutex<Vec<BeatEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        shared.set_beat_callback(Some(Box::new(move |event| {
            sink.lock().unwrap().push(event);
        })));

        // 16000 * 0.2 s elapsed is far above the 0.5 threshold.
        pipeline.process(&alternating_frame(16000, 8), 0.2);

        let events = fired.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 0.2);
        assert!(!events[0].spectrum.is_empty());
    }

    #[test]
    fn test_no_beat_without_callback() {
        let (mut pipeline, shared, _tx) = test_pipeline();
        // No callback registered: processing loud frames must not panic
        // and still publishes snapshots.
        pipeline.process(&alternating_frame(16000, 8), 0.2);
        assert!(shared.consume_new_data());
    }

    #[test]
    fn test_silence_normalizes_to_zero_output() {
        let (mut pipeline, shared, _tx) = test_pipeline();
        // Push enough silent frames to flush the seeded window.
        for k in 1..=10 {
            pipeline.process(&[0i16; 8], k as f64 * 0.2);
        }
        let snap = shared.snapshot().unwrap();
        assert!(snap.channels.left.iter().all(|&v| v == 0.0));
        assert_eq!(snap.relative_volume, 0.0);
        assert_eq!(snap.agc_level, 0.0);
    }
}
