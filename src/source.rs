use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use log::{info, warn};

/// Stream parameters the listener settles on before opening.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Requested samples per channel per delivery.
    pub buffer_size: usize,
}

/// What device resolution yields: enough to size the pipeline.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Per-buffer delivery: interleaved signed 16-bit samples and seconds
/// since the stream was opened.
pub type FrameSink = Box<dyn FnMut(&[i16], f64) + Send>;

/// The capture collaborator. Owns the physical device and invokes the
/// sink once per delivered buffer on its own thread; delivered buffers
/// are well-formed interleaved frames by contract.
pub trait AudioSource {
    /// Resolve the capture device and its effective configuration.
    /// `device_hint` is matched against device names when given.
    fn resolve(&mut self, device_hint: Option<&str>) -> Result<DeviceInfo>;

    /// Open a stream on the resolved device. The stream is created
    /// paused; call [`StreamHandle::start`] to begin delivery.
    fn open(&mut self, params: &StreamParams, sink: FrameSink) -> Result<Box<dyn StreamHandle>>;
}

/// Handle to an open stream. Dropping it releases the device.
pub trait StreamHandle {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn is_active(&self) -> bool;
}

/// cpal-backed production source.
///
/// With `capture_input` set it resolves the default input device;
/// otherwise it resolves the default output device and captures its mix
/// through the host's loopback-capable input path (WASAPI-style
/// loopback). Loopback availability is a host property; where the host
/// cannot open an input stream on an output device, `open` reports the
/// failure and the listener stays inactive.
pub struct CpalSource {
    host: cpal::Host,
    capture_input: bool,
    device: Option<Device>,
}

impl CpalSource {
    pub fn new(capture_input: bool) -> Self {
        Self {
            host: cpal::default_host(),
            capture_input,
            device: None,
        }
    }

    fn find_device(&self, hint: Option<&str>) -> Result<Device> {
        if let Some(hint) = hint {
            let devices = self
                .host
                .devices()
                .context("failed to enumerate audio devices")?;
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.contains(hint) {
                        return Ok(device);
                    }
                }
            }
            return Err(anyhow!("no audio device matching {:?}", hint));
        }

        let device = if self.capture_input {
            self.host.default_input_device()
        } else {
            self.host.default_output_device()
        };
        device.ok_or_else(|| anyhow!("no default audio device available"))
    }
}

impl AudioSource for CpalSource {
    fn resolve(&mut self, device_hint: Option<&str>) -> Result<DeviceInfo> {
        let device = self.find_device(device_hint)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        // Loopback capture negotiates an input config on the output
        // endpoint; fall back to the output config for rate/channels if
        // the host exposes none.
        let config = device
            .default_input_config()
            .or_else(|_| device.default_output_config())
            .context("device has no usable stream configuration")?;

        let info = DeviceInfo {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels().min(2),
        };
        self.device = Some(device);
        Ok(info)
    }

    fn open(&mut self, params: &StreamParams, mut sink: FrameSink) -> Result<Box<dyn StreamHandle>> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("open called before device resolution"))?;

        let sample_format = device
            .default_input_config()
            .or_else(|_| device.default_output_config())
            .context("device has no usable stream configuration")?
            .sample_format();

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            // cpal counts frames here, not interleaved samples.
            buffer_size: BufferSize::Fixed(params.buffer_size as u32),
        };

        info!(
            "opening stream: {} ch at {} Hz, {} samples/buffer, format {:?}",
            params.channels, params.sample_rate, params.buffer_size, sample_format
        );

        let opened = Instant::now();
        let err_fn = |err| warn!("audio stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    sink(data, opened.elapsed().as_secs_f64());
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => {
                // Convert in a reused scratch buffer so the delivery
                // path stays allocation-free after warmup.
                let mut scratch: Vec<i16> = Vec::with_capacity(
                    params.buffer_size * params.channels as usize,
                );
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                        sink(&scratch, opened.elapsed().as_secs_f64());
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format {:?}", other)),
        };

        Ok(Box::new(CpalStreamHandle {
            stream,
            active: false,
        }))
    }
}

struct CpalStreamHandle {
    stream: Stream,
    active: bool,
}

impl StreamHandle for CpalStreamHandle {
    fn start(&mut self) -> Result<()> {
        self.stream.play().context("failed to start stream")?;
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stream.pause().context("failed to pause stream")?;
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
