use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use noisemeter::{Listener, ListenerConfig};

/// Samples an audio device, tracks loudness against a rolling AGC
/// window, and reports the normalized level at a fixed interval.
#[derive(Parser, Debug)]
#[command(name = "noisemeter")]
struct Args {
    /// Substring matched against device names; default device otherwise.
    #[arg(long)]
    device: Option<String>,

    /// Seconds between reported readings.
    #[arg(long, default_value_t = 20.0)]
    interval: f64,

    /// Capture the output mix through a loopback endpoint instead of
    /// the default input device.
    #[arg(long)]
    loopback: bool,

    /// JSON config file overriding the derived listener settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report banded spectrum magnitudes alongside the level.
    #[arg(long)]
    spectrum: bool,

    /// Log detected onsets.
    #[arg(long)]
    beats: bool,
}

fn load_config(args: &Args) -> Result<ListenerConfig> {
    if let Some(path) = &args.config {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&text).context("invalid listener config");
    }

    // Frame cadence follows the reporting interval, capped at 5 s so the
    // device buffer stays a sane size.
    Ok(ListenerConfig {
        data_time: args.interval.min(5.0),
        agc_time: args.interval,
        capture_input: !args.loopback,
        ..ListenerConfig::default()
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut listener = Listener::new(config);

    if args.spectrum {
        listener.set_spectrum_limits(1024, 0.0, 8000.0);
    }

    if args.beats {
        // The callback runs on the capture thread; hand events to a
        // reporting thread through a bounded queue.
        let (tx, rx) = crossbeam_channel::bounded(16);
        listener.set_beat_callback(move |event| {
            let _ = tx.try_send(event);
        });
        thread::spawn(move || {
            for event in rx {
                info!("beat at {:.2}s", event.timestamp);
            }
        });
    }

    if !listener.start(args.device.as_deref()) {
        anyhow::bail!("could not start audio capture");
    }
    info!("capturing at {} Hz", listener.sample_rate());

    let report_every = Duration::from_secs_f64(args.interval);
    let band_edges = [0.0, 250.0, 2000.0, 8000.0];

    loop {
        if listener.has_new_data() {
            println!("{:.4}", listener.agc_level());
            if args.spectrum {
                if let Some(spectrum) = listener.spectrum() {
                    let bands = listener.group(&spectrum, &band_edges);
                    info!("bands: {:?}", bands);
                }
            }
            thread::sleep(report_every);
        } else {
            thread::sleep(Duration::from_millis(100));
        }
    }
}
