use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use noisemeter::pipeline::{Control, Pipeline, SharedState};
use noisemeter::ListenerConfig;

// The frame path runs inside the capture callback, so its cost per
// 50 ms stereo buffer is the number that matters.
fn bench_frame_path(c: &mut Criterion) {
    let config = ListenerConfig::default();
    let frame: Vec<i16> = (0..2 * config.buffer_size(44100))
        .map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16)
        .collect();

    let shared = Arc::new(SharedState::new());
    let (_tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = Pipeline::new(&config, 44100, 2, Arc::clone(&shared), rx);
    let mut now = 0.0;
    c.bench_function("process_frame", |b| {
        b.iter(|| {
            now += config.data_time;
            pipeline.process(black_box(&frame), now);
        })
    });

    let shared = Arc::new(SharedState::new());
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = Pipeline::new(&config, 44100, 2, Arc::clone(&shared), rx);
    tx.send(Control::SetSpectrumLimits {
        n_fft: 1024,
        f_min: 0.0,
        f_max: 8000.0,
    })
    .unwrap();
    let mut now = 0.0;
    c.bench_function("process_frame_with_spectrum", |b| {
        b.iter(|| {
            now += config.data_time;
            pipeline.process(black_box(&frame), now);
        })
    });
}

criterion_group!(benches, bench_frame_path);
criterion_main!(benches);
