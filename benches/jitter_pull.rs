use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lan_media_link::audio::JitterBuffer;
use lan_media_link::codec::encode_pcm16;

fn jitter_pull_benchmark(c: &mut Criterion) {
    let frame: Vec<f32> = (0..320).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
    let pcm = encode_pcm16(&frame);

    c.bench_function("pull_16000_to_48000_stereo", |b| {
        let jitter = JitterBuffer::new(16000, 48000, 2);
        let mut out = vec![0.0f32; 480 * 2];
        b.iter(|| {
            // One 20 ms frame in, one 10 ms block out, twice
            jitter.on_frame_arrived(&pcm);
            jitter.pull(black_box(&mut out), 2);
            jitter.pull(black_box(&mut out), 2);
        });
    });

    c.bench_function("pull_empty", |b| {
        let jitter = JitterBuffer::new(44100, 48000, 1);
        let mut out = vec![0.0f32; 512 * 2];
        b.iter(|| jitter.pull(black_box(&mut out), 2));
    });
}

criterion_group!(benches, jitter_pull_benchmark);
criterion_main!(benches);
