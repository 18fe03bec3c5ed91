//! Benchmarks for the synthesis and mixing hot paths
//!
//! Run with: cargo bench --bench synth

use blip_mix::{
    BlipBuffer, ChannelType, DualResampler, EffectsBuffer, EffectsConfig, FrameSource,
    MultiBuffer, StereoBuffer, Synth, SynthConfig,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const CLOCK_HZ: u32 = 1_789_773;
const FRAME_CLOCKS: u32 = 29_830;

fn nes_buffer() -> BlipBuffer {
    let mut buf = BlipBuffer::new();
    buf.set_sample_rate(44_100, 100).unwrap();
    buf.set_clock_rate(CLOCK_HZ).unwrap();
    buf
}

fn bench_offsets(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset");

    let configs = [
        ("fast", SynthConfig::fast(15)),
        ("low", SynthConfig::low(15)),
        ("good", SynthConfig::good(15)),
        ("high", SynthConfig::high(15)),
    ];
    for (name, config) in configs {
        let mut synth = Synth::new(config).unwrap();
        synth.set_volume(0.3).unwrap();
        let mut buf = nes_buffer();

        group.bench_with_input(BenchmarkId::from_parameter(name), &synth, |b, synth| {
            b.iter(|| {
                // one square-wave frame: 64 transitions
                for i in 0..64u32 {
                    let delta = if i % 2 == 0 { 15 } else { -15 };
                    synth.offset(black_box(i * 466), delta, &mut buf).unwrap();
                }
                buf.end_frame(FRAME_CLOCKS).unwrap();
                let avail = buf.samples_avail();
                buf.remove_samples(avail).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_read_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_samples");

    for sample_count in [735usize, 2048, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(sample_count),
            &sample_count,
            |b, &sample_count| {
                let mut buf = BlipBuffer::new();
                buf.set_sample_rate(44_100, 250).unwrap();
                buf.set_clock_rate(44_100).unwrap();
                let mut out = vec![0i16; sample_count];
                b.iter(|| {
                    buf.end_frame(sample_count as u32).unwrap();
                    black_box(buf.read_samples(&mut out, false).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn render_frame<M: MultiBuffer>(buf: &mut M, synths: &mut [Synth], out: &mut [i16]) {
    for (n, synth) in synths.iter_mut().enumerate() {
        let period = 300 + n as u32 * 77;
        let mut t = 0;
        let mut high = false;
        while t < FRAME_CLOCKS {
            high = !high;
            synth.update(t, if high { 15 } else { 0 }, buf).unwrap();
            t += period;
        }
    }
    buf.end_frame(FRAME_CLOCKS).unwrap();
    black_box(buf.read_samples(out).unwrap());
}

fn voices<M: MultiBuffer>(buf: &M, count: usize) -> Vec<Synth> {
    (0..count)
        .map(|i| {
            let mut synth = Synth::new(SynthConfig::good(15)).unwrap();
            synth.set_volume(0.15).unwrap();
            synth.set_output(Some(buf.channel(i, ChannelType::empty()).center));
            synth
        })
        .collect()
}

fn bench_stereo_frame(c: &mut Criterion) {
    let mut stereo = StereoBuffer::new();
    stereo.set_sample_rate(44_100, 100).unwrap();
    stereo.set_clock_rate(CLOCK_HZ).unwrap();
    let mut synths = voices(&stereo, 3);
    let mut out = vec![0i16; 2048];

    c.bench_function("stereo_frame_3_voices", |b| {
        b.iter(|| render_frame(&mut stereo, &mut synths, &mut out));
    });
}

fn bench_effects_frame(c: &mut Criterion) {
    let mut fx = EffectsBuffer::new(false);
    fx.set_sample_rate(44_100, 100).unwrap();
    fx.set_clock_rate(CLOCK_HZ).unwrap();
    fx.config(&EffectsConfig::from_depth(0.5));
    let mut synths = voices(&fx, 3);
    let mut out = vec![0i16; 2048];

    c.bench_function("effects_frame_3_voices", |b| {
        b.iter(|| render_frame(&mut fx, &mut synths, &mut out));
    });
}

struct SineFm {
    phase: f64,
}

impl FrameSource for SineFm {
    fn play_frame(
        &mut self,
        _blip_time: blip_mix::BlipTime,
        pcm_count: usize,
        pcm_out: &mut [i16],
        _blip: &mut BlipBuffer,
    ) -> blip_mix::Result<usize> {
        for pair in pcm_out[..pcm_count].chunks_exact_mut(2) {
            let s = (self.phase.sin() * 8_000.0) as i16;
            pair[0] = s;
            pair[1] = s;
            self.phase += 0.05;
        }
        Ok(pcm_count)
    }
}

fn bench_dual_resampler(c: &mut Criterion) {
    let mut blip = BlipBuffer::new();
    blip.set_sample_rate(44_100, 100).unwrap();
    blip.set_clock_rate(3_579_545).unwrap();
    let mut dual = DualResampler::new();
    dual.setup(53_267.0 / 44_100.0, 0.999, 1.0).unwrap();
    dual.reset(735).unwrap();
    let mut fm = SineFm { phase: 0.0 };
    let mut out = vec![0i16; 735 * 2];

    c.bench_function("dual_resampler_frame", |b| {
        b.iter(|| {
            dual.dual_play(&mut out, &mut blip, &mut fm).unwrap();
            black_box(&out);
        });
    });
}

criterion_group!(
    benches,
    bench_offsets,
    bench_read_samples,
    bench_stereo_frame,
    bench_effects_frame,
    bench_dual_resampler
);
criterion_main!(benches);
