use blip_mix::{
    clamp_sample, BlipBuffer, BlipError, MultiBuffer, StereoBuffer, Synth, SynthConfig,
};

const NES_CLOCK: u32 = 1_789_773;
const NES_FRAME: u32 = 29_830;

fn nes_buffer() -> BlipBuffer {
    let mut buf = BlipBuffer::new();
    buf.set_sample_rate(44_100, 100).unwrap();
    buf.set_clock_rate(NES_CLOCK).unwrap();
    buf
}

fn read_all(buf: &mut BlipBuffer) -> Vec<i16> {
    let mut pcm = vec![0i16; buf.samples_avail()];
    let count = buf.read_samples(&mut pcm, false).unwrap();
    pcm.truncate(count);
    pcm
}

#[test]
fn single_step_rises_then_leaks_away() {
    let mut buf = nes_buffer();
    let mut synth = Synth::new(SynthConfig::good(1000)).unwrap();
    synth.set_volume(1.0).unwrap();

    synth.offset(0, 100, &mut buf).unwrap();
    buf.end_frame(NES_FRAME).unwrap();
    let first = read_all(&mut buf);
    assert_eq!(first.len(), 735);

    let level = 100.0 / 1000.0 * 65_536.0;
    let (peak_at, &peak) = first.iter().enumerate().max_by_key(|&(_, &s)| s).unwrap();
    assert!(peak_at < 20, "peak at {peak_at}");
    assert!(
        (peak as f64) > level * 0.85 && (peak as f64) < level * 1.1,
        "peak {peak}"
    );
    assert_eq!(&first[..2], &[0, 0]);
    assert!(first.windows(2).skip(20).all(|w| w[1] <= w[0]));
    assert!(first.iter().all(|&s| (-1_000..7_300).contains(&s)));

    // nothing new: the bass leak keeps pulling toward zero
    buf.end_frame(NES_FRAME).unwrap();
    let second = read_all(&mut buf);
    assert_eq!(second.len(), 735);
    assert!(second[0] <= first[first.len() - 1]);
    assert!(second[second.len() - 1] < second[0]);
    assert!(second.iter().all(|&s| s >= 0));
}

#[test]
fn square_wave_level_does_not_drift() {
    // 64 clocks per sample, 100-sample period, 10 periods per frame
    let mut buf = BlipBuffer::new();
    buf.set_sample_rate(44_100, 100).unwrap();
    buf.set_clock_rate(44_100 * 64).unwrap();
    buf.set_bass_frequency(0);
    let mut synth = Synth::new(SynthConfig::good(15)).unwrap();
    synth.set_volume(0.25).unwrap();
    synth.set_output(Some(blip_mix::BufferId(0)));

    let mut means = Vec::new();
    for _ in 0..10 {
        for i in 0..20u32 {
            let amp = if i % 2 == 0 { 15 } else { 0 };
            synth.update(i * 3_200, amp, &mut buf).unwrap();
        }
        buf.end_frame(64_000).unwrap();
        let pcm = read_all(&mut buf);
        assert_eq!(pcm.len(), 1000);
        means.push(pcm.iter().map(|&s| s as f64).sum::<f64>() / pcm.len() as f64);
    }

    for mean in &means[1..] {
        assert!((mean - 8_192.0).abs() < 200.0, "mean {mean}");
    }
    for pair in means[1..].windows(2) {
        assert!((pair[0] - pair[1]).abs() < 50.0, "{pair:?}");
    }
}

#[test]
fn overflow_saturates_with_clamp_formula() {
    assert_eq!(clamp_sample(65_536), i16::MAX);
    assert_eq!(clamp_sample(-65_536), i16::MIN);
    assert_eq!(clamp_sample(1_234), 1_234);

    let mut up = nes_buffer();
    let mut down = nes_buffer();
    up.set_bass_frequency(0);
    down.set_bass_frequency(0);
    let mut synth = Synth::new(SynthConfig::fast(1)).unwrap();
    synth.set_volume(1.0).unwrap();
    synth.offset(0, 1, &mut up).unwrap();
    synth.offset(0, -1, &mut down).unwrap();
    up.end_frame(NES_FRAME).unwrap();
    down.end_frame(NES_FRAME).unwrap();

    let up = read_all(&mut up);
    let down = read_all(&mut down);
    assert!(up[20..].iter().all(|&s| s == i16::MAX));
    assert!(down[20..].iter().all(|&s| s == i16::MIN));
}

fn render_song() -> Vec<i16> {
    let mut stereo = StereoBuffer::new();
    stereo.set_sample_rate(44_100, 250).unwrap();
    stereo.set_clock_rate(NES_CLOCK).unwrap();
    let ch = stereo.channel(0, blip_mix::ChannelType::empty());

    let mut square = Synth::new(SynthConfig::good(15)).unwrap();
    square.set_volume(0.2).unwrap();
    square.set_output(Some(ch.center));
    let mut side = Synth::new(SynthConfig::fast(15)).unwrap();
    side.set_volume(0.1).unwrap();
    side.set_output(Some(ch.left));

    let mut pcm = Vec::new();
    for frame in 0..5u32 {
        for i in 0..30u32 {
            let t = i * 977 + frame * 13;
            square.update(t, if i % 2 == 0 { 15 } else { 3 }, &mut stereo).unwrap();
            if frame % 2 == 1 {
                side.update(t + 400, ((i * 7) % 16) as i32, &mut stereo).unwrap();
            }
        }
        stereo.end_frame(NES_FRAME).unwrap();
        let mut out = vec![0i16; stereo.samples_avail()];
        let count = stereo.read_samples(&mut out).unwrap();
        pcm.extend_from_slice(&out[..count]);
    }
    pcm
}

#[test]
fn identical_calls_render_identical_pcm() {
    let a = render_song();
    let b = render_song();
    assert_eq!(a.len(), 5 * 735 * 2);
    assert_eq!(a, b);
}

#[test]
fn silent_buffer_discards_writes_and_refuses_resize() {
    let mut silent = BlipBuffer::silent();
    let synth = Synth::new(SynthConfig::good(1)).unwrap();
    synth.offset(10, 1, &mut silent).unwrap();
    assert_eq!(silent.samples_avail(), 0);
    assert!(matches!(
        silent.set_sample_rate(44_100, 100),
        Err(BlipError::SilentBuffer(_))
    ));
    assert!(matches!(
        silent.mix_samples(&[1, 2, 3]),
        Err(BlipError::SilentBuffer(_))
    ));
}

#[test]
fn frame_overrun_leaves_buffer_untouched() {
    let mut buf = nes_buffer();
    buf.end_frame(NES_FRAME).unwrap();
    let before = buf.samples_avail();
    assert!(matches!(
        buf.end_frame(NES_FRAME * 10),
        Err(BlipError::FrameOverrun { .. })
    ));
    assert_eq!(buf.samples_avail(), before);
}
