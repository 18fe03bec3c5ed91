use blip_mix::{
    BufferId, ChannelType, EffectsBuffer, EffectsConfig, MonoBuffer, MultiBuffer, StereoBuffer,
    Synth, SynthConfig,
};

fn configure<M: MultiBuffer>(buf: &mut M) {
    buf.set_sample_rate(44_100, 100).unwrap();
    buf.set_clock_rate(44_100 * 4).unwrap();
    buf.set_bass_frequency(0);
}

fn synth(volume: f64) -> Synth {
    let mut synth = Synth::new(SynthConfig::good(10)).unwrap();
    synth.set_volume(volume).unwrap();
    synth
}

fn read_frame<M: MultiBuffer>(buf: &mut M) -> Vec<i16> {
    let mut out = vec![0i16; buf.samples_avail()];
    let count = buf.read_samples(&mut out).unwrap();
    out.truncate(count);
    out
}

#[test]
fn left_only_frame_mixes_without_center() {
    let mut stereo = StereoBuffer::new();
    configure(&mut stereo);
    let ch = stereo.channel(0, ChannelType::WAVE);
    let synth = synth(0.25);

    synth.offset_in(40, 10, ch.left, &mut stereo).unwrap();
    stereo.end_frame(2_000).unwrap();
    let out = read_frame(&mut stereo);
    assert_eq!(out.len(), 1_000);
    assert!(out.chunks(2).all(|f| f[1] == 0));
    assert!(out[2 * 400] > 16_000);
}

#[test]
fn center_returns_to_mono_after_stereo_frames_drain() {
    let mut stereo = StereoBuffer::new();
    configure(&mut stereo);
    let ch = stereo.channel(0, ChannelType::WAVE);
    let synth = synth(0.125);

    // pulse on the right that settles within the frame
    synth.offset_in(40, 10, ch.right, &mut stereo).unwrap();
    synth.offset_in(400, -10, ch.right, &mut stereo).unwrap();
    stereo.end_frame(2_000).unwrap();
    let first = read_frame(&mut stereo);
    assert!(first[2 * 50 + 1] > 7_000);
    assert_eq!(first[2 * 50], 0);

    for _ in 0..2 {
        synth.offset_in(40, 4, ch.center, &mut stereo).unwrap();
        stereo.end_frame(2_000).unwrap();
        let out = read_frame(&mut stereo);
        assert!(out.chunks(2).all(|f| f[0] == f[1]));
    }
}

#[test]
fn disabled_effects_match_plain_stereo() {
    let mut fx = EffectsBuffer::new(false);
    let mut stereo = StereoBuffer::new();
    configure(&mut fx);
    configure(&mut stereo);
    fx.config(&EffectsConfig::default());
    let synth = synth(0.2);

    let frames: [&[(u32, i32, usize)]; 3] = [
        &[(10, 5, 0)],
        &[(30, 3, 0), (200, 4, 2), (900, -4, 2)],
        &[(77, -2, 0)],
    ];
    for writes in frames {
        for &(time, delta, slot) in writes {
            let a = fx.channel(0, ChannelType::empty());
            let b = stereo.channel(0, ChannelType::empty());
            let (a, b) = match slot {
                0 => (a.center, b.center),
                1 => (a.left, b.left),
                _ => (a.right, b.right),
            };
            synth.offset_in(time, delta, a, &mut fx).unwrap();
            synth.offset_in(time, delta, b, &mut stereo).unwrap();
        }
        fx.end_frame(2_000).unwrap();
        stereo.end_frame(2_000).unwrap();
        assert_eq!(read_frame(&mut fx), read_frame(&mut stereo));
    }
}

#[test]
fn disabled_effects_match_plain_stereo_with_sustained_levels() {
    let mut fx = EffectsBuffer::new(false);
    let mut stereo = StereoBuffer::new();
    configure(&mut fx);
    configure(&mut stereo);
    let synth = synth(0.2);

    // steps that never return to zero, then silence on every buffer
    let frames: [&[(u32, i32, usize)]; 5] = [
        &[(10, 5, 0)],
        &[(30, 3, 1)],
        &[],
        &[(500, 2, 2)],
        &[],
    ];
    let mut last = Vec::new();
    for writes in frames {
        for &(time, delta, slot) in writes {
            let a = fx.channel(0, ChannelType::empty());
            let b = stereo.channel(0, ChannelType::empty());
            let (a, b) = match slot {
                0 => (a.center, b.center),
                1 => (a.left, b.left),
                _ => (a.right, b.right),
            };
            synth.offset_in(time, delta, a, &mut fx).unwrap();
            synth.offset_in(time, delta, b, &mut stereo).unwrap();
        }
        fx.end_frame(2_000).unwrap();
        stereo.end_frame(2_000).unwrap();
        last = read_frame(&mut fx);
        assert_eq!(last, read_frame(&mut stereo));
    }

    // center + left on the left, center + right on the right
    let (l, r) = (last[2 * 200] as i32, last[2 * 200 + 1] as i32);
    assert!(l > r && r > 0, "l {l} r {r}");
}

#[test]
fn effects_spread_panned_voices() {
    let mut fx = EffectsBuffer::new(false);
    configure(&mut fx);
    fx.config(&EffectsConfig {
        pan_1: -0.5,
        pan_2: 0.5,
        reverb_level: 0.0,
        echo_level: 0.0,
        effects_enabled: true,
        ..EffectsConfig::default()
    });
    let synth = synth(0.25);

    let left_voice = fx.channel(0, ChannelType::empty());
    let right_voice = fx.channel(1, ChannelType::empty());
    synth.offset_in(0, 10, left_voice.center, &mut fx).unwrap();
    fx.end_frame(2_000).unwrap();
    let out = read_frame(&mut fx);
    let (l, r) = (out[2 * 300], out[2 * 300 + 1]);
    assert!(l > r, "l {l} r {r}");
    assert!(r > 0);
    assert_ne!(left_voice.center, right_voice.center);
}

#[test]
fn mono_buffer_reads_single_channel() {
    let mut mono = MonoBuffer::new();
    configure(&mut mono);
    let ch = mono.channel(3, ChannelType::MIXED);
    assert_eq!(ch.center, BufferId(0));

    let mut synth = synth(0.25);
    synth.set_output(Some(ch.center));
    synth.update(0, 10, &mut mono).unwrap();
    mono.end_frame(400).unwrap();
    let out = read_frame(&mut mono);
    assert_eq!(out.len(), 100);
    assert!(out[60] > 16_000);
}
