use blip_mix::{
    BlipBuffer, BlipTime, DualResampler, FirResampler, FrameSource, Result, Synth, SynthConfig,
};

#[test]
fn unit_ratio_passes_input_through() {
    let mut fir = FirResampler::<16>::new();
    fir.set_buffer_size(1024).unwrap();
    assert_eq!(fir.set_time_ratio(1.0, 0.999, 1.0).unwrap(), 1.0);
    assert!(fir.is_bypassed());

    let input: Vec<i16> = (0..512).map(|i| ((i * 37) % 2001 - 1000) as i16).collect();
    fir.write_buffer()[..input.len()].copy_from_slice(&input);
    fir.write(input.len()).unwrap();

    let mut out = vec![0i16; 512];
    assert_eq!(fir.read(&mut out), 512);
    assert_eq!(out, input);
    assert_eq!(fir.written(), 0);
}

#[test]
fn halving_rate_keeps_low_tone_level() {
    let mut fir = FirResampler::<16>::new();
    fir.set_buffer_size(8192).unwrap();
    let ratio = fir.set_time_ratio(2.0, 0.999, 1.0).unwrap();
    assert_eq!(ratio, 2.0);

    // 200 Hz at 88.2 kHz, stereo
    let pairs = 4000;
    let buf = fir.write_buffer();
    for i in 0..pairs {
        let s = (8_000.0 * (i as f64 * 2.0 * std::f64::consts::PI * 200.0 / 88_200.0).sin()) as i16;
        buf[i * 2] = s;
        buf[i * 2 + 1] = s;
    }
    fir.write(pairs * 2).unwrap();

    let mut out = vec![0i16; pairs];
    let count = fir.read(&mut out);
    assert!(count >= pairs - 32, "{count}");
    let peak = out[64..count].iter().step_by(2).map(|&s| (s as i32).abs()).max().unwrap();
    // DC gain of the windowed sinc at this rolloff is about 0.96
    assert!((7_200..=8_100).contains(&peak), "{peak}");
}

/// FM stand-in rendering a constant level, plus one PSG step on the first frame
struct Chip {
    fm_level: i16,
    psg: Synth,
    frames: u32,
}

impl FrameSource for Chip {
    fn play_frame(
        &mut self,
        _blip_time: BlipTime,
        pcm_count: usize,
        pcm_out: &mut [i16],
        blip: &mut BlipBuffer,
    ) -> Result<usize> {
        pcm_out[..pcm_count].fill(self.fm_level);
        if self.frames == 0 {
            self.psg.offset(0, 4, blip)?;
        }
        self.frames += 1;
        Ok(pcm_count)
    }
}

#[test]
fn dual_path_sums_fm_and_psg() {
    let mut blip = BlipBuffer::new();
    blip.set_sample_rate(44_100, 100).unwrap();
    blip.set_clock_rate(3_579_545).unwrap();
    blip.set_bass_frequency(0);

    let mut dual = DualResampler::new();
    dual.setup(53_267.0 / 44_100.0, 0.999, 1.0).unwrap();
    dual.reset(735).unwrap();

    let mut psg = Synth::new(SynthConfig::good(10)).unwrap();
    psg.set_volume(0.1).unwrap();
    let mut chip = Chip {
        fm_level: 2_000,
        psg,
        frames: 0,
    };

    let mut out = vec![0i16; 735 * 2 * 3];
    dual.dual_play(&mut out, &mut blip, &mut chip).unwrap();
    assert_eq!(chip.frames, 3);

    // psg: 4/10 of 0.1 full scale; fm: 2 * (2000 * 0.5 * ~0.96)
    let psg_level = 0.04 * 65_536.0;
    let expected = psg_level + 2.0 * 2_000.0 * 0.5 * 0.96;
    for &s in &out[735 * 2..] {
        assert!((s as f64 - expected).abs() < 120.0, "{s} vs {expected}");
    }
}
