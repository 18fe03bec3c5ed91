//! blip-render: renders a two-voice square-wave test tone to WAV
//!
//! Exercises the synthesis path end to end: two band-limited square waves
//! are written into a stereo or effects buffer frame by frame, mixed to
//! 16-bit PCM and streamed to a WAV file.

use std::env;
use std::fs;
use std::process;

use anyhow::{bail, Context, Result};
use blip_mix::{
    ChannelType, EffectsBuffer, EffectsConfig, MultiBuffer, StereoBuffer, Synth, SynthConfig,
    WavSink,
};

const DEFAULT_CLOCK_HZ: u32 = 1_789_773;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;
const FRAME_RATE_HZ: u32 = 60;
const AMP_RANGE: i32 = 15;

/// Rendering options parsed from the command line
#[derive(Debug, Clone)]
struct RenderConfig {
    output: String,
    seconds: f64,
    sample_rate: u32,
    clock_rate: u32,
    frequency: f64,
    volume: f64,
    bass_hz: u32,
    treble_db: Option<f64>,
    fast: bool,
    effects: Option<EffectsConfig>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output: "blip.wav".to_string(),
            seconds: 2.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: DEFAULT_CLOCK_HZ,
            frequency: 440.0,
            volume: 0.3,
            bass_hz: 16,
            treble_db: None,
            fast: false,
            effects: None,
        }
    }
}

fn print_usage() {
    println!(
        "Usage:\n  blip-render [options]\n\nOptions:\n  --output <file>      WAV destination (default blip.wav)\n  --seconds <n>        Length in seconds (default 2)\n  --rate <hz>          Output sample rate (default 44100)\n  --clock <hz>         Emulated clock rate (default 1789773)\n  --freq <hz>          Tone frequency of the first voice (default 440)\n  --volume <v>         Synth volume (default 0.3)\n  --bass <hz>          Bass cutoff (default 16)\n  --treble <db>        Treble equalization in dB\n  --fast               Use the fast synth\n  --depth <d>          Enable echo/stereo effects with this depth\n  --effects <file>     Enable effects from a JSON configuration\n  -h, --help           Show this help\n"
    );
}

fn next_value<T: std::str::FromStr>(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T> {
    let value = iter
        .next()
        .with_context(|| format!("{flag} requires an argument"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {flag}: {value}"))
}

/// Parse arguments; `None` when help was requested
fn parse_args() -> Result<Option<RenderConfig>> {
    let mut config = RenderConfig::default();
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output" | "-o" => config.output = next_value(&mut iter, &arg)?,
            "--seconds" => config.seconds = next_value(&mut iter, &arg)?,
            "--rate" => config.sample_rate = next_value(&mut iter, &arg)?,
            "--clock" => config.clock_rate = next_value(&mut iter, &arg)?,
            "--freq" => config.frequency = next_value(&mut iter, &arg)?,
            "--volume" => config.volume = next_value(&mut iter, &arg)?,
            "--bass" => config.bass_hz = next_value(&mut iter, &arg)?,
            "--treble" => config.treble_db = Some(next_value(&mut iter, &arg)?),
            "--fast" => config.fast = true,
            "--depth" => {
                let depth: f64 = next_value(&mut iter, &arg)?;
                config.effects = Some(EffectsConfig::from_depth(depth));
            }
            "--effects" => {
                let path: String = next_value(&mut iter, &arg)?;
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read effects config {path}"))?;
                config.effects = Some(EffectsConfig::from_json(&json)?);
            }
            "--help" | "-h" => return Ok(None),
            other => bail!("unknown argument: {other}"),
        }
    }

    if config.seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    if config.frequency <= 0.0 {
        bail!("--freq must be positive");
    }
    Ok(Some(config))
}

/// One square-wave voice toggling every half period
struct Voice {
    synth: Synth,
    half_period: u32,
    next_toggle: u32,
    high: bool,
}

impl Voice {
    fn new(config: &RenderConfig, frequency: f64) -> Result<Self> {
        let synth_config = if config.fast {
            SynthConfig::fast(AMP_RANGE)
        } else {
            SynthConfig::good(AMP_RANGE)
        };
        let mut synth = Synth::new(synth_config)?;
        synth.set_volume(config.volume)?;
        if let Some(db) = config.treble_db {
            synth.set_treble_eq(&blip_mix::BlipEq::new(db))?;
        }
        let half_period = ((config.clock_rate as f64 / frequency) / 2.0).max(1.0) as u32;
        Ok(Self {
            synth,
            half_period,
            next_toggle: 0,
            high: false,
        })
    }

    fn run<B: MultiBuffer + ?Sized>(&mut self, frame_clocks: u32, buf: &mut B) -> Result<()> {
        while self.next_toggle < frame_clocks {
            self.high = !self.high;
            let amp = if self.high { AMP_RANGE } else { 0 };
            self.synth.update(self.next_toggle, amp, buf)?;
            self.next_toggle += self.half_period;
        }
        self.next_toggle -= frame_clocks;
        Ok(())
    }
}

fn build_buffer(config: &RenderConfig) -> Result<Box<dyn MultiBuffer>> {
    let mut buf: Box<dyn MultiBuffer> = match &config.effects {
        Some(effects) => {
            let mut buf = EffectsBuffer::new(false);
            buf.config(effects);
            Box::new(buf)
        }
        None => Box::new(StereoBuffer::new()),
    };
    buf.set_sample_rate(config.sample_rate, 250)?;
    buf.set_clock_rate(config.clock_rate)?;
    buf.set_bass_frequency(config.bass_hz);
    let types = [
        ChannelType::WAVE | ChannelType::indexed(1),
        ChannelType::WAVE | ChannelType::indexed(2),
    ];
    buf.set_channel_count(types.len(), Some(&types))?;
    Ok(buf)
}

fn render(config: &RenderConfig) -> Result<()> {
    let mut buf = build_buffer(config)?;

    // the second voice a fifth above, panned apart when effects are on
    let mut voices = [
        Voice::new(config, config.frequency)?,
        Voice::new(config, config.frequency * 1.5)?,
    ];
    for (index, voice) in voices.iter_mut().enumerate() {
        let channel = buf.channel(index, ChannelType::empty());
        voice.synth.set_output(Some(channel.center));
    }

    let frame_clocks = config.clock_rate / FRAME_RATE_HZ;
    let frames = (config.seconds * FRAME_RATE_HZ as f64).ceil() as usize;
    let mut sink = WavSink::create(&config.output, config.sample_rate, 2)
        .with_context(|| format!("failed to open {}", config.output))?;
    let mut pcm = vec![0i16; 4096];

    println!(
        "Rendering {:.1}s at {} Hz ({} synth{})...",
        config.seconds,
        config.sample_rate,
        if config.fast { "fast" } else { "accurate" },
        if config.effects.is_some() { ", effects" } else { "" }
    );

    for _ in 0..frames {
        for voice in voices.iter_mut() {
            voice.run(frame_clocks, buf.as_mut())?;
        }
        buf.end_frame(frame_clocks)?;
        while buf.samples_avail() > 0 {
            let count = buf.read_samples(&mut pcm)?;
            if count == 0 {
                break;
            }
            sink.write_samples(&pcm[..count])?;
        }
    }

    let written = sink.frames_written();
    sink.finalize()?;
    println!(
        "Wrote {} frames ({:.2}s) to {}",
        written,
        written as f64 / config.sample_rate as f64,
        config.output
    );
    Ok(())
}

fn main() -> Result<()> {
    let config = match parse_args() {
        Ok(Some(config)) => config,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {e}\n");
            print_usage();
            process::exit(2);
        }
    };
    render(&config)
}
