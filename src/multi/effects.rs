//! Stereo panning, echo and reverb
//!
//! Each voice owns up to seven buffers:
//!
//! | buffer | role                                   |
//! |--------|----------------------------------------|
//! | 0      | panned by `pan_1`, fed into the reverb |
//! | 1      | panned by `pan_2`, fed into the reverb |
//! | 2      | center, fed into the echo              |
//! | 3, 4   | direct left / right                    |
//! | 5, 6   | left / right fed into the reverb       |
//!
//! With effects disabled every channel maps to buffers 0, 1 and 2 as
//! center, left and right, and mixing is identical to a
//! [`StereoBuffer`](super::StereoBuffer). A center-only buffer has just the
//! first three buffers per voice and routes every side to the center.
//!
//! All effect coefficients are Q15 fixed point, computed once in
//! [`EffectsBuffer::config`].

use super::{
    set_buffers_sample_rate, Channel, ChannelType, MultiBuffer, MultiBufferState, UsedBuffers,
};
use crate::blip::{BlipBuffer, BlipReader, BlipTime, BufferBank, BufferId};
use crate::constants::clamp_sample;
use crate::{BlipError, Result};
use serde::{Deserialize, Serialize};

/// Buffers per voice with effects support
pub const MAX_BUFS_PER_VOICE: usize = 7;

/// Buffers per voice in center-only mode
const CENTER_ONLY_BUFS: usize = 3;

/// Largest number of voices a buffer can be built with
pub const MAX_VOICES: usize = 16;

const ECHO_SIZE: usize = 4096;
const ECHO_MASK: usize = ECHO_SIZE - 1;
const REVERB_SIZE: usize = 16384;
const REVERB_MASK: usize = REVERB_SIZE - 1;

/// Channel types per voice: two panned reverb sources, echoed center
const CHAN_TYPES_COUNT: usize = 3;

/// Bits of buffers whose use forces stereo mixing
const STEREO_MASK_ENABLED: u32 = 0x78;
const STEREO_MASK_DISABLED: u32 = 0x06;
const CENTER_MASK: u32 = 0x01;

const FIXED_BITS: u32 = 15;

#[inline]
fn to_fixed(f: f32) -> i32 {
    (f as f64 * (1 << FIXED_BITS) as f64 + 0.5) as i32
}

#[inline]
fn fmul(x: i32, y: i32) -> i32 {
    x.wrapping_mul(y) >> FIXED_BITS
}

/// User-facing effect parameters
///
/// Delays are in milliseconds, levels and pans are fractions (pan -1.0 =
/// full left, 1.0 = full right).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Pan of the first reverb source
    pub pan_1: f32,
    /// Pan of the second reverb source
    pub pan_2: f32,
    /// Echo delay in ms
    pub echo_delay: f32,
    /// Echo feedback level
    pub echo_level: f32,
    /// Reverb delay in ms
    pub reverb_delay: f32,
    /// Reverb feedback level
    pub reverb_level: f32,
    /// Difference between left and right delays in ms
    pub delay_variance: f32,
    /// Enable echo and reverb
    pub effects_enabled: bool,
}

impl EffectsConfig {
    /// Derive a full configuration from a single depth knob (0.0 = off)
    pub fn from_depth(depth: f64) -> Self {
        let f = depth as f32;
        let level = f.min(0.5);
        Self {
            pan_1: -0.6 * f,
            pan_2: 0.6 * f,
            reverb_delay: 88.0,
            echo_delay: 61.0,
            reverb_level: 0.5 * level,
            echo_level: 0.3 * level,
            delay_variance: 18.0,
            effects_enabled: depth > 0.0,
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    ///
    /// # Example
    ///
    /// ```
    /// use blip_mix::EffectsConfig;
    ///
    /// let cfg = EffectsConfig::from_json(r#"{ "echo_level": 0.3, "effects_enabled": true }"#).unwrap();
    /// assert!(cfg.effects_enabled);
    /// assert_eq!(cfg.reverb_delay, 88.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BlipError::ConfigError(format!("effects config: {e}")))
    }

    /// Serialize the configuration to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BlipError::ConfigError(format!("effects config: {e}")))
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            pan_1: -0.15,
            pan_2: 0.15,
            echo_delay: 61.0,
            echo_level: 0.10,
            reverb_delay: 88.0,
            reverb_level: 0.12,
            delay_variance: 18.0,
            effects_enabled: false,
        }
    }
}

/// Q15 coefficients derived from an [`EffectsConfig`]
#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    pan_1_levels: [i32; 2],
    pan_2_levels: [i32; 2],
    echo_delay_l: usize,
    echo_delay_r: usize,
    echo_level: i32,
    reverb_delay_l: usize,
    reverb_delay_r: usize,
    reverb_level: i32,
}

impl Coefficients {
    fn new(cfg: &EffectsConfig, sample_rate: u32) -> Self {
        let pan_1 = to_fixed(1.0) - to_fixed(cfg.pan_1);
        let pan_2 = to_fixed(1.0) - to_fixed(cfg.pan_2);
        let rate = sample_rate as f64;
        let delay_offset = (cfg.delay_variance as f64 * rate / 2000.0) as i64;

        let rs = REVERB_SIZE as i64;
        let reverb_delay = (cfg.reverb_delay as f64 * rate / 1000.0) as i64;
        let reverb_delay_l = pin("reverb left", rs - (reverb_delay - delay_offset) * 2, 0, rs - 2);
        let reverb_delay_r = pin("reverb right", rs + 1 - (reverb_delay + delay_offset) * 2, 1, rs - 1);

        let es = ECHO_SIZE as i64;
        let echo_delay = (cfg.echo_delay as f64 * rate / 1000.0) as i64;
        let echo_delay_l = pin("echo left", es - 1 - (echo_delay - delay_offset), 0, es - 1);
        let echo_delay_r = pin("echo right", es - 1 - (echo_delay + delay_offset), 0, es - 1);

        Self {
            pan_1_levels: [pan_1, to_fixed(2.0) - pan_1],
            pan_2_levels: [pan_2, to_fixed(2.0) - pan_2],
            echo_delay_l,
            echo_delay_r,
            echo_level: to_fixed(cfg.echo_level),
            reverb_delay_l,
            reverb_delay_r,
            reverb_level: to_fixed(cfg.reverb_level),
        }
    }
}

/// Pin a ring offset to `[min, max]`; a pinned delay means the requested
/// delay does not fit the ring
fn pin(what: &str, n: i64, min: i64, max: i64) -> usize {
    if n < min || n > max {
        log::warn!("{what} delay offset {n} pinned to [{min}, {max}]");
    }
    n.clamp(min, max) as usize
}

/// Echo and reverb history of one voice
#[derive(Clone)]
struct VoiceRings {
    echo: Vec<i16>,
    echo_pos: usize,
    reverb: Vec<i16>,
    reverb_pos: usize,
}

impl VoiceRings {
    fn new() -> Self {
        Self {
            echo: vec![0; ECHO_SIZE],
            echo_pos: 0,
            reverb: vec![0; REVERB_SIZE],
            reverb_pos: 0,
        }
    }

    fn clear(&mut self) {
        self.echo.fill(0);
        self.reverb.fill(0);
        self.echo_pos = 0;
        self.reverb_pos = 0;
    }
}

/// Multi-voice buffer with stereo panning, echo and reverb
///
/// Output frames hold two samples (left, right) per voice.
#[derive(Clone)]
pub struct EffectsBuffer {
    bufs: Vec<BlipBuffer>,
    bufs_per_voice: usize,
    voices: usize,
    rings: Vec<VoiceRings>,
    /// (center, left, right) per channel type, per voice
    chan_types: Vec<Channel>,
    config: EffectsConfig,
    coefs: Coefficients,
    /// Effects state as of the last `end_frame`, so tails are flushed
    effects_enabled: bool,
    used: UsedBuffers,
    effect_remain: usize,
    state: MultiBufferState,
}

impl EffectsBuffer {
    /// Single-voice buffer
    ///
    /// A center-only buffer allocates three buffers instead of seven and
    /// supports only mono mixing plus effects on the center.
    pub fn new(center_only: bool) -> Self {
        Self::build(1, center_only)
    }

    /// Buffer with `voices` independent stereo outputs
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::ConfigError`] if `voices` is 0 or above [`MAX_VOICES`].
    pub fn with_voices(voices: usize, center_only: bool) -> Result<Self> {
        if voices == 0 || voices > MAX_VOICES {
            return Err(BlipError::ConfigError(format!(
                "voice count {voices} must be within 1..={MAX_VOICES}"
            )));
        }
        Ok(Self::build(voices, center_only))
    }

    fn build(voices: usize, center_only: bool) -> Self {
        let bufs_per_voice = if center_only {
            CENTER_ONLY_BUFS
        } else {
            MAX_BUFS_PER_VOICE
        };
        let mut buffer = Self {
            bufs: (0..voices * bufs_per_voice).map(|_| BlipBuffer::new()).collect(),
            bufs_per_voice,
            voices,
            rings: (0..voices).map(|_| VoiceRings::new()).collect(),
            chan_types: vec![Channel::default(); voices * CHAN_TYPES_COUNT],
            config: EffectsConfig::default(),
            coefs: Coefficients::default(),
            effects_enabled: false,
            used: UsedBuffers::default(),
            effect_remain: 0,
            state: MultiBufferState::new(voices * 2),
        };
        buffer.apply_config(EffectsConfig::default());
        buffer
    }

    /// Number of voices
    pub fn voices(&self) -> usize {
        self.voices
    }

    /// Whether only three buffers per voice are allocated
    pub fn is_center_only(&self) -> bool {
        self.bufs_per_voice < MAX_BUFS_PER_VOICE
    }

    /// Current effect parameters
    pub fn effects_config(&self) -> &EffectsConfig {
        &self.config
    }

    /// Apply new effect parameters
    ///
    /// Enabling effects clears the echo and reverb history. Channel
    /// assignments change, so emulators must re-query their channels.
    pub fn config(&mut self, cfg: &EffectsConfig) {
        self.apply_config(*cfg);
    }

    /// Configure effects from a single depth knob (0.0 disables them)
    pub fn set_depth(&mut self, depth: f64) {
        self.apply_config(EffectsConfig::from_depth(depth));
    }

    fn apply_config(&mut self, cfg: EffectsConfig) {
        self.state.channels_changed();
        if !self.config.effects_enabled && cfg.effects_enabled {
            for rings in self.rings.iter_mut() {
                rings.clear();
            }
        }
        self.config = cfg;

        for voice in 0..self.voices {
            let base = voice * self.bufs_per_voice;
            let id = |i: usize| BufferId(base + i);
            let types = &mut self.chan_types[voice * CHAN_TYPES_COUNT..][..CHAN_TYPES_COUNT];
            if cfg.effects_enabled {
                types[0] = Channel {
                    center: id(0),
                    left: id(3),
                    right: id(4),
                };
                types[1] = Channel {
                    center: id(1),
                    left: id(3),
                    right: id(4),
                };
                types[2] = Channel {
                    center: id(2),
                    left: id(5),
                    right: id(6),
                };
            } else {
                let plain = Channel {
                    center: id(0),
                    left: id(1),
                    right: id(2),
                };
                types.fill(plain);
            }
            if self.bufs_per_voice < MAX_BUFS_PER_VOICE {
                for t in types.iter_mut() {
                    *t = Channel::mono(t.center);
                }
            }
        }

        // recomputed by set_sample_rate once the rate is known
        if cfg.effects_enabled && self.state.sample_rate != 0 {
            self.coefs = Coefficients::new(&cfg, self.state.sample_rate);
            log::debug!(
                "effects enabled: echo {} ms at {}, reverb {} ms at {}",
                cfg.echo_delay,
                cfg.echo_level,
                cfg.reverb_delay,
                cfg.reverb_level
            );
        }
    }

    fn voice_bufs(&mut self, voice: usize) -> &mut [BlipBuffer] {
        let n = self.bufs_per_voice;
        &mut self.bufs[voice * n..(voice + 1) * n]
    }
}

impl Default for EffectsBuffer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for EffectsBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectsBuffer")
            .field("voices", &self.voices)
            .field("bufs_per_voice", &self.bufs_per_voice)
            .field("config", &self.config)
            .field("used", &self.used)
            .field("effect_remain", &self.effect_remain)
            .finish_non_exhaustive()
    }
}

impl BufferBank for EffectsBuffer {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        self.bufs.get_mut(id.0)
    }
}

impl MultiBuffer for EffectsBuffer {
    fn set_sample_rate(&mut self, rate: u32, msec: u32) -> Result<()> {
        set_buffers_sample_rate(&mut self.bufs, &mut self.state, rate, msec)?;
        // delays are in samples, so they follow the rate
        self.apply_config(self.config);
        self.clear();
        Ok(())
    }

    fn set_clock_rate(&mut self, hz: u32) -> Result<()> {
        for buf in self.bufs.iter_mut() {
            buf.set_clock_rate(hz)?;
        }
        Ok(())
    }

    fn set_bass_frequency(&mut self, hz: u32) {
        for buf in self.bufs.iter_mut() {
            buf.set_bass_frequency(hz);
        }
    }

    fn set_channel_count(&mut self, count: usize, types: Option<&[ChannelType]>) -> Result<()> {
        self.state.set_channel_count(count, types)?;
        self.state.channels_changed();
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.state.channel_count
    }

    fn channel(&self, index: usize, channel_type: ChannelType) -> Channel {
        let channel_type = if channel_type.is_empty() {
            self.state.channel_type(index).unwrap_or(channel_type)
        } else {
            channel_type
        };

        let out = if channel_type.is_empty() {
            (index % 5).min(2)
        } else if !channel_type.contains(ChannelType::NOISE) && channel_type.index() % 3 != 0 {
            (channel_type.bits() & 1) as usize
        } else {
            2
        };
        self.chan_types[(index % self.voices) * CHAN_TYPES_COUNT + out]
    }

    fn clear(&mut self) {
        self.used.clear();
        self.effect_remain = 0;
        for rings in self.rings.iter_mut() {
            rings.clear();
        }
        for buf in self.bufs.iter_mut() {
            buf.clear();
        }
    }

    fn end_frame(&mut self, time: BlipTime) -> Result<()> {
        let mut modified = 0u32;
        for voice in 0..self.voices {
            for (i, buf) in self.voice_bufs(voice).iter_mut().enumerate() {
                if buf.clear_modified() {
                    modified |= 1 << i;
                }
                buf.end_frame(time)?;
            }
        }
        self.used.frame_ended(modified);

        if self.effects_enabled || self.config.effects_enabled {
            self.effect_remain = self.bufs[0].samples_avail() + self.bufs[0].output_latency();
        }
        self.effects_enabled = self.config.effects_enabled;
        Ok(())
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize> {
        self.state.check_aligned(out.len())?;
        let stride = self.voices * 2;
        let total = self.bufs[0].samples_avail().min(out.len() / stride);
        if total == 0 {
            return Ok(0);
        }

        let n = self.bufs_per_voice;
        let used = self
            .bufs
            .chunks(n)
            .fold(0, |bits, voice| bits | self.used.used(voice));

        let mut remain = total;
        while remain > 0 {
            let mut count = remain;
            let mode = if self.effect_remain > 0 {
                count = count.min(self.effect_remain);
                if used & STEREO_MASK_ENABLED != 0 {
                    Mix::Enhanced
                } else {
                    Mix::MonoEnhanced
                }
            } else if self.is_center_only() || used & STEREO_MASK_DISABLED == 0 {
                Mix::Mono
            } else if used & CENTER_MASK != 0 {
                Mix::Stereo
            } else {
                Mix::StereoNoCenter
            };
            let mixed = mode.buffers();

            let start = (total - remain) * stride;
            let block = &mut out[start..start + count * stride];
            for voice in 0..self.voices {
                let bufs = &mut self.bufs[voice * n..(voice + 1) * n];
                let rings = &mut self.rings[voice];
                let frames = Frames {
                    out: &mut *block,
                    stride,
                    off: voice * 2,
                };
                match mode {
                    Mix::Enhanced => mix_enhanced(bufs, rings, &self.coefs, frames),
                    Mix::MonoEnhanced => mix_mono_enhanced(bufs, rings, &self.coefs, frames),
                    Mix::Stereo => mix_stereo(bufs, frames),
                    Mix::StereoNoCenter => mix_stereo_no_center(bufs, frames),
                    Mix::Mono => mix_mono(bufs, frames),
                }
                for (i, buf) in bufs.iter_mut().enumerate() {
                    if mixed & (1 << i) != 0 {
                        buf.remove_samples(count)?;
                    } else {
                        // keep unread buffers time-aligned
                        buf.remove_silence(count)?;
                    }
                }
            }

            remain -= count;
            self.effect_remain = self.effect_remain.saturating_sub(count);
        }

        if self.bufs[0].samples_avail() == 0 {
            self.used.drained();
        }
        Ok(total * stride)
    }

    fn samples_avail(&self) -> usize {
        self.bufs[0].samples_avail() * self.voices * 2
    }

    fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }

    fn length(&self) -> u32 {
        self.state.length
    }

    fn samples_per_frame(&self) -> usize {
        self.state.samples_per_frame
    }

    fn channels_changed_count(&self) -> u32 {
        self.state.channels_changed_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mix {
    Mono,
    Stereo,
    StereoNoCenter,
    MonoEnhanced,
    Enhanced,
}

impl Mix {
    /// Buffers of a voice the mixer reads (bit per buffer)
    fn buffers(self) -> u32 {
        match self {
            Mix::Mono => CENTER_MASK,
            Mix::StereoNoCenter => STEREO_MASK_DISABLED,
            Mix::Stereo | Mix::MonoEnhanced => CENTER_MASK | STEREO_MASK_DISABLED,
            Mix::Enhanced => (1 << MAX_BUFS_PER_VOICE) - 1,
        }
    }
}

/// Output slots of one voice within a block of interleaved frames
struct Frames<'a> {
    out: &'a mut [i16],
    stride: usize,
    off: usize,
}

impl Frames<'_> {
    fn for_each(self, mut f: impl FnMut(&mut i16, &mut i16)) {
        let off = self.off;
        for frame in self.out.chunks_exact_mut(self.stride) {
            let (l, r) = frame[off..off + 2].split_at_mut(1);
            f(&mut l[0], &mut r[0]);
        }
    }
}

fn store_accums(bufs: &mut [BlipBuffer], accums: &[i32]) {
    for (buf, &accum) in bufs.iter_mut().zip(accums) {
        buf.set_reader_accum(accum);
    }
}

fn mix_mono(bufs: &mut [BlipBuffer], frames: Frames<'_>) {
    let bass = bufs[0].bass_shift();
    let mut c = BlipReader::begin(&bufs[0]);
    frames.for_each(|left, right| {
        let s = clamp_sample(c.read());
        c.advance(bass);
        *left = s;
        *right = s;
    });
    let accums = [c.finish()];
    store_accums(bufs, &accums);
}

fn mix_stereo(bufs: &mut [BlipBuffer], frames: Frames<'_>) {
    let bass = bufs[0].bass_shift();
    let mut c = BlipReader::begin(&bufs[0]);
    let mut l = BlipReader::begin(&bufs[1]);
    let mut r = BlipReader::begin(&bufs[2]);
    frames.for_each(|left, right| {
        let cs = c.read();
        *left = clamp_sample(cs + l.read());
        *right = clamp_sample(cs + r.read());
        c.advance(bass);
        l.advance(bass);
        r.advance(bass);
    });
    let accums = [c.finish(), l.finish(), r.finish()];
    store_accums(bufs, &accums);
}

fn mix_stereo_no_center(bufs: &mut [BlipBuffer], frames: Frames<'_>) {
    let bass = bufs[0].bass_shift();
    let mut l = BlipReader::begin(&bufs[1]);
    let mut r = BlipReader::begin(&bufs[2]);
    frames.for_each(|left, right| {
        *left = clamp_sample(l.read());
        *right = clamp_sample(r.read());
        l.advance(bass);
        r.advance(bass);
    });
    let (l, r) = (l.finish(), r.finish());
    bufs[1].set_reader_accum(l);
    bufs[2].set_reader_accum(r);
}

fn mix_mono_enhanced(
    bufs: &mut [BlipBuffer],
    rings: &mut VoiceRings,
    coefs: &Coefficients,
    frames: Frames<'_>,
) {
    let bass = bufs[2].bass_shift();
    let mut sq1 = BlipReader::begin(&bufs[0]);
    let mut sq2 = BlipReader::begin(&bufs[1]);
    let mut center = BlipReader::begin(&bufs[2]);
    let mut echo_pos = rings.echo_pos;
    let mut reverb_pos = rings.reverb_pos;
    let reverb = &mut rings.reverb;
    let echo = &mut rings.echo;

    frames.for_each(|out_l, out_r| {
        let sum1 = sq1.read();
        let sum2 = sq2.read();
        sq1.advance(bass);
        sq2.advance(bass);

        let new_reverb_l = fmul(sum1, coefs.pan_1_levels[0])
            + fmul(sum2, coefs.pan_2_levels[0])
            + reverb[(reverb_pos + coefs.reverb_delay_l) & REVERB_MASK] as i32;
        let new_reverb_r = fmul(sum1, coefs.pan_1_levels[1])
            + fmul(sum2, coefs.pan_2_levels[1])
            + reverb[(reverb_pos + coefs.reverb_delay_r) & REVERB_MASK] as i32;
        reverb[reverb_pos] = fmul(new_reverb_l, coefs.reverb_level) as i16;
        reverb[reverb_pos + 1] = fmul(new_reverb_r, coefs.reverb_level) as i16;
        reverb_pos = (reverb_pos + 2) & REVERB_MASK;

        let sum3 = center.read();
        center.advance(bass);
        let left = new_reverb_l
            + sum3
            + fmul(coefs.echo_level, echo[(echo_pos + coefs.echo_delay_l) & ECHO_MASK] as i32);
        let right = new_reverb_r
            + sum3
            + fmul(coefs.echo_level, echo[(echo_pos + coefs.echo_delay_r) & ECHO_MASK] as i32);
        echo[echo_pos] = sum3 as i16;
        echo_pos = (echo_pos + 1) & ECHO_MASK;

        *out_l = clamp_sample(left);
        *out_r = clamp_sample(right);
    });

    rings.echo_pos = echo_pos;
    rings.reverb_pos = reverb_pos;
    let accums = [sq1.finish(), sq2.finish(), center.finish()];
    store_accums(bufs, &accums);
}

fn mix_enhanced(
    bufs: &mut [BlipBuffer],
    rings: &mut VoiceRings,
    coefs: &Coefficients,
    frames: Frames<'_>,
) {
    let bass = bufs[2].bass_shift();
    let mut sq1 = BlipReader::begin(&bufs[0]);
    let mut sq2 = BlipReader::begin(&bufs[1]);
    let mut center = BlipReader::begin(&bufs[2]);
    let mut l1 = BlipReader::begin(&bufs[3]);
    let mut r1 = BlipReader::begin(&bufs[4]);
    let mut l2 = BlipReader::begin(&bufs[5]);
    let mut r2 = BlipReader::begin(&bufs[6]);
    let mut echo_pos = rings.echo_pos;
    let mut reverb_pos = rings.reverb_pos;
    let reverb = &mut rings.reverb;
    let echo = &mut rings.echo;

    frames.for_each(|out_l, out_r| {
        let sum1 = sq1.read();
        let sum2 = sq2.read();
        sq1.advance(bass);
        sq2.advance(bass);

        let new_reverb_l = fmul(sum1, coefs.pan_1_levels[0])
            + fmul(sum2, coefs.pan_2_levels[0])
            + l2.read()
            + reverb[(reverb_pos + coefs.reverb_delay_l) & REVERB_MASK] as i32;
        let new_reverb_r = fmul(sum1, coefs.pan_1_levels[1])
            + fmul(sum2, coefs.pan_2_levels[1])
            + r2.read()
            + reverb[(reverb_pos + coefs.reverb_delay_r) & REVERB_MASK] as i32;
        l2.advance(bass);
        r2.advance(bass);
        reverb[reverb_pos] = fmul(new_reverb_l, coefs.reverb_level) as i16;
        reverb[reverb_pos + 1] = fmul(new_reverb_r, coefs.reverb_level) as i16;
        reverb_pos = (reverb_pos + 2) & REVERB_MASK;

        let sum3 = center.read();
        center.advance(bass);
        let left = new_reverb_l
            + sum3
            + l1.read()
            + fmul(coefs.echo_level, echo[(echo_pos + coefs.echo_delay_l) & ECHO_MASK] as i32);
        let right = new_reverb_r
            + sum3
            + r1.read()
            + fmul(coefs.echo_level, echo[(echo_pos + coefs.echo_delay_r) & ECHO_MASK] as i32);
        l1.advance(bass);
        r1.advance(bass);
        echo[echo_pos] = sum3 as i16;
        echo_pos = (echo_pos + 1) & ECHO_MASK;

        *out_l = clamp_sample(left);
        *out_r = clamp_sample(right);
    });

    rings.echo_pos = echo_pos;
    rings.reverb_pos = reverb_pos;
    let accums = [
        sq1.finish(),
        sq2.finish(),
        center.finish(),
        l1.finish(),
        r1.finish(),
        l2.finish(),
        r2.finish(),
    ];
    store_accums(bufs, &accums);
}
