//! Treble equalizer and windowed-sinc kernel generation
//!
//! An equalizer describes the frequency response of a synth kernel: a
//! low-pass at the output Nyquist rate with a logarithmic treble shelf
//! starting at the rolloff frequency. [`BlipEq::generate`] evaluates the
//! closed-form band-limited series at oversampled points and tapers the
//! result with half of a Hamming window.

use crate::constants::{BLIP_RES, DEFAULT_SAMPLE_RATE};
use std::f64::consts::PI;

/// Number of harmonics in the closed-form band-limited series.
const MAX_HARMONICS: f64 = 4096.0;

/// Lowest treble accepted, in dB.
const MIN_TREBLE_DB: f64 = -300.0;

/// Highest treble accepted, in dB.
const MAX_TREBLE_DB: f64 = 5.0;

/// Highest normalized cutoff accepted.
const MAX_CUTOFF: f64 = 0.999;

/// Treble equalization parameters for a synth kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlipEq {
    /// Treble level at the Nyquist frequency, in dB (0 = flat, negative = duller)
    pub treble: f64,
    /// Frequency where the treble shelf starts, in Hz (0 = start at DC)
    pub rolloff_freq: u32,
    /// Output sample rate the kernel is built for, in Hz
    pub sample_rate: u32,
    /// Low-pass cutoff in Hz (0 = derive from kernel width)
    pub cutoff_freq: u32,
}

impl BlipEq {
    /// Equalizer with the given treble and defaults for everything else
    pub fn new(treble: f64) -> Self {
        Self::with_rolloff(treble, 0, DEFAULT_SAMPLE_RATE)
    }

    /// Equalizer with treble, rolloff frequency and sample rate
    pub fn with_rolloff(treble: f64, rolloff_freq: u32, sample_rate: u32) -> Self {
        Self {
            treble,
            rolloff_freq,
            sample_rate,
            cutoff_freq: 0,
        }
    }

    /// Set an explicit low-pass cutoff frequency
    pub fn cutoff(mut self, cutoff_freq: u32) -> Self {
        self.cutoff_freq = cutoff_freq;
        self
    }

    /// Fill `out` with the right half of the kernel
    ///
    /// The points run from the kernel edge towards its center; the last
    /// point is the one nearest the center.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination for the kernel points; its length is the point count
    pub fn generate(&self, out: &mut [f32]) {
        let count = out.len();
        if count == 0 {
            return;
        }

        // narrow kernels have a wider transition band, so lower the cutoff
        // (8 points -> 1.49, 16 points -> 1.15)
        let mut oversample = BLIP_RES as f64 * 2.25 / count as f64 + 0.85;
        let half_rate = self.sample_rate as f64 * 0.5;
        if self.cutoff_freq != 0 {
            oversample = half_rate / self.cutoff_freq as f64;
        }
        let cutoff = self.rolloff_freq as f64 * oversample / half_rate;

        gen_sinc(out, BLIP_RES as f64 * oversample, self.treble, cutoff);

        // half of a Hamming window
        let to_fraction = PI / (count.max(2) - 1) as f64;
        for (i, point) in out.iter_mut().enumerate() {
            *point *= 0.54 - 0.46 * (i as f64 * to_fraction).cos() as f32;
        }
    }
}

impl Default for BlipEq {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Evaluate the band-limited series with a treble shelf at `out.len()` points.
fn gen_sinc(out: &mut [f32], oversample: f64, treble: f64, cutoff: f64) {
    let cutoff = if cutoff >= MAX_CUTOFF {
        log::warn!("equalizer cutoff {cutoff:.4} pinned to {MAX_CUTOFF}");
        MAX_CUTOFF
    } else {
        cutoff
    };
    let treble = if !(MIN_TREBLE_DB..=MAX_TREBLE_DB).contains(&treble) {
        log::warn!("equalizer treble {treble} dB outside [{MIN_TREBLE_DB}, {MAX_TREBLE_DB}]");
        treble.clamp(MIN_TREBLE_DB, MAX_TREBLE_DB)
    } else {
        treble
    };

    let maxh = MAX_HARMONICS;
    let rolloff = 10f64.powf(1.0 / (maxh * 20.0) * treble / (1.0 - cutoff));
    let pow_a_n = rolloff.powf(maxh - maxh * cutoff);
    let to_angle = PI / 2.0 / maxh / oversample;

    let count = out.len() as i64;
    for (i, point) in out.iter_mut().enumerate() {
        let angle = (((i as i64 - count) * 2 + 1) as f64) * to_angle;
        let cos_angle = angle.cos();
        let cos_nc_angle = (maxh * cutoff * angle).cos();
        let cos_nc1_angle = ((maxh * cutoff - 1.0) * angle).cos();

        let mut c = rolloff * ((maxh - 1.0) * angle).cos() - (maxh * angle).cos();
        c = c * pow_a_n - rolloff * cos_nc1_angle + cos_nc_angle;
        let d = 1.0 + rolloff * (rolloff - cos_angle - cos_angle);
        let b = 2.0 - cos_angle - cos_angle;
        let a = 1.0 - cos_angle - cos_nc_angle + cos_nc1_angle;

        // a / b + c / d
        *point = ((a * d + c * b) / (b * d)) as f32;
    }
}
