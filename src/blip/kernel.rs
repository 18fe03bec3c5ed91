//! Impulse kernels used by [`Synth`](super::Synth)
//!
//! Two strategies deposit a band-limited amplitude step into a buffer:
//! - [`FastKernel`] splits the delta linearly over two samples
//! - [`AccurateKernel`] convolves it with a multi-phase windowed-sinc impulse

use crate::constants::{BLIP_PHASE_BITS, BLIP_RES, BLIP_SAMPLE_BITS, BLIP_WIDEST_IMPULSE};
use crate::equalizer::BlipEq;
use crate::{BlipError, Result};

/// Treble used when a volume is set before any equalizer
pub const DEFAULT_TREBLE_DB: f64 = -8.0;

/// Sum of all taps of one kernel phase before volume scaling
const BASE_KERNEL_UNIT: i64 = 32768;

/// Offset of the two-tap split inside a kernel window (aligned with the
/// center of the widest accurate kernel)
const FAST_CENTER: usize = BLIP_WIDEST_IMPULSE / 2;

/// A strategy for depositing band-limited steps into a buffer
///
/// The window passed to [`deposit`](Self::deposit) starts at the sample the
/// event falls in and spans [`BLIP_WIDEST_IMPULSE`] + 2 slots.
pub trait SynthKernel: std::fmt::Debug {
    /// Number of output samples touched per step
    fn width(&self) -> usize;

    /// Rebuild the kernel for a new equalizer
    fn treble_eq(&mut self, eq: &BlipEq) -> Result<()>;

    /// Set the accumulator amplitude produced by a delta of one
    fn volume_unit(&mut self, unit: f64) -> Result<()>;

    /// Multiplier applied to every delta
    fn delta_factor(&self) -> i32;

    /// Add a step of `delta` at sub-sample `phase` (0..BLIP_RES) into `window`
    fn deposit(&self, window: &mut [i32], phase: usize, delta: i32);
}

/// Two-tap linear interpolation kernel
#[derive(Debug, Clone, Default)]
pub struct FastKernel {
    delta_factor: i32,
}

impl FastKernel {
    /// Create a kernel with zero volume
    pub fn new() -> Self {
        Self::default()
    }
}

impl SynthKernel for FastKernel {
    fn width(&self) -> usize {
        2
    }

    fn treble_eq(&mut self, _eq: &BlipEq) -> Result<()> {
        Ok(())
    }

    fn volume_unit(&mut self, unit: f64) -> Result<()> {
        let factor = (unit * (1u64 << BLIP_SAMPLE_BITS) as f64 + 0.5).floor();
        self.delta_factor = checked_factor(factor, unit)?;
        Ok(())
    }

    fn delta_factor(&self) -> i32 {
        self.delta_factor
    }

    #[inline]
    fn deposit(&self, window: &mut [i32], phase: usize, delta: i32) {
        let delta = delta.wrapping_mul(self.delta_factor);
        // shifting after the multiply would overflow
        let right = (delta >> BLIP_PHASE_BITS).wrapping_mul(phase as i32);
        let left = window[FAST_CENTER].wrapping_add(delta).wrapping_sub(right);
        window[FAST_CENTER] = left;
        window[FAST_CENTER + 1] = window[FAST_CENTER + 1].wrapping_add(right);
    }
}

/// Multi-phase windowed-sinc convolution kernel
///
/// Only half of the symmetric impulse is stored: `BLIP_RES / 2 * width + 1`
/// taps, read forwards for the left half of a step and backwards for the
/// right half.
#[derive(Clone)]
pub struct AccurateKernel {
    impulses: Vec<i16>,
    width: usize,
    /// Sum of the taps of each phase; 0 until an equalizer has been applied
    kernel_unit: i64,
    volume_unit: f64,
    delta_factor: i32,
}

impl AccurateKernel {
    /// Create a kernel touching `width` samples per step
    ///
    /// `width` must be even and within `4..=BLIP_WIDEST_IMPULSE`.
    pub fn new(width: usize) -> Result<Self> {
        if width < 4 || width % 2 != 0 || width > BLIP_WIDEST_IMPULSE {
            return Err(BlipError::InvalidSynthConfig(format!(
                "kernel width {width} must be even and within 4..={BLIP_WIDEST_IMPULSE}"
            )));
        }
        Ok(Self {
            impulses: vec![0; Self::impulses_size_for(width)],
            width,
            kernel_unit: 0,
            volume_unit: 0.0,
            delta_factor: 0,
        })
    }

    fn impulses_size_for(width: usize) -> usize {
        BLIP_RES / 2 * width + 1
    }

    fn impulses_size(&self) -> usize {
        Self::impulses_size_for(self.width)
    }

    /// Current kernel unit (sum of taps of every phase)
    pub fn kernel_unit(&self) -> i64 {
        self.kernel_unit
    }

    /// The taps applied for a step at `phase`, in window order
    pub fn phase_taps(&self, phase: usize) -> Vec<i16> {
        let half = self.width / 2;
        let mut taps = Vec::with_capacity(self.width);
        taps.extend((0..half).map(|k| self.impulses[BLIP_RES - phase + BLIP_RES * k]));
        taps.extend((0..half).map(|k| self.impulses[phase + BLIP_RES * (half - 1 - k)]));
        taps
    }

    /// Distribute rounding error so every phase pair sums to the kernel unit
    fn adjust_impulse(&mut self) {
        let size = self.impulses_size();
        let res = BLIP_RES as isize;
        for p in (res / 2 - 1..res).rev() {
            let p2 = res - 2 - p;
            let mut error = self.kernel_unit;
            for i in (1..size as isize).step_by(BLIP_RES) {
                error -= self.impulses[(i + p) as usize] as i64;
                error -= self.impulses[(i + p2) as usize] as i64;
            }
            if p == p2 {
                // the half-phase impulse uses the same half for both sides
                error /= 2;
            }
            let idx = size - BLIP_RES + p as usize;
            self.impulses[idx] = (self.impulses[idx] as i32 + error as i16 as i32) as i16;
        }
    }
}

impl SynthKernel for AccurateKernel {
    fn width(&self) -> usize {
        self.width
    }

    fn treble_eq(&mut self, eq: &BlipEq) -> Result<()> {
        let res = BLIP_RES;
        let half_size = res / 2 * (self.width - 1);
        let mut fimpulse = vec![0.0f32; res / 2 * (BLIP_WIDEST_IMPULSE - 1) + res * 2];
        eq.generate(&mut fimpulse[res..res + half_size]);

        // mirror slightly past the center for the integration below
        for i in 0..res {
            fimpulse[res + half_size + i] = fimpulse[res + half_size - 1 - i];
        }

        let total: f64 = fimpulse[res..res + half_size]
            .iter()
            .map(|&v| v as f64)
            .sum();
        let rescale = BASE_KERNEL_UNIT as f64 / 2.0 / total;
        self.kernel_unit = BASE_KERNEL_UNIT;

        // integrate, take the first difference over one sample, rescale
        let mut sum = 0.0f64;
        let mut next = 0.0f64;
        for i in 0..self.impulses_size() {
            self.impulses[i] = ((next - sum) * rescale + 0.5).floor() as i32 as i16;
            sum += fimpulse[i] as f64;
            next += fimpulse[i + res] as f64;
        }
        self.adjust_impulse();
        log::debug!(
            "rebuilt {}-tap kernel (treble {} dB, rolloff {} Hz)",
            self.width,
            eq.treble,
            eq.rolloff_freq
        );

        // volume might need rescaling against the new kernel
        let vol = self.volume_unit;
        if vol != 0.0 {
            self.volume_unit = 0.0;
            self.volume_unit(vol)?;
        }
        Ok(())
    }

    fn volume_unit(&mut self, new_unit: f64) -> Result<()> {
        if new_unit == self.volume_unit {
            return Ok(());
        }
        if self.kernel_unit == 0 {
            self.treble_eq(&BlipEq::new(DEFAULT_TREBLE_DB))?;
        }

        let mut factor = new_unit * (1u64 << BLIP_SAMPLE_BITS) as f64 / self.kernel_unit as f64;
        if factor > 0.0 {
            // a very small unit needs an attenuated kernel to keep precision
            let mut shift = 0u32;
            while factor < 2.0 {
                shift += 1;
                factor *= 2.0;
            }
            if shift > 0 {
                let kernel_unit = self.kernel_unit >> shift;
                if kernel_unit <= 0 {
                    return Err(BlipError::VolumeTooLow(new_unit));
                }
                self.kernel_unit = kernel_unit;

                // keep values positive so the shift rounds consistently
                let offset = 0x8000i32 + (1 << (shift - 1));
                let offset2 = 0x8000i32 >> shift;
                for tap in self.impulses.iter_mut() {
                    *tap = (((*tap as i32 + offset) >> shift) - offset2) as i16;
                }
                self.adjust_impulse();
            }
        }
        self.delta_factor = checked_factor((factor + 0.5).floor(), new_unit)?;
        self.volume_unit = new_unit;
        Ok(())
    }

    fn delta_factor(&self) -> i32 {
        self.delta_factor
    }

    #[inline]
    fn deposit(&self, window: &mut [i32], phase: usize, delta: i32) {
        let delta = delta.wrapping_mul(self.delta_factor);
        let half = self.width / 2;
        let fwd = (BLIP_WIDEST_IMPULSE - self.width) / 2;

        let left = &mut window[fwd..fwd + self.width];
        let (left_half, right_half) = left.split_at_mut(half);
        for (k, slot) in left_half.iter_mut().enumerate() {
            let tap = self.impulses[BLIP_RES - phase + BLIP_RES * k] as i32;
            *slot = slot.wrapping_add(tap.wrapping_mul(delta));
        }
        for (k, slot) in right_half.iter_mut().enumerate() {
            let tap = self.impulses[phase + BLIP_RES * (half - 1 - k)] as i32;
            *slot = slot.wrapping_add(tap.wrapping_mul(delta));
        }
    }
}

impl std::fmt::Debug for AccurateKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccurateKernel")
            .field("width", &self.width)
            .field("kernel_unit", &self.kernel_unit)
            .field("volume_unit", &self.volume_unit)
            .field("delta_factor", &self.delta_factor)
            .finish_non_exhaustive()
    }
}

fn checked_factor(factor: f64, unit: f64) -> Result<i32> {
    if !factor.is_finite() || factor < i32::MIN as f64 || factor > i32::MAX as f64 {
        return Err(BlipError::InvalidSynthConfig(format!(
            "volume unit {unit} overflows the delta factor"
        )));
    }
    Ok(factor as i32)
}
