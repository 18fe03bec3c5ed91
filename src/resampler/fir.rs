//! Polyphase FIR resampler for interleaved stereo
//!
//! The resampler converts between two arbitrary rates by cycling through up
//! to [`MAX_RES`] precomputed windowed-sinc phases. Ratios this close to 1.0
//! skip convolution entirely.

use crate::{BlipError, Result};
use std::f64::consts::PI;

/// Largest number of filter phases
pub const MAX_RES: usize = 32;

/// Samples per frame (interleaved left/right)
const STEREO: usize = 2;

/// Ratios within this distance of 1.0 copy input to output
const BYPASS_TOLERANCE: f64 = 1e-5;

/// Harmonics in the band-limited series used for each phase
const MAX_HARMONICS: f64 = 256.0;

const FIXED_BITS: u32 = 15;

/// Polyphase FIR resampler with `WIDTH` taps per phase
///
/// Usage cycle: [`set_buffer_size`](Self::set_buffer_size), then
/// [`set_time_ratio`](Self::set_time_ratio); per block, fill
/// [`write_buffer`](Self::write_buffer), commit with
/// [`write`](Self::write) and drain with [`read`](Self::read).
#[derive(Clone)]
pub struct FirResampler<const WIDTH: usize> {
    impulses: Vec<[i16; WIDTH]>,
    buf: Vec<i16>,
    write_pos: usize,
    res: usize,
    imp_phase: usize,
    skip_bits: u32,
    /// Input samples consumed per output, excluding skips
    step: usize,
    input_per_cycle: usize,
    ratio: f64,
    bypass: bool,
    bypass_gain: i32,
}

impl<const WIDTH: usize> FirResampler<WIDTH> {
    const VALID_WIDTH: () = assert!(
        WIDTH >= 4 && WIDTH % 2 == 0,
        "FIR width must be even and at least 4"
    );

    /// History kept ahead of new input so the first outputs have a full window
    const WRITE_OFFSET: usize = WIDTH * STEREO - STEREO;

    /// Create a resampler with no buffer and a ratio of 1.0
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_WIDTH;
        Self {
            impulses: vec![[0; WIDTH]; MAX_RES],
            buf: Vec::new(),
            write_pos: 0,
            res: 1,
            imp_phase: 0,
            skip_bits: 0,
            step: STEREO,
            input_per_cycle: STEREO,
            ratio: 1.0,
            bypass: false,
            bypass_gain: 1 << FIXED_BITS,
        }
    }

    /// Allocate room for `new_size` input samples and clear
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::OutOfMemory`] if the buffer cannot be allocated;
    /// the old buffer is kept in that case.
    pub fn set_buffer_size(&mut self, new_size: usize) -> Result<()> {
        let total = new_size + Self::WRITE_OFFSET;
        let mut buf: Vec<i16> = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|e| BlipError::OutOfMemory(e.to_string()))?;
        buf.resize(total, 0);
        self.buf = buf;
        self.clear();
        Ok(())
    }

    /// Discard buffered input and restart at phase zero
    pub fn clear(&mut self) {
        self.imp_phase = 0;
        if !self.buf.is_empty() {
            self.write_pos = Self::WRITE_OFFSET;
            self.buf[..Self::WRITE_OFFSET].fill(0);
        }
    }

    /// Set the input/output rate ratio and regenerate the filter
    ///
    /// # Arguments
    ///
    /// * `new_ratio` - Input samples per output sample
    /// * `rolloff` - Treble rolloff of each phase (0.999 = nearly flat)
    /// * `gain` - Output gain
    ///
    /// # Returns
    ///
    /// The realized ratio, the nearest one expressible with [`MAX_RES`] phases
    pub fn set_time_ratio(&mut self, new_ratio: f64, rolloff: f64, gain: f64) -> Result<f64> {
        if !new_ratio.is_finite() || new_ratio <= 0.0 {
            return Err(BlipError::ConfigError(format!(
                "resampling ratio {new_ratio} must be positive"
            )));
        }

        if (new_ratio - 1.0).abs() < BYPASS_TOLERANCE {
            self.bypass = true;
            self.bypass_gain = (gain * (1 << FIXED_BITS) as f64).round() as i32;
            self.ratio = 1.0;
            self.res = 1;
            self.step = STEREO;
            self.skip_bits = 0;
            self.input_per_cycle = STEREO;
            log::debug!("resampler ratio {new_ratio} within tolerance of 1.0, bypassing filter");
            self.clear();
            return Ok(self.ratio);
        }

        // pick the phase count whose cycle lands closest to a whole input count
        let mut res = 1;
        let mut fstep = 0.0;
        let mut least_error = 2.0;
        let mut pos = 0.0;
        for r in 1..=MAX_RES {
            pos += new_ratio;
            let nearest = (pos + 0.5f64).floor();
            let error = (pos - nearest).abs();
            if error < least_error {
                res = r;
                fstep = nearest / r as f64;
                least_error = error;
            }
        }

        if fstep == 0.0 {
            return Err(BlipError::ConfigError(format!(
                "resampling ratio {new_ratio} is below what {MAX_RES} phases can express"
            )));
        }

        self.bypass = false;
        self.res = res;
        self.skip_bits = 0;
        self.step = STEREO * fstep.floor() as usize;
        self.ratio = fstep;
        let frac = fstep % 1.0;

        let filter = if self.ratio < 1.0 { 1.0 } else { 1.0 / self.ratio };
        let width = ((WIDTH as f64 * filter + 1.0) as usize) & !1;
        let mut pos = 0.0;
        self.input_per_cycle = 0;
        for i in 0..self.res {
            gen_sinc(
                rolloff,
                width,
                pos,
                filter,
                0x7FFF as f64 * gain * filter,
                &mut self.impulses[i],
            );
            pos += frac;
            self.input_per_cycle += self.step;
            if pos >= 0.9999999 {
                pos -= 1.0;
                self.skip_bits |= 1 << i;
                self.input_per_cycle += STEREO;
            }
        }
        log::debug!(
            "resampler ratio {new_ratio} realized as {} with {} phases",
            self.ratio,
            self.res
        );

        self.clear();
        Ok(self.ratio)
    }

    /// Realized ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Whether the filter is bypassed
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Free space for new input, starting at the write position
    pub fn write_buffer(&mut self) -> &mut [i16] {
        &mut self.buf[self.write_pos..]
    }

    /// Number of input samples that fit in [`write_buffer`](Self::write_buffer)
    pub fn max_write(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    /// Commit `count` samples written into [`write_buffer`](Self::write_buffer)
    pub fn write(&mut self, count: usize) -> Result<()> {
        if count > self.max_write() {
            return Err(BlipError::FrameOverrun {
                available: self.write_pos + count,
                capacity: self.buf.len(),
            });
        }
        self.write_pos += count;
        Ok(())
    }

    /// Input samples buffered and not yet consumed
    pub fn written(&self) -> usize {
        self.write_pos.saturating_sub(Self::WRITE_OFFSET)
    }

    /// Output samples [`read`](Self::read) could produce from buffered input
    pub fn avail(&self) -> usize {
        if self.bypass {
            return self.written();
        }
        let Some(mut input_count) = self.write_pos.checked_sub(WIDTH * STEREO) else {
            return 0;
        };

        let cycles = input_count / self.input_per_cycle;
        let mut output_count = cycles * self.res * STEREO;
        input_count -= cycles * self.input_per_cycle;

        let mut input_count = input_count as isize;
        let mut skip = self.skip_bits >> self.imp_phase;
        let mut remain = self.res - self.imp_phase;
        while input_count >= 0 {
            input_count -= (self.step + (skip & 1) as usize * STEREO) as isize;
            skip >>= 1;
            remain -= 1;
            if remain == 0 {
                skip = self.skip_bits;
                remain = self.res;
            }
            output_count += STEREO;
        }
        output_count
    }

    /// Additional input samples needed before `output_count` samples can be read
    pub fn input_needed(&self, output_count: usize) -> usize {
        let pairs = output_count / STEREO;
        if self.bypass {
            return (pairs * STEREO).saturating_sub(self.written());
        }
        if pairs == 0 {
            return 0;
        }

        let mut input_count = WIDTH * STEREO;
        let mut skip = self.skip_bits >> self.imp_phase;
        let mut remain = self.res - self.imp_phase;
        for _ in 1..pairs {
            input_count += self.step + (skip & 1) as usize * STEREO;
            skip >>= 1;
            remain -= 1;
            if remain == 0 {
                skip = self.skip_bits;
                remain = self.res;
            }
        }
        input_count.saturating_sub(self.write_pos)
    }

    /// Drop up to `count` input samples without producing output
    ///
    /// # Returns
    ///
    /// Number of samples dropped
    pub fn skip_input(&mut self, count: usize) -> usize {
        let (start, keep) = if self.bypass {
            (Self::WRITE_OFFSET, 0)
        } else {
            (0, WIDTH * STEREO)
        };
        let max_count = self.write_pos.saturating_sub(start + keep);
        let count = count.min(max_count);
        self.buf.copy_within(start + count..self.write_pos, start);
        self.write_pos -= count;
        count
    }

    /// Resample buffered input into `out`
    ///
    /// # Returns
    ///
    /// Number of samples written (always even)
    pub fn read(&mut self, out: &mut [i16]) -> usize {
        if self.bypass {
            return self.read_bypass(out);
        }

        let pairs = out.len() / STEREO;
        let mut input = 0;
        let mut produced = 0;
        let mut skip = self.skip_bits >> self.imp_phase;
        let mut phase = self.imp_phase;
        let mut remain = self.res - self.imp_phase;

        if let Some(end_pos) = self.write_pos.checked_sub(WIDTH * STEREO) {
            while produced < pairs && input <= end_pos {
                let window = &self.buf[input..input + WIDTH * STEREO];
                let mut l = 0i64;
                let mut r = 0i64;
                for (&tap, frame) in self.impulses[phase].iter().zip(window.chunks_exact(STEREO)) {
                    l += tap as i64 * frame[0] as i64;
                    r += tap as i64 * frame[1] as i64;
                }
                out[produced * 2] = saturate(l >> FIXED_BITS);
                out[produced * 2 + 1] = saturate(r >> FIXED_BITS);
                produced += 1;

                input += self.step + (skip & 1) as usize * STEREO;
                skip >>= 1;
                phase += 1;
                remain -= 1;
                if remain == 0 {
                    phase = 0;
                    skip = self.skip_bits;
                    remain = self.res;
                }
            }
        }
        self.imp_phase = phase;

        let input = input.min(self.write_pos);
        self.buf.copy_within(input..self.write_pos, 0);
        self.write_pos -= input;
        produced * STEREO
    }

    fn read_bypass(&mut self, out: &mut [i16]) -> usize {
        let count = self.written().min(out.len() & !1);
        let start = Self::WRITE_OFFSET;
        let input = &self.buf[start..start + count];
        if self.bypass_gain == 1 << FIXED_BITS {
            out[..count].copy_from_slice(input);
        } else {
            for (o, &s) in out.iter_mut().zip(input) {
                *o = saturate((s as i64 * self.bypass_gain as i64) >> FIXED_BITS);
            }
        }
        self.buf.copy_within(start + count..self.write_pos, start);
        self.write_pos -= count;
        count
    }
}

impl<const WIDTH: usize> Default for FirResampler<WIDTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WIDTH: usize> std::fmt::Debug for FirResampler<WIDTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirResampler")
            .field("width", &WIDTH)
            .field("ratio", &self.ratio)
            .field("res", &self.res)
            .field("imp_phase", &self.imp_phase)
            .field("written", &self.written())
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

#[inline]
fn saturate(s: i64) -> i16 {
    s.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Fill `out` with one windowed band-limited impulse
///
/// `width` is the window length in taps, `offset` the fractional position
/// of the impulse center and `spacing` the tap distance relative to the
/// output sample period.
fn gen_sinc(rolloff: f64, width: usize, offset: f64, spacing: f64, scale: f64, out: &mut [i16]) {
    let count = out.len();
    let maxh = MAX_HARMONICS;
    let step = PI / maxh * spacing;
    let to_w = maxh * 2.0 / width as f64;
    let pow_a_n = rolloff.powf(maxh);
    let scale = scale / (maxh * 2.0);

    let mut angle = ((count / 2) as f64 - 1.0 + offset) * -step;
    for tap in out.iter_mut() {
        *tap = 0;
        let w = angle * to_w;
        if w.abs() < PI {
            let rolloff_cos_a = rolloff * angle.cos();
            let num = 1.0 - rolloff_cos_a - pow_a_n * (maxh * angle).cos()
                + pow_a_n * rolloff * ((maxh - 1.0) * angle).cos();
            let den = 1.0 - rolloff_cos_a - rolloff_cos_a + rolloff * rolloff;
            let sinc = scale * num / den - scale;
            *tap = (w.cos() * sinc + sinc) as i16;
        }
        angle += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(resampler: &mut FirResampler<16>, samples: &[i16]) {
        resampler.write_buffer()[..samples.len()].copy_from_slice(samples);
        resampler.write(samples.len()).unwrap();
    }

    #[test]
    fn test_ratio_one_bypasses() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(512).unwrap();
        assert_eq!(resampler.set_time_ratio(1.0, 0.99, 1.0).unwrap(), 1.0);
        assert!(resampler.is_bypassed());

        let input: Vec<i16> = (0..200).map(|i| (i * 37 - 3000) as i16).collect();
        fill(&mut resampler, &input);
        assert_eq!(resampler.avail(), 200);

        let mut out = vec![0i16; 200];
        assert_eq!(resampler.read(&mut out), 200);
        assert_eq!(out, input);
        assert_eq!(resampler.written(), 0);
    }

    #[test]
    fn test_ratio_selection() {
        let mut resampler = FirResampler::<12>::new();
        resampler.set_buffer_size(256).unwrap();
        assert_eq!(resampler.set_time_ratio(1.5, 0.99, 1.0).unwrap(), 1.5);
        assert!(!resampler.is_bypassed());
        assert_eq!(resampler.set_time_ratio(2.0, 0.99, 1.0).unwrap(), 2.0);

        // 44.1 kHz from 53.267 kHz is not exact with 32 phases
        let realized = resampler.set_time_ratio(53_267.0 / 44_100.0, 0.99, 1.0).unwrap();
        assert!((realized - 53_267.0 / 44_100.0).abs() < 0.01);
        assert!(resampler.set_time_ratio(0.0, 0.99, 1.0).is_err());
    }

    #[test]
    fn test_unrepresentable_ratio_rejected() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(256).unwrap();
        resampler.set_time_ratio(2.0, 0.99, 1.0).unwrap();

        // no multiple within 32 phases rounds to a whole input sample
        let err = resampler.set_time_ratio(0.01, 0.99, 1.0).unwrap_err();
        assert!(matches!(err, BlipError::ConfigError(_)));
        assert_eq!(resampler.ratio(), 2.0);

        fill(&mut resampler, &[100; 200]);
        assert_eq!(resampler.avail(), 100);
    }

    #[test]
    fn test_avail_matches_read() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(1024).unwrap();
        resampler.set_time_ratio(2.0, 0.999, 1.0).unwrap();

        fill(&mut resampler, &[100; 200]);
        let avail = resampler.avail();
        assert_eq!(avail, 100);

        let mut out = vec![0i16; 1024];
        assert_eq!(resampler.read(&mut out), avail);
        assert_eq!(resampler.avail(), 0);
    }

    #[test]
    fn test_dc_passes_at_unity_gain() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(2048).unwrap();
        resampler.set_time_ratio(1.5, 0.999, 1.0).unwrap();

        fill(&mut resampler, &[10_000; 1200]);
        let mut out = vec![0i16; 1024];
        let count = resampler.read(&mut out);
        assert!(count > 600);
        for &s in &out[100..count - 100] {
            assert!((9_000..=10_100).contains(&s), "{s}");
        }
    }

    #[test]
    fn test_input_needed() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(1024).unwrap();
        resampler.set_time_ratio(2.0, 0.999, 1.0).unwrap();

        let needed = resampler.input_needed(100);
        fill(&mut resampler, &vec![0; needed]);
        assert_eq!(resampler.avail(), 100);
        assert_eq!(resampler.input_needed(100), 0);
    }

    #[test]
    fn test_skip_input_keeps_window() {
        let mut resampler = FirResampler::<16>::new();
        resampler.set_buffer_size(256).unwrap();
        resampler.set_time_ratio(2.0, 0.99, 1.0).unwrap();
        fill(&mut resampler, &[1; 100]);

        let skipped = resampler.skip_input(1000);
        assert_eq!(skipped, 100 + 30 - 32);
        assert_eq!(resampler.skip_input(10), 0);
    }

    #[test]
    fn test_write_overflow() {
        let mut resampler = FirResampler::<8>::new();
        resampler.set_buffer_size(16).unwrap();
        assert_eq!(resampler.max_write(), 16);
        assert!(resampler.write(17).is_err());
        resampler.write(16).unwrap();
        assert_eq!(resampler.max_write(), 0);
    }
}
