//! Fixed-point and kernel constants
//!
//! Shared constants used by the buffers, synths and mixers, plus the
//! output clamp every mixer applies.

/// Number of fractional bits in resampled time.
pub const BLIP_BUFFER_ACCURACY: u32 = 16;

/// Number of bits of sub-sample phase resolution used by the synth kernels.
pub const BLIP_PHASE_BITS: u32 = 8;

/// Number of kernel phases (256).
pub const BLIP_RES: usize = 1 << BLIP_PHASE_BITS;

/// Widest supported impulse, in output samples.
pub const BLIP_WIDEST_IMPULSE: usize = 16;

/// Padding slots kept past the nominal buffer capacity to absorb kernel overhang.
pub const BLIP_BUFFER_EXTRA: usize = BLIP_WIDEST_IMPULSE + 2;

/// Number of significant bits of a sample held in the accumulator.
pub const BLIP_SAMPLE_BITS: u32 = 30;

/// Shift from accumulator scale down to 16-bit output scale.
pub const BLIP_READER_SHIFT: u32 = BLIP_SAMPLE_BITS - 16;

/// Default buffer length in milliseconds.
pub const BLIP_DEFAULT_LENGTH: u32 = 1000 / 4;

/// Passing this as a length requests the longest buffer resampled time can address.
pub const BLIP_MAX_LENGTH: u32 = 0;

/// Default bass (high-pass leak) frequency in Hz.
pub const BLIP_DEFAULT_BASS_FREQ: u32 = 16;

/// Default sample rate for equalizers and buffers (44.1 kHz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Saturate an accumulated sample to the signed 16-bit range.
///
/// When `s` does not fit, the extreme is derived from the overflowed high
/// bits: `0x7FFF - (s >> 24)` yields `0x7FFF` for positive overflow and
/// `0x8000` (-32768) for negative overflow.
///
/// # Arguments
///
/// * `s` - Sample at output scale (accumulator already shifted down)
///
/// # Returns
///
/// 16-bit output sample
#[inline]
pub fn clamp_sample(s: i32) -> i16 {
    if (s as i16) as i32 != s {
        (0x7FFF - (s >> 24)) as i16
    } else {
        s as i16
    }
}
