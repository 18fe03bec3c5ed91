//! Independent-rate resampling
//!
//! - [`FirResampler`]: polyphase FIR over interleaved stereo
//! - [`DualResampler`]: FM path through a FIR resampler mixed with a
//!   band-limited path

mod dual;
mod fir;

pub use dual::{DualResampler, FrameSource, DUAL_RESAMPLER_WIDTH};
pub use fir::{FirResampler, MAX_RES};
