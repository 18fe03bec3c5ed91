//! Band-limited synthesis core
//!
//! - [`BlipBuffer`]: delta accumulator with clock-to-sample time conversion
//! - [`Synth`]: deposits band-limited steps into buffers
//! - [`BlipReader`]: integrating cursor used by mixers

pub mod buffer;
pub mod kernel;
pub mod reader;
pub mod synth;

pub use buffer::{BlipBuffer, BlipTime, BufferBank, BufferId, ResampledTime};
pub use kernel::{AccurateKernel, FastKernel, SynthKernel};
pub use reader::BlipReader;
pub use synth::{
    KernelMode, Synth, SynthConfig, BLIP_GOOD_QUALITY, BLIP_HIGH_QUALITY, BLIP_LOW_QUALITY,
    BLIP_MED_QUALITY,
};
