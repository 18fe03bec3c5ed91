//! Export of rendered PCM
//!
//! Output from [`MultiBuffer::read_samples`](crate::MultiBuffer::read_samples)
//! is interleaved 16-bit PCM and is written as-is.

mod wav;

pub use wav::{write_wav, WavSink};
