//! Band-limited audio synthesis for sound-chip emulators
//!
//! Converts amplitude transitions emitted by chip logic running at a high
//! clock rate into band-limited, mixed 16-bit PCM at a much lower sample
//! rate, without aliasing or DC drift.
//!
//! # Features
//! - Fixed-point clock to sample time conversion with 16 fractional bits
//! - Fast (two-tap) and accurate (windowed-sinc, 256 phases) step synthesis
//! - Treble equalization of synthesis kernels
//! - Mono, stereo and echo/reverb multi-buffers with per-frame mixer selection
//! - Polyphase FIR resampling and dual-path mixing for FM chips
//! - WAV export of rendered PCM
//!
//! # Crate feature flags
//! - `export-wav` (default): WAV writing (`export`, enables the `hound` dep)
//!
//! # Quick start
//! ```
//! use blip_mix::{BufferBank, ChannelType, MultiBuffer, StereoBuffer, Synth, SynthConfig};
//!
//! let mut stereo = StereoBuffer::new();
//! stereo.set_sample_rate(44_100, 250).unwrap();
//! stereo.set_clock_rate(1_789_773).unwrap();
//!
//! let mut synth = Synth::new(SynthConfig::good(15)).unwrap();
//! synth.set_volume(0.3).unwrap();
//! let channel = stereo.channel(0, ChannelType::empty());
//! synth.set_output(Some(channel.center));
//!
//! // square wave: 8 transitions per frame
//! for i in 0..8 {
//!     let amp = if i % 2 == 0 { 15 } else { 0 };
//!     synth.update(i * 3_000, amp, &mut stereo).unwrap();
//! }
//! stereo.end_frame(29_830).unwrap();
//!
//! let mut pcm = vec![0i16; 2048];
//! let count = stereo.read_samples(&mut pcm).unwrap();
//! assert_eq!(count % 2, 0);
//! ```

#![warn(missing_docs)]

pub mod blip; // Buffers, synths and readers
pub mod constants; // Fixed-point constants and output clamp
pub mod equalizer; // Kernel generation
#[cfg(feature = "export-wav")]
pub mod export; // WAV output
pub mod multi; // Channel composition and mixing
pub mod resampler; // FIR and dual-path resampling

/// Error types for synthesis, mixing and resampling operations
#[derive(thiserror::Error, Debug)]
pub enum BlipError {
    /// Buffer storage could not be allocated
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Requested buffer length exceeds what resampled time can address
    #[error("Buffer of {requested} samples exceeds limit of {limit}")]
    BufferTooLong {
        /// Requested capacity in samples
        requested: usize,
        /// Largest supported capacity in samples
        limit: usize,
    },

    /// Output sample rate of zero
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Clock rate that cannot be represented against the sample rate
    #[error("Clock rate {clock_rate} Hz unusable at sample rate {sample_rate} Hz")]
    InvalidClockRate {
        /// Requested clock rate
        clock_rate: u32,
        /// Current sample rate
        sample_rate: u32,
    },

    /// Time conversion used before both rates were set
    #[error("Clock rate not set")]
    ClockRateNotSet,

    /// Ending a frame would make more samples available than the buffer holds
    #[error("Frame overrun: {available} samples available, capacity {capacity}")]
    FrameOverrun {
        /// Samples that would be available
        available: usize,
        /// Buffer capacity
        capacity: usize,
    },

    /// A write landed beyond the buffer's capacity
    #[error("Time out of range: sample {sample}, capacity {capacity}")]
    TimeOutOfRange {
        /// Sample index of the write
        sample: usize,
        /// Buffer capacity
        capacity: usize,
    },

    /// More samples removed than are available
    #[error("Cannot remove {requested} samples, only {available} available")]
    RemoveBeyondAvailable {
        /// Samples requested
        requested: usize,
        /// Samples available
        available: usize,
    },

    /// Operation not supported on a silent buffer
    #[error("Silent buffer does not support {0}")]
    SilentBuffer(&'static str),

    /// Invalid synth construction parameters
    #[error("Invalid synth configuration: {0}")]
    InvalidSynthConfig(String),

    /// Volume too low for the kernel to represent
    #[error("Volume unit {0} too low for kernel precision")]
    VolumeTooLow(f64),

    /// Synth update without a bound output buffer
    #[error("Synth has no output buffer")]
    UnboundOutput,

    /// Read count not a multiple of the output frame size
    #[error("Read of {count} samples not a multiple of frame size {frame}")]
    UnalignedRead {
        /// Requested sample count
        count: usize,
        /// Samples per output frame
        frame: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),
}

/// Result type for synthesis operations
pub type Result<T> = std::result::Result<T, BlipError>;

// Public API exports
pub use blip::{
    BlipBuffer, BlipReader, BlipTime, BufferBank, BufferId, KernelMode, Synth, SynthConfig,
};
pub use constants::clamp_sample;
pub use equalizer::BlipEq;
#[cfg(feature = "export-wav")]
pub use export::{write_wav, WavSink};
pub use multi::{
    Channel, ChannelType, EffectsBuffer, EffectsConfig, MonoBuffer, MultiBuffer, StereoBuffer,
};
pub use resampler::{DualResampler, FirResampler, FrameSource};
