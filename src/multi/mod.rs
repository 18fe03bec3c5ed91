//! Multi-channel buffers
//!
//! A multi-buffer owns several [`BlipBuffer`]s and hands chip emulators a
//! [`Channel`] (center, left and right buffer ids) per oscillator. At read
//! time it mixes the buffers into interleaved 16-bit PCM, picking the
//! cheapest mixer that is correct for what was written during the frame.
//!
//! - [`MonoBuffer`]: one buffer, mono output
//! - [`StereoBuffer`]: center, left and right buffers, stereo output
//! - [`EffectsBuffer`]: per-voice panning, echo and reverb

mod effects;
mod mono;
mod stereo;

pub use effects::{EffectsBuffer, EffectsConfig, MAX_BUFS_PER_VOICE};
pub use mono::MonoBuffer;
pub use stereo::StereoBuffer;

use crate::blip::{BlipBuffer, BlipTime, BufferBank, BufferId};
use crate::constants::BLIP_DEFAULT_LENGTH;
use crate::{BlipError, Result};
use bitflags::bitflags;

bitflags! {
    /// Channel type hints passed to [`MultiBuffer::channel`]
    ///
    /// The low 8 bits carry a type index chosen by the emulator (see
    /// [`ChannelType::indexed`]); the high bits describe the waveform.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelType: u32 {
        /// Tonal (wave) oscillator
        const WAVE = 0x100;
        /// Noise generator
        const NOISE = 0x200;
        /// Mix of tone and noise
        const MIXED = Self::WAVE.bits() | Self::NOISE.bits();
    }
}

impl ChannelType {
    /// Mask of the type index bits
    pub const INDEX_MASK: u32 = 0xFF;

    /// Type with only an index set
    pub fn indexed(index: u8) -> Self {
        Self::from_bits_retain(index as u32)
    }

    /// Type index in the low 8 bits
    pub fn index(&self) -> u32 {
        self.bits() & Self::INDEX_MASK
    }
}

/// Buffers an oscillator writes into
///
/// For mono output all three ids are the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Channel {
    /// Buffer for sound heard equally on both sides
    pub center: BufferId,
    /// Buffer for sound heard on the left
    pub left: BufferId,
    /// Buffer for sound heard on the right
    pub right: BufferId,
}

impl Channel {
    /// Channel routing all three outputs to one buffer
    pub fn mono(id: BufferId) -> Self {
        Self {
            center: id,
            left: id,
            right: id,
        }
    }
}

/// Interface shared by all multi-channel buffers
///
/// Emulators write through the [`BufferBank`] side using ids from
/// [`channel`](Self::channel); players pull PCM with
/// [`read_samples`](Self::read_samples).
pub trait MultiBuffer: BufferBank {
    /// Set output sample rate and buffer length of every buffer
    fn set_sample_rate(&mut self, rate: u32, msec: u32) -> Result<()>;

    /// Set the source clock rate of every buffer
    fn set_clock_rate(&mut self, hz: u32) -> Result<()>;

    /// Set the bass leak frequency of every buffer
    fn set_bass_frequency(&mut self, hz: u32);

    /// Declare how many channels the emulator uses and optionally their types
    fn set_channel_count(&mut self, count: usize, types: Option<&[ChannelType]>) -> Result<()>;

    /// Number of channels declared with [`set_channel_count`](Self::set_channel_count)
    fn channel_count(&self) -> usize;

    /// Buffers for channel `index`
    fn channel(&self, index: usize, channel_type: ChannelType) -> Channel;

    /// Remove all samples and reset mixer state
    fn clear(&mut self);

    /// End the current frame `time` clocks after its start
    fn end_frame(&mut self, time: BlipTime) -> Result<()>;

    /// Mix up to `out.len()` samples into `out`
    ///
    /// # Returns
    ///
    /// Number of samples written (a multiple of
    /// [`samples_per_frame`](Self::samples_per_frame))
    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize>;

    /// Number of samples available for reading
    fn samples_avail(&self) -> usize;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Buffer length in milliseconds
    fn length(&self) -> u32;

    /// Number of interleaved samples per output frame
    fn samples_per_frame(&self) -> usize;

    /// Incremented whenever channel assignments change
    ///
    /// Emulators compare it with a stored value and re-query
    /// [`channel`](Self::channel) when it differs.
    fn channels_changed_count(&self) -> u32;
}

/// State common to every multi-buffer implementation
#[derive(Debug, Clone)]
pub(crate) struct MultiBufferState {
    pub sample_rate: u32,
    pub length: u32,
    pub samples_per_frame: usize,
    pub channels_changed_count: u32,
    pub channel_types: Vec<ChannelType>,
    pub channel_count: usize,
}

impl MultiBufferState {
    pub fn new(samples_per_frame: usize) -> Self {
        Self {
            sample_rate: 0,
            length: BLIP_DEFAULT_LENGTH,
            samples_per_frame,
            channels_changed_count: 1,
            channel_types: Vec::new(),
            channel_count: 0,
        }
    }

    pub fn channels_changed(&mut self) {
        self.channels_changed_count = self.channels_changed_count.wrapping_add(1);
    }

    pub fn set_channel_count(&mut self, count: usize, types: Option<&[ChannelType]>) -> Result<()> {
        if let Some(types) = types {
            if types.len() < count {
                return Err(BlipError::ConfigError(format!(
                    "{} channel types given for {count} channels",
                    types.len()
                )));
            }
        }
        self.channel_count = count;
        self.channel_types = types.map(|t| t[..count].to_vec()).unwrap_or_default();
        Ok(())
    }

    /// Declared type of channel `index`, if types were given
    pub fn channel_type(&self, index: usize) -> Option<ChannelType> {
        self.channel_types.get(index).copied()
    }

    /// Check that a read of `count` samples covers whole output frames
    pub fn check_aligned(&self, count: usize) -> Result<()> {
        if count % self.samples_per_frame != 0 {
            return Err(BlipError::UnalignedRead {
                count,
                frame: self.samples_per_frame,
            });
        }
        Ok(())
    }
}

/// Which buffers of a multi-buffer a read has to mix (bit per buffer)
///
/// A buffer counts as used while it was written during a frame not yet
/// fully read or during the frame before it, and while its integrator
/// still holds a nonzero level.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UsedBuffers {
    /// Buffers modified during frames not yet fully read
    added: u32,
    /// Value of `added` when the previous read drained the buffers
    was_added: u32,
}

impl UsedBuffers {
    pub fn frame_ended(&mut self, modified: u32) {
        self.added |= modified;
    }

    pub fn used(&self, bufs: &[BlipBuffer]) -> u32 {
        bufs.iter()
            .enumerate()
            .filter(|(_, buf)| buf.holds_level())
            .fold(self.added | self.was_added, |bits, (i, _)| bits | 1 << i)
    }

    /// Call once every buffer has been read empty
    pub fn drained(&mut self) {
        self.was_added = self.added;
        self.added = 0;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Apply a rate change to every buffer, then record the realized length
///
/// Every buffer is validated and allocated before any of them changes, so
/// a failure leaves all of them as they were.
pub(crate) fn set_buffers_sample_rate(
    bufs: &mut [BlipBuffer],
    state: &mut MultiBufferState,
    rate: u32,
    msec: u32,
) -> Result<()> {
    let pending = bufs
        .iter()
        .map(|buf| buf.prepare_sample_rate(rate, msec))
        .collect::<Result<Vec<_>>>()?;
    for (buf, pending) in bufs.iter_mut().zip(pending) {
        buf.commit_sample_rate(pending);
    }
    state.sample_rate = rate;
    state.length = bufs.first().map(BlipBuffer::length).unwrap_or(msec);
    Ok(())
}
