//! Band-limited sample buffer
//!
//! A [`BlipBuffer`] accumulates band-limited amplitude deltas deposited by
//! synths at sub-sample positions, converts source-clock time to output
//! sample time in fixed point, and integrates the deltas back into PCM when
//! read.

use super::reader::BlipReader;
use crate::constants::{
    clamp_sample, BLIP_BUFFER_ACCURACY, BLIP_BUFFER_EXTRA, BLIP_DEFAULT_BASS_FREQ,
    BLIP_MAX_LENGTH, BLIP_READER_SHIFT, BLIP_WIDEST_IMPULSE,
};
use crate::{BlipError, Result};

/// Time in source clocks, relative to the start of the current frame
pub type BlipTime = u32;

/// Time in output samples with [`BLIP_BUFFER_ACCURACY`] fractional bits
pub type ResampledTime = u64;

/// Capacity of a silent buffer
const SILENT_BUF_SIZE: usize = 1;

/// Slack kept below the addressable maximum when no length is requested
const MAX_SIZE_MARGIN: usize = 64;

/// A validated rate change with its storage already allocated
#[derive(Debug)]
pub(crate) struct PendingRate {
    rate: u32,
    size: usize,
    factor: u64,
    storage: Option<Vec<i32>>,
}

/// Identifies one [`BlipBuffer`] inside a buffer collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferId(pub usize);

/// A collection of buffers addressable by [`BufferId`]
///
/// Multi-buffers own their [`BlipBuffer`]s and hand out ids through their
/// channels; synths bound to an id write through this trait.
pub trait BufferBank {
    /// Mutable access to the buffer with the given id, if it exists
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer>;
}

impl BufferBank for BlipBuffer {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        (id.0 == 0).then_some(self)
    }
}

impl BufferBank for [BlipBuffer] {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        self.get_mut(id.0)
    }
}

impl BufferBank for Vec<BlipBuffer> {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        self.get_mut(id.0)
    }
}

/// Band-limited sample accumulator with clock-to-sample time conversion
///
/// # Example
///
/// ```
/// use blip_mix::{BlipBuffer, Synth, SynthConfig};
///
/// let mut buf = BlipBuffer::new();
/// buf.set_sample_rate(44_100, 250).unwrap();
/// buf.set_clock_rate(1_789_773).unwrap();
///
/// let mut synth = Synth::new(SynthConfig::good(15)).unwrap();
/// synth.set_volume(0.5).unwrap();
/// synth.offset(100, 15, &mut buf).unwrap();
///
/// buf.end_frame(29_830).unwrap();
/// let mut pcm = vec![0i16; 1024];
/// let read = buf.read_samples(&mut pcm, false).unwrap();
/// assert!(read > 0);
/// ```
#[derive(Clone)]
pub struct BlipBuffer {
    /// Resampling factor: sample_rate / clock_rate in fixed point
    factor: u64,
    /// Resampled time of the start of the current frame
    offset: ResampledTime,
    /// Delta accumulator, `buffer_size + BLIP_BUFFER_EXTRA` long
    buffer: Vec<i32>,
    /// Nominal capacity in samples
    buffer_size: usize,
    /// Bass-leak integrator carried between reads
    reader_accum: i32,
    bass_shift: u32,
    sample_rate: u32,
    clock_rate: u32,
    bass_freq: u32,
    /// Length in milliseconds
    length: u32,
    /// Set by synth writes, cleared by multi-buffers at end of frame
    modified: bool,
    silent: bool,
}

impl BlipBuffer {
    /// Create an empty buffer
    ///
    /// Call [`set_sample_rate`](Self::set_sample_rate) and
    /// [`set_clock_rate`](Self::set_clock_rate) before use.
    pub fn new() -> Self {
        Self {
            factor: 0,
            offset: 0,
            buffer: Vec::new(),
            buffer_size: 0,
            reader_accum: 0,
            bass_shift: 0,
            sample_rate: 0,
            clock_rate: 0,
            bass_freq: BLIP_DEFAULT_BASS_FREQ,
            length: 0,
            modified: false,
            silent: false,
        }
    }

    /// Create a silent buffer
    ///
    /// A silent buffer accepts synth writes and discards them, never has
    /// samples available and cannot be resized. Use it as an output for
    /// voices that should not be heard.
    pub fn silent() -> Self {
        Self {
            buffer: vec![0; SILENT_BUF_SIZE + BLIP_BUFFER_EXTRA],
            buffer_size: SILENT_BUF_SIZE,
            silent: true,
            ..Self::new()
        }
    }

    /// Whether this is a silent buffer
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Largest capacity resampled time can address, in samples
    pub fn max_size() -> usize {
        ((u32::MAX >> BLIP_BUFFER_ACCURACY) as usize) - BLIP_BUFFER_EXTRA - MAX_SIZE_MARGIN
    }

    /// Set output sample rate and buffer length, then clear the buffer
    ///
    /// # Arguments
    ///
    /// * `rate` - Output sample rate in Hz
    /// * `msec` - Buffer length in milliseconds ([`BLIP_MAX_LENGTH`] for the maximum)
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::OutOfMemory`] if the storage cannot be allocated and
    /// [`BlipError::BufferTooLong`] if the length exceeds what resampled time can
    /// address; the buffer is left untouched in both cases.
    pub fn set_sample_rate(&mut self, rate: u32, msec: u32) -> Result<()> {
        let pending = self.prepare_sample_rate(rate, msec)?;
        self.commit_sample_rate(pending);
        Ok(())
    }

    /// Validate a rate change and allocate its storage without touching the buffer
    pub(crate) fn prepare_sample_rate(&self, rate: u32, msec: u32) -> Result<PendingRate> {
        if self.silent {
            return Err(BlipError::SilentBuffer("set_sample_rate"));
        }
        if rate == 0 {
            return Err(BlipError::InvalidSampleRate(rate));
        }

        let max_size = Self::max_size();
        let size = if msec != BLIP_MAX_LENGTH {
            let requested = ((rate as u64 * (msec as u64 + 1) + 999) / 1000) as usize;
            if requested >= max_size {
                return Err(BlipError::BufferTooLong {
                    requested,
                    limit: max_size,
                });
            }
            requested
        } else {
            max_size
        };

        let factor = if self.clock_rate != 0 {
            clock_rate_factor(rate, self.clock_rate)?
        } else {
            self.factor
        };

        let storage = if self.buffer_size != size || self.buffer.len() != size + BLIP_BUFFER_EXTRA {
            let total = size + BLIP_BUFFER_EXTRA;
            let mut storage: Vec<i32> = Vec::new();
            storage
                .try_reserve_exact(total)
                .map_err(|e| BlipError::OutOfMemory(e.to_string()))?;
            storage.resize(total, 0);
            Some(storage)
        } else {
            None
        };

        Ok(PendingRate {
            rate,
            size,
            factor,
            storage,
        })
    }

    /// Apply a rate change from [`prepare_sample_rate`](Self::prepare_sample_rate)
    pub(crate) fn commit_sample_rate(&mut self, pending: PendingRate) {
        let PendingRate {
            rate,
            size,
            factor,
            storage,
        } = pending;
        if let Some(storage) = storage {
            self.buffer = storage;
            log::debug!("blip buffer resized to {size} samples at {rate} Hz");
        }

        self.buffer_size = size;
        self.sample_rate = rate;
        self.length = (size as u64 * 1000 / rate as u64).saturating_sub(1) as u32;
        self.factor = factor;
        self.set_bass_frequency(self.bass_freq);
        self.clear();
    }

    /// Set the source clock rate in Hz and recompute the resampling factor
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::InvalidClockRate`] when the clock/sample ratio is
    /// too extreme to represent (factor rounds to zero).
    pub fn set_clock_rate(&mut self, hz: u32) -> Result<()> {
        if self.silent {
            return Err(BlipError::SilentBuffer("set_clock_rate"));
        }
        if hz == 0 {
            return Err(BlipError::InvalidClockRate {
                clock_rate: hz,
                sample_rate: self.sample_rate,
            });
        }
        let factor = if self.sample_rate != 0 {
            clock_rate_factor(self.sample_rate, hz)?
        } else {
            0
        };
        self.clock_rate = hz;
        self.factor = factor;
        Ok(())
    }

    /// Set the frequency of the bass leak (high-pass) applied when reading
    ///
    /// Zero disables the leak almost entirely.
    pub fn set_bass_frequency(&mut self, hz: u32) {
        self.bass_freq = hz;
        let mut shift = 31;
        if hz > 0 && self.sample_rate > 0 {
            shift = 13;
            let mut f = ((hz as u64) << 16) / self.sample_rate as u64;
            loop {
                f >>= 1;
                if f == 0 {
                    break;
                }
                shift -= 1;
                if shift == 0 {
                    break;
                }
            }
        }
        self.bass_shift = shift;
    }

    /// Remove all samples and reset time and reader state
    pub fn clear(&mut self) {
        self.offset = 0;
        self.reader_accum = 0;
        self.modified = false;
        self.buffer.fill(0);
    }

    /// End the current frame `t` clocks after its start
    ///
    /// Samples before `t` become available for reading and time is rebased
    /// so the next frame starts at zero.
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::FrameOverrun`] if the frame would make more
    /// samples available than the buffer holds; the buffer is left untouched.
    pub fn end_frame(&mut self, t: BlipTime) -> Result<()> {
        if self.silent {
            return Ok(());
        }
        if self.factor == 0 {
            return Err(BlipError::ClockRateNotSet);
        }
        let offset = self.offset + self.resampled_duration(t);
        let available = (offset >> BLIP_BUFFER_ACCURACY) as usize;
        if available > self.buffer_size {
            return Err(BlipError::FrameOverrun {
                available,
                capacity: self.buffer_size,
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Number of samples available for reading
    #[inline]
    pub fn samples_avail(&self) -> usize {
        (self.offset >> BLIP_BUFFER_ACCURACY) as usize
    }

    /// Number of clocks needed until `count` samples will be available
    ///
    /// `count` is limited to the buffer capacity.
    pub fn count_clocks(&self, count: usize) -> Result<BlipTime> {
        if self.factor == 0 {
            return Err(BlipError::ClockRateNotSet);
        }
        let count = count.min(self.buffer_size) as u64;
        let time = count << BLIP_BUFFER_ACCURACY;
        let clocks = (time.saturating_sub(self.offset) + self.factor - 1) / self.factor;
        Ok(clocks as BlipTime)
    }

    /// Number of samples that ending the frame at `t` would make available
    pub fn count_samples(&self, t: BlipTime) -> usize {
        let last_sample = self.resampled_time(t) >> BLIP_BUFFER_ACCURACY;
        let first_sample = self.offset >> BLIP_BUFFER_ACCURACY;
        (last_sample - first_sample) as usize
    }

    /// Convert frame-relative clock time to resampled time
    #[inline]
    pub fn resampled_time(&self, t: BlipTime) -> ResampledTime {
        t as u64 * self.factor + self.offset
    }

    /// Convert a clock duration to a resampled duration
    #[inline]
    pub fn resampled_duration(&self, t: BlipTime) -> ResampledTime {
        t as u64 * self.factor
    }

    /// Delay between a write and its appearance in the output, in samples
    #[inline]
    pub fn output_latency(&self) -> usize {
        BLIP_WIDEST_IMPULSE / 2
    }

    /// Read up to `out.len()` samples (or `out.len() / 2` in stereo mode)
    ///
    /// In stereo mode every other slot of `out` is written, starting at
    /// index 0, so two buffers can be interleaved into one slice.
    ///
    /// # Returns
    ///
    /// Number of samples read
    pub fn read_samples(&mut self, out: &mut [i16], stereo: bool) -> Result<usize> {
        let step = if stereo { 2 } else { 1 };
        let count = self.samples_avail().min(out.len().div_ceil(step));
        if count == 0 {
            return Ok(0);
        }

        let bass = self.bass_shift;
        let mut reader = BlipReader::begin(self);
        for slot in out.iter_mut().step_by(step).take(count) {
            *slot = clamp_sample(reader.read());
            reader.advance(bass);
        }
        self.reader_accum = reader.finish();
        self.remove_samples(count)?;
        Ok(count)
    }

    /// Add externally generated 16-bit PCM at the start of the current frame
    ///
    /// The samples are converted to deltas, so they mix with synth output
    /// and pass through the same bass leak when read.
    pub fn mix_samples(&mut self, samples: &[i16]) -> Result<()> {
        if self.silent {
            return Err(BlipError::SilentBuffer("mix_samples"));
        }
        let start = self.samples_avail() + BLIP_WIDEST_IMPULSE / 2;
        if start + samples.len() >= self.buffer.len() {
            return Err(BlipError::TimeOutOfRange {
                sample: self.samples_avail() + samples.len(),
                capacity: self.buffer_size,
            });
        }

        let mut prev = 0i32;
        for (slot, &pcm) in self.buffer[start..].iter_mut().zip(samples) {
            let s = (pcm as i32) << BLIP_READER_SHIFT;
            *slot = slot.wrapping_add(s.wrapping_sub(prev));
            prev = s;
        }
        let end = start + samples.len();
        self.buffer[end] = self.buffer[end].wrapping_sub(prev);
        self.modified = true;
        Ok(())
    }

    /// Remove `count` samples from the start of the buffer
    pub fn remove_samples(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.remove_silence(count)?;

        let remain = self.samples_avail() + BLIP_BUFFER_EXTRA;
        self.buffer.copy_within(count..count + remain, 0);
        self.buffer[remain..remain + count].fill(0);
        Ok(())
    }

    /// Advance the read position by `count` samples without touching storage
    ///
    /// Used to keep buffers that were not rendered time-synchronized with
    /// those that were.
    pub fn remove_silence(&mut self, count: usize) -> Result<()> {
        let available = self.samples_avail();
        if count > available {
            return Err(BlipError::RemoveBeyondAvailable {
                requested: count,
                available,
            });
        }
        self.offset -= (count as u64) << BLIP_BUFFER_ACCURACY;
        Ok(())
    }

    /// Mark the buffer as written this frame
    #[inline]
    pub fn set_modified(&mut self) {
        self.modified = true;
    }

    /// Whether the buffer was written since the flag was last cleared
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Clear the modified flag, returning its previous value
    #[inline]
    pub fn clear_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Source clock rate in Hz
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Bass leak frequency in Hz
    pub fn bass_frequency(&self) -> u32 {
        self.bass_freq
    }

    /// Shift applied by the bass leak integrator
    #[inline]
    pub fn bass_shift(&self) -> u32 {
        self.bass_shift
    }

    /// Buffer length in milliseconds
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Nominal capacity in samples
    pub fn capacity(&self) -> usize {
        self.buffer_size
    }

    /// Resampling factor (sample_rate / clock_rate in fixed point)
    pub fn factor(&self) -> u64 {
        self.factor
    }

    /// Resampled time of the start of the current frame
    pub fn offset(&self) -> ResampledTime {
        self.offset
    }

    #[inline]
    pub(crate) fn samples(&self) -> &[i32] {
        &self.buffer
    }

    #[inline]
    pub(crate) fn reader_accum(&self) -> i32 {
        self.reader_accum
    }

    /// Whether the integrator still reads as a nonzero sample
    #[inline]
    pub(crate) fn holds_level(&self) -> bool {
        self.reader_accum >> BLIP_READER_SHIFT != 0
    }

    #[inline]
    pub(crate) fn set_reader_accum(&mut self, accum: i32) {
        self.reader_accum = accum;
    }

    /// Storage window a kernel writes into for an event at `sample`
    #[inline]
    pub(crate) fn kernel_window(&mut self, sample: usize) -> &mut [i32] {
        &mut self.buffer[sample..sample + BLIP_BUFFER_EXTRA]
    }
}

impl Default for BlipBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlipBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipBuffer")
            .field("sample_rate", &self.sample_rate)
            .field("clock_rate", &self.clock_rate)
            .field("factor", &self.factor)
            .field("offset", &self.offset)
            .field("capacity", &self.buffer_size)
            .field("bass_shift", &self.bass_shift)
            .field("modified", &self.modified)
            .field("silent", &self.silent)
            .finish_non_exhaustive()
    }
}

/// Fixed-point ratio of sample rate to clock rate
fn clock_rate_factor(sample_rate: u32, clock_rate: u32) -> Result<u64> {
    let ratio = sample_rate as f64 / clock_rate as f64;
    let factor = (ratio * (1u64 << BLIP_BUFFER_ACCURACY) as f64 + 0.5).floor() as u64;
    if factor == 0 {
        return Err(BlipError::InvalidClockRate {
            clock_rate,
            sample_rate,
        });
    }
    Ok(factor)
}
