//! Band-limited step synthesizer
//!
//! A [`Synth`] turns amplitude changes at clock times into band-limited
//! steps in a [`BlipBuffer`]. The kernel (fast two-tap or accurate
//! windowed-sinc) is chosen once through [`SynthConfig`].

use super::buffer::{BlipBuffer, BlipTime, BufferBank, BufferId, ResampledTime};
use super::kernel::{AccurateKernel, FastKernel, SynthKernel};
use crate::constants::{BLIP_BUFFER_ACCURACY, BLIP_PHASE_BITS, BLIP_RES, BLIP_WIDEST_IMPULSE};
use crate::equalizer::BlipEq;
use crate::{BlipError, Result};

/// Kernel width of the low quality preset
pub const BLIP_LOW_QUALITY: usize = 8;
/// Kernel width of the medium quality preset
pub const BLIP_MED_QUALITY: usize = 8;
/// Kernel width of the good quality preset
pub const BLIP_GOOD_QUALITY: usize = 12;
/// Kernel width of the high quality preset
pub const BLIP_HIGH_QUALITY: usize = 16;

/// Kernel strategy of a synth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelMode {
    /// Linear split over two samples; cheapest, some aliasing
    Fast,
    /// Windowed-sinc convolution with an adjustable treble
    #[default]
    Accurate,
}

/// Construction parameters of a [`Synth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    /// Kernel width in samples for [`KernelMode::Accurate`] (even, 4..=16)
    pub quality: usize,
    /// Largest amplitude difference expected between two updates
    pub range: i32,
    /// Kernel strategy
    pub mode: KernelMode,
}

impl SynthConfig {
    /// Accurate synth with the given width and range
    pub fn accurate(quality: usize, range: i32) -> Self {
        Self {
            quality,
            range,
            mode: KernelMode::Accurate,
        }
    }

    /// Fast two-tap synth
    pub fn fast(range: i32) -> Self {
        Self {
            quality: BLIP_LOW_QUALITY,
            range,
            mode: KernelMode::Fast,
        }
    }

    /// Accurate synth at [`BLIP_LOW_QUALITY`]
    pub fn low(range: i32) -> Self {
        Self::accurate(BLIP_LOW_QUALITY, range)
    }

    /// Accurate synth at [`BLIP_MED_QUALITY`]
    pub fn medium(range: i32) -> Self {
        Self::accurate(BLIP_MED_QUALITY, range)
    }

    /// Accurate synth at [`BLIP_GOOD_QUALITY`]
    pub fn good(range: i32) -> Self {
        Self::accurate(BLIP_GOOD_QUALITY, range)
    }

    /// Accurate synth at [`BLIP_HIGH_QUALITY`]
    pub fn high(range: i32) -> Self {
        Self::accurate(BLIP_HIGH_QUALITY, range)
    }

    fn validate(&self) -> Result<()> {
        if self.range == 0 {
            return Err(BlipError::InvalidSynthConfig(
                "amplitude range must be non-zero".to_string(),
            ));
        }
        if self.mode == KernelMode::Accurate
            && (self.quality < 4 || self.quality % 2 != 0 || self.quality > BLIP_WIDEST_IMPULSE)
        {
            return Err(BlipError::InvalidSynthConfig(format!(
                "quality {} must be even and within 4..={}",
                self.quality, BLIP_WIDEST_IMPULSE
            )));
        }
        Ok(())
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self::good(1)
    }
}

/// Band-limited step synthesizer bound to at most one output buffer
pub struct Synth {
    kernel: Box<dyn SynthKernel>,
    config: SynthConfig,
    volume: f64,
    last_amp: i32,
    output: Option<BufferId>,
}

impl Synth {
    /// Create a synth with zero volume and no output
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::InvalidSynthConfig`] for a zero range or an
    /// unsupported kernel width.
    pub fn new(config: SynthConfig) -> Result<Self> {
        config.validate()?;
        let kernel: Box<dyn SynthKernel> = match config.mode {
            KernelMode::Fast => Box::new(FastKernel::new()),
            KernelMode::Accurate => Box::new(AccurateKernel::new(config.quality)?),
        };
        Ok(Self {
            kernel,
            config,
            volume: 0.0,
            last_amp: 0,
            output: None,
        })
    }

    /// Configuration the synth was built with
    pub fn config(&self) -> SynthConfig {
        self.config
    }

    /// Set overall volume; a change of `range` produces an output step of `volume`
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        let range = self.config.range.unsigned_abs() as f64;
        self.kernel.volume_unit(volume / range)?;
        self.volume = volume;
        Ok(())
    }

    /// Current volume
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Rebuild the kernel for a new treble equalization
    ///
    /// Has no effect on fast synths.
    pub fn set_treble_eq(&mut self, eq: &BlipEq) -> Result<()> {
        self.kernel.treble_eq(eq)
    }

    /// Bind the synth to a buffer for [`update`](Self::update) and reset the
    /// amplitude tracked between updates
    pub fn set_output(&mut self, output: Option<BufferId>) {
        self.output = output;
        self.last_amp = 0;
    }

    /// Buffer the synth is bound to
    pub fn output(&self) -> Option<BufferId> {
        self.output
    }

    /// Amplitude after the most recent [`update`](Self::update)
    pub fn last_amp(&self) -> i32 {
        self.last_amp
    }

    /// Multiplier applied to each delta before it enters a buffer
    pub fn delta_factor(&self) -> i32 {
        self.kernel.delta_factor()
    }

    /// Number of output samples touched per step
    pub fn kernel_width(&self) -> usize {
        self.kernel.width()
    }

    /// Set the amplitude of the bound output at time `time`
    ///
    /// The difference from the previous amplitude is added as a step.
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::UnboundOutput`] if no output is bound or the
    /// bank does not contain it, and the errors of [`offset`](Self::offset).
    pub fn update<B>(&mut self, time: BlipTime, amp: i32, bank: &mut B) -> Result<()>
    where
        B: BufferBank + ?Sized,
    {
        let id = self.output.ok_or(BlipError::UnboundOutput)?;
        let buf = bank.buffer_mut(id).ok_or(BlipError::UnboundOutput)?;
        let delta = amp.wrapping_sub(self.last_amp);
        self.offset(time, delta, buf)?;
        self.last_amp = amp;
        Ok(())
    }

    /// Add a step of `delta` at clock `time` of the current frame
    pub fn offset(&self, time: BlipTime, delta: i32, buf: &mut BlipBuffer) -> Result<()> {
        let resampled = buf.resampled_time(time);
        self.offset_resampled(resampled, delta, buf)
    }

    /// Add a step of `delta` at an absolute resampled time
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::TimeOutOfRange`] if the time lies beyond the
    /// buffer's capacity. Steps into silent buffers are discarded.
    pub fn offset_resampled(
        &self,
        time: ResampledTime,
        delta: i32,
        buf: &mut BlipBuffer,
    ) -> Result<()> {
        if buf.is_silent() {
            return Ok(());
        }
        let sample = (time >> BLIP_BUFFER_ACCURACY) as usize;
        if sample >= buf.capacity() {
            return Err(BlipError::TimeOutOfRange {
                sample,
                capacity: buf.capacity(),
            });
        }
        let phase = ((time >> (BLIP_BUFFER_ACCURACY - BLIP_PHASE_BITS)) as usize) & (BLIP_RES - 1);
        buf.set_modified();
        self.kernel.deposit(buf.kernel_window(sample), phase, delta);
        Ok(())
    }

    /// Add a step to the buffer with id `id` in `bank`
    pub fn offset_in<B>(&self, time: BlipTime, delta: i32, id: BufferId, bank: &mut B) -> Result<()>
    where
        B: BufferBank + ?Sized,
    {
        let buf = bank.buffer_mut(id).ok_or(BlipError::UnboundOutput)?;
        self.offset(time, delta, buf)
    }
}

impl std::fmt::Debug for Synth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synth")
            .field("config", &self.config)
            .field("volume", &self.volume)
            .field("last_amp", &self.last_amp)
            .field("output", &self.output)
            .field("kernel", &self.kernel)
            .finish()
    }
}
