//! Single-buffer mono output

use super::{set_buffers_sample_rate, Channel, ChannelType, MultiBuffer, MultiBufferState};
use crate::blip::{BlipBuffer, BlipTime, BufferBank, BufferId};
use crate::Result;

/// One [`BlipBuffer`] behind the [`MultiBuffer`] interface
///
/// Every channel routes center, left and right to the same buffer.
#[derive(Debug, Clone)]
pub struct MonoBuffer {
    bufs: [BlipBuffer; 1],
    state: MultiBufferState,
}

impl MonoBuffer {
    /// Create an unconfigured mono buffer
    pub fn new() -> Self {
        Self {
            bufs: [BlipBuffer::new()],
            state: MultiBufferState::new(1),
        }
    }

    /// The underlying buffer
    pub fn center(&mut self) -> &mut BlipBuffer {
        &mut self.bufs[0]
    }
}

impl Default for MonoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBank for MonoBuffer {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        self.bufs.get_mut(id.0)
    }
}

impl MultiBuffer for MonoBuffer {
    fn set_sample_rate(&mut self, rate: u32, msec: u32) -> Result<()> {
        set_buffers_sample_rate(&mut self.bufs, &mut self.state, rate, msec)
    }

    fn set_clock_rate(&mut self, hz: u32) -> Result<()> {
        self.bufs[0].set_clock_rate(hz)
    }

    fn set_bass_frequency(&mut self, hz: u32) {
        self.bufs[0].set_bass_frequency(hz);
    }

    fn set_channel_count(&mut self, count: usize, types: Option<&[ChannelType]>) -> Result<()> {
        self.state.set_channel_count(count, types)
    }

    fn channel_count(&self) -> usize {
        self.state.channel_count
    }

    fn channel(&self, _index: usize, _channel_type: ChannelType) -> Channel {
        Channel::mono(BufferId(0))
    }

    fn clear(&mut self) {
        self.bufs[0].clear();
    }

    fn end_frame(&mut self, time: BlipTime) -> Result<()> {
        self.bufs[0].end_frame(time)
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize> {
        self.bufs[0].read_samples(out, false)
    }

    fn samples_avail(&self) -> usize {
        self.bufs[0].samples_avail()
    }

    fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }

    fn length(&self) -> u32 {
        self.state.length
    }

    fn samples_per_frame(&self) -> usize {
        self.state.samples_per_frame
    }

    fn channels_changed_count(&self) -> u32 {
        self.state.channels_changed_count
    }
}
