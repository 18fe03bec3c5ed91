//! Center, left and right buffers mixed to stereo
//!
//! Only buffers written recently, or still holding a level, are mixed. Mono
//! content (center only) takes the cheapest path; side-only content skips
//! the center.

use super::{
    set_buffers_sample_rate, Channel, ChannelType, MultiBuffer, MultiBufferState, UsedBuffers,
};
use crate::blip::{BlipBuffer, BlipReader, BlipTime, BufferBank, BufferId};
use crate::constants::clamp_sample;
use crate::Result;

const CENTER: usize = 0;
const LEFT: usize = 1;
const RIGHT: usize = 2;
const BUF_COUNT: usize = 3;

/// Three buffers mixed to interleaved stereo
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    bufs: [BlipBuffer; BUF_COUNT],
    chan: Channel,
    used: UsedBuffers,
    state: MultiBufferState,
}

impl StereoBuffer {
    /// Create an unconfigured stereo buffer
    pub fn new() -> Self {
        Self {
            bufs: [BlipBuffer::new(), BlipBuffer::new(), BlipBuffer::new()],
            chan: Channel {
                center: BufferId(CENTER),
                left: BufferId(LEFT),
                right: BufferId(RIGHT),
            },
            used: UsedBuffers::default(),
            state: MultiBufferState::new(2),
        }
    }

    /// Center buffer
    pub fn center(&mut self) -> &mut BlipBuffer {
        &mut self.bufs[CENTER]
    }

    /// Left buffer
    pub fn left(&mut self) -> &mut BlipBuffer {
        &mut self.bufs[LEFT]
    }

    /// Right buffer
    pub fn right(&mut self) -> &mut BlipBuffer {
        &mut self.bufs[RIGHT]
    }

    fn mix_mono(&mut self, out: &mut [i16], count: usize) {
        let bass = self.bufs[CENTER].bass_shift();
        let mut center = BlipReader::begin(&self.bufs[CENTER]);
        for frame in out.chunks_exact_mut(2).take(count) {
            let s = clamp_sample(center.read());
            center.advance(bass);
            frame[0] = s;
            frame[1] = s;
        }
        let accum = center.finish();
        self.bufs[CENTER].set_reader_accum(accum);
    }

    fn mix_stereo(&mut self, out: &mut [i16], count: usize) {
        let bass = self.bufs[CENTER].bass_shift();
        let [c, l, r] = &self.bufs;
        let mut center = BlipReader::begin(c);
        let mut left = BlipReader::begin(l);
        let mut right = BlipReader::begin(r);
        for frame in out.chunks_exact_mut(2).take(count) {
            let c = center.read();
            frame[0] = clamp_sample(left.read() + c);
            frame[1] = clamp_sample(right.read() + c);
            center.advance(bass);
            left.advance(bass);
            right.advance(bass);
        }
        let accums = [center.finish(), left.finish(), right.finish()];
        for (buf, accum) in self.bufs.iter_mut().zip(accums) {
            buf.set_reader_accum(accum);
        }
    }

    fn mix_stereo_no_center(&mut self, out: &mut [i16], count: usize) {
        let bass = self.bufs[CENTER].bass_shift();
        let mut left = BlipReader::begin(&self.bufs[LEFT]);
        let mut right = BlipReader::begin(&self.bufs[RIGHT]);
        for frame in out.chunks_exact_mut(2).take(count) {
            frame[0] = clamp_sample(left.read());
            frame[1] = clamp_sample(right.read());
            left.advance(bass);
            right.advance(bass);
        }
        let (l, r) = (left.finish(), right.finish());
        self.bufs[LEFT].set_reader_accum(l);
        self.bufs[RIGHT].set_reader_accum(r);
    }
}

impl Default for StereoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBank for StereoBuffer {
    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut BlipBuffer> {
        self.bufs.get_mut(id.0)
    }
}

impl MultiBuffer for StereoBuffer {
    fn set_sample_rate(&mut self, rate: u32, msec: u32) -> Result<()> {
        set_buffers_sample_rate(&mut self.bufs, &mut self.state, rate, msec)
    }

    fn set_clock_rate(&mut self, hz: u32) -> Result<()> {
        for buf in self.bufs.iter_mut() {
            buf.set_clock_rate(hz)?;
        }
        Ok(())
    }

    fn set_bass_frequency(&mut self, hz: u32) {
        for buf in self.bufs.iter_mut() {
            buf.set_bass_frequency(hz);
        }
    }

    fn set_channel_count(&mut self, count: usize, types: Option<&[ChannelType]>) -> Result<()> {
        self.state.set_channel_count(count, types)
    }

    fn channel_count(&self) -> usize {
        self.state.channel_count
    }

    fn channel(&self, _index: usize, _channel_type: ChannelType) -> Channel {
        self.chan
    }

    fn clear(&mut self) {
        self.used.clear();
        for buf in self.bufs.iter_mut() {
            buf.clear();
        }
    }

    fn end_frame(&mut self, time: BlipTime) -> Result<()> {
        let mut modified = 0;
        for (i, buf) in self.bufs.iter_mut().enumerate() {
            if buf.clear_modified() {
                modified |= 1 << i;
            }
            buf.end_frame(time)?;
        }
        self.used.frame_ended(modified);
        Ok(())
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize> {
        self.state.check_aligned(out.len())?;

        let count = self.bufs[CENTER].samples_avail().min(out.len() / 2);
        if count > 0 {
            let bufs_used = self.used.used(&self.bufs);
            if bufs_used <= 1 {
                self.mix_mono(out, count);
                self.bufs[CENTER].remove_samples(count)?;
                self.bufs[LEFT].remove_silence(count)?;
                self.bufs[RIGHT].remove_silence(count)?;
            } else if bufs_used & 1 != 0 {
                self.mix_stereo(out, count);
                for buf in self.bufs.iter_mut() {
                    buf.remove_samples(count)?;
                }
            } else {
                self.mix_stereo_no_center(out, count);
                self.bufs[CENTER].remove_silence(count)?;
                self.bufs[LEFT].remove_samples(count)?;
                self.bufs[RIGHT].remove_samples(count)?;
            }

            // keep mixing in stereo until the tail of a stereo frame is out
            if self.bufs[CENTER].samples_avail() == 0 {
                self.used.drained();
            }
        }
        Ok(count * 2)
    }

    fn samples_avail(&self) -> usize {
        self.bufs[CENTER].samples_avail() * 2
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
