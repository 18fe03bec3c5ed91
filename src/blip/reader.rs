//! Sample reader over a [`BlipBuffer`]
//!
//! Mixers read several buffers in lockstep; a reader carries the bass-leak
//! integrator for one of them so the loops stay tight.

use super::buffer::BlipBuffer;
use crate::constants::BLIP_READER_SHIFT;

/// Integrating cursor over the samples of one [`BlipBuffer`]
///
/// Create with [`BlipReader::begin`], alternate [`read`](Self::read) and
/// [`advance`](Self::advance), then store the integrator back with
/// [`BlipReader::finish`] once the borrow of the buffer has ended.
#[derive(Debug)]
pub struct BlipReader<'a> {
    samples: &'a [i32],
    pos: usize,
    accum: i32,
}

impl<'a> BlipReader<'a> {
    /// Start reading at the beginning of `buf`
    #[inline]
    pub fn begin(buf: &'a BlipBuffer) -> Self {
        Self {
            samples: buf.samples(),
            pos: 0,
            accum: buf.reader_accum(),
        }
    }

    /// Current sample at 16-bit output scale (not yet clamped)
    #[inline]
    pub fn read(&self) -> i32 {
        self.accum >> BLIP_READER_SHIFT
    }

    /// Integrate the next delta, leaking `accum >> bass_shift`
    #[inline]
    pub fn advance(&mut self, bass_shift: u32) {
        let raw = self.samples[self.pos];
        self.accum = self
            .accum
            .wrapping_add(raw.wrapping_sub(self.accum >> bass_shift));
        self.pos += 1;
    }

    /// Number of samples advanced over so far
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consume the reader, returning the integrator state to store back
    #[inline]
    pub fn finish(self) -> i32 {
        self.accum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_starts_from_stored_accum() {
        let mut buf = BlipBuffer::new();
        buf.set_sample_rate(44_100, 50).unwrap();
        buf.set_reader_accum(5 << BLIP_READER_SHIFT);

        let reader = BlipReader::begin(&buf);
        assert_eq!(reader.read(), 5);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_reader_leaks_towards_zero() {
        let mut buf = BlipBuffer::new();
        buf.set_sample_rate(44_100, 50).unwrap();
        buf.set_reader_accum(1000 << BLIP_READER_SHIFT);

        let mut reader = BlipReader::begin(&buf);
        let first = reader.read();
        for _ in 0..100 {
            reader.advance(buf.bass_shift());
        }
        assert!(reader.read() < first);
        assert!(reader.read() > 0);
        assert_eq!(reader.position(), 100);
    }
}
