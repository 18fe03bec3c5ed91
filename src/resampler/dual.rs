//! Dual-path mixing for FM chips
//!
//! FM synthesis runs at the chip's native output rate, which rarely matches
//! the host rate. A [`DualResampler`] renders the FM path at that rate,
//! resamples it through a [`FirResampler`] and mixes it with a
//! [`BlipBuffer`] holding the band-limited path (PSG, DAC) of the same
//! frame.

use super::fir::FirResampler;
use crate::blip::{BlipBuffer, BlipReader, BlipTime};
use crate::constants::clamp_sample;
use crate::{BlipError, Result};

/// Taps per phase of the FM resampler
pub const DUAL_RESAMPLER_WIDTH: usize = 12;

/// Renders one frame of the resampled path
///
/// Implemented by FM-chip emulators driven through a [`DualResampler`].
pub trait FrameSource {
    /// Render one frame
    ///
    /// # Arguments
    ///
    /// * `blip_time` - Frame length in source clocks for the band-limited path
    /// * `pcm_count` - Number of interleaved stereo samples requested
    /// * `pcm_out` - Destination for the resampled path at the native rate
    /// * `blip` - Buffer for the band-limited path
    ///
    /// # Returns
    ///
    /// Number of samples written to `pcm_out`
    fn play_frame(
        &mut self,
        blip_time: BlipTime,
        pcm_count: usize,
        pcm_out: &mut [i16],
        blip: &mut BlipBuffer,
    ) -> Result<usize>;
}

/// Mixes a FIR-resampled path with a band-limited path, frame by frame
#[derive(Debug, Clone, Default)]
pub struct DualResampler {
    resampler: FirResampler<DUAL_RESAMPLER_WIDTH>,
    sample_buf: Vec<i16>,
    sample_buf_size: usize,
    oversamples_per_frame: usize,
    buf_pos: usize,
    resampler_size: usize,
}

impl DualResampler {
    /// Create an unconfigured resampler
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the FM path
    ///
    /// # Arguments
    ///
    /// * `oversample` - Native FM rate divided by the output rate
    /// * `rolloff` - Treble rolloff of the resampling filter
    /// * `gain` - FM path gain (applied half in the filter, half when mixing)
    ///
    /// # Returns
    ///
    /// The realized ratio
    pub fn setup(&mut self, oversample: f64, rolloff: f64, gain: f64) -> Result<f64> {
        self.resampler.set_time_ratio(oversample, rolloff, gain * 0.5)
    }

    /// Allocate for frames of up to `pairs` stereo output pairs and use that size
    pub fn reset(&mut self, pairs: usize) -> Result<()> {
        // expand allocations a bit
        let capacity = (pairs + pairs / 4) * 2;
        let mut sample_buf: Vec<i16> = Vec::new();
        sample_buf
            .try_reserve_exact(capacity)
            .map_err(|e| BlipError::OutOfMemory(e.to_string()))?;
        sample_buf.resize(capacity, 0);
        self.sample_buf = sample_buf;
        self.sample_buf_size = 0;

        self.resize(pairs)?;
        self.resampler_size = self.oversamples_per_frame + self.oversamples_per_frame / 4;
        self.resampler.set_buffer_size(self.resampler_size)
    }

    /// Change the frame size to `pairs` stereo output pairs
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::ConfigError`] if the frame exceeds the size
    /// allocated by [`reset`](Self::reset).
    pub fn resize(&mut self, pairs: usize) -> Result<()> {
        let new_size = pairs * 2;
        if self.sample_buf_size != new_size {
            if new_size > self.sample_buf.len() {
                return Err(BlipError::ConfigError(format!(
                    "frame of {pairs} pairs exceeds allocated {}",
                    self.sample_buf.len() / 2
                )));
            }
            self.sample_buf_size = new_size;
            self.oversamples_per_frame = (pairs as f64 * self.resampler.ratio()) as usize * 2 + 2;
            self.clear();
        }
        Ok(())
    }

    /// Discard buffered output and resampler input
    pub fn clear(&mut self) {
        self.buf_pos = self.sample_buf_size;
        self.resampler.clear();
    }

    /// Stereo output pairs per frame
    pub fn frame_pairs(&self) -> usize {
        self.sample_buf_size / 2
    }

    /// Native-rate samples requested from the source per frame
    pub fn oversamples_per_frame(&self) -> usize {
        self.oversamples_per_frame
    }

    /// Fill `out` with mixed stereo output, rendering frames as needed
    ///
    /// Output left over from a partial frame is returned first on the next
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`BlipError::FrameOverrun`] if `blip` cannot hold a whole
    /// frame, before anything is rendered.
    pub fn dual_play(
        &mut self,
        out: &mut [i16],
        blip: &mut BlipBuffer,
        source: &mut dyn FrameSource,
    ) -> Result<()> {
        if self.sample_buf_size == 0 {
            return Err(BlipError::ConfigError(
                "dual resampler used before reset".to_string(),
            ));
        }
        let mut out = out;

        // empty the leftover frame
        let remain = (self.sample_buf_size - self.buf_pos).min(out.len());
        if remain > 0 {
            let (head, tail) = std::mem::take(&mut out).split_at_mut(remain);
            head.copy_from_slice(&self.sample_buf[self.buf_pos..self.buf_pos + remain]);
            self.buf_pos += remain;
            out = tail;
        }

        // whole frames
        while out.len() >= self.sample_buf_size {
            let (head, tail) = std::mem::take(&mut out).split_at_mut(self.sample_buf_size);
            self.play_frame(blip, source)?;
            head.copy_from_slice(&self.sample_buf[..self.sample_buf_size]);
            out = tail;
        }

        // partial frame, keeping the rest for later
        if !out.is_empty() {
            self.play_frame(blip, source)?;
            let count = out.len();
            out.copy_from_slice(&self.sample_buf[..count]);
            self.buf_pos = count;
        }
        Ok(())
    }

    /// Render one frame of both paths and mix it into the sample buffer
    fn play_frame(&mut self, blip: &mut BlipBuffer, source: &mut dyn FrameSource) -> Result<()> {
        let pair_count = self.sample_buf_size / 2;
        let available = blip.samples_avail() + pair_count;
        if available > blip.capacity() {
            return Err(BlipError::FrameOverrun {
                available,
                capacity: blip.capacity(),
            });
        }
        let blip_time = blip.count_clocks(pair_count)?;
        let sample_count = self
            .oversamples_per_frame
            .saturating_sub(self.resampler.written())
            .min(self.resampler.max_write());

        let new_count = {
            let pcm = &mut self.resampler.write_buffer()[..sample_count];
            source.play_frame(blip_time, sample_count, pcm, blip)?
        };
        blip.end_frame(blip_time)?;
        self.resampler.write(new_count)?;

        let size = self.sample_buf_size;
        let count = self.resampler.read(&mut self.sample_buf[..size]);
        if count < size {
            log::warn!("resampler produced {count} of {size} samples; padding with silence");
            self.sample_buf[count..size].fill(0);
        }

        mix_samples(&mut self.sample_buf[..size], blip);
        blip.remove_samples(pair_count)
    }
}

/// Mix `blip` into the FM pairs in `buf`: `2 * fm + blip`, clamped
fn mix_samples(buf: &mut [i16], blip: &mut BlipBuffer) {
    let bass = blip.bass_shift();
    let mut sn = BlipReader::begin(blip);
    for pair in buf.chunks_exact_mut(2) {
        let s = sn.read();
        pair[0] = clamp_sample(pair[0] as i32 * 2 + s);
        pair[1] = clamp_sample(pair[1] as i32 * 2 + s);
        sn.advance(bass);
    }
    let accum = sn.finish();
    blip.set_reader_accum(accum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Synth, SynthConfig};

    /// Constant FM level; optionally one PSG step per frame
    struct ConstSource {
        level: i16,
        psg: Option<Synth>,
        frames: usize,
    }

    impl FrameSource for ConstSource {
        fn play_frame(
            &mut self,
            _blip_time: BlipTime,
            pcm_count: usize,
            pcm_out: &mut [i16],
            blip: &mut BlipBuffer,
        ) -> Result<usize> {
            pcm_out[..pcm_count].fill(self.level);
            if let (Some(psg), 0) = (&self.psg, self.frames) {
                psg.offset(0, 10, blip)?;
            }
            self.frames += 1;
            Ok(pcm_count)
        }
    }

    fn blip() -> BlipBuffer {
        let mut blip = BlipBuffer::new();
        blip.set_sample_rate(44_100, 100).unwrap();
        blip.set_clock_rate(3_579_545).unwrap();
        blip.set_bass_frequency(0);
        blip
    }

    fn dual() -> DualResampler {
        let mut dual = DualResampler::new();
        dual.setup(1.5, 0.999, 1.0).unwrap();
        dual.reset(735).unwrap();
        dual
    }

    #[test]
    fn test_frame_sizes() {
        let dual = dual();
        assert_eq!(dual.frame_pairs(), 735);
        assert_eq!(dual.oversamples_per_frame(), (735.0 * 1.5) as usize * 2 + 2);
    }

    #[test]
    fn test_resize_beyond_reset_rejected() {
        let mut dual = dual();
        assert!(dual.resize(2000).is_err());
        dual.resize(600).unwrap();
        assert_eq!(dual.frame_pairs(), 600);
    }

    #[test]
    fn test_fm_path_level() {
        let mut dual = dual();
        let mut blip = blip();
        let mut source = ConstSource {
            level: 1000,
            psg: None,
            frames: 0,
        };

        let mut out = vec![0i16; 735 * 2 * 3];
        dual.dual_play(&mut out, &mut blip, &mut source).unwrap();
        for &s in &out[735 * 2..] {
            // 2 * fm at half gain through a filter with ~0.96 DC gain
            assert!((900..=1010).contains(&s), "{s}");
        }
    }

    #[test]
    fn test_blip_path_mixed() {
        let mut dual = dual();
        let mut blip = blip();
        let mut psg = Synth::new(SynthConfig::good(10)).unwrap();
        psg.set_volume(0.1).unwrap();
        let mut source = ConstSource {
            level: 0,
            psg: Some(psg),
            frames: 0,
        };

        let mut out = vec![0i16; 735 * 2];
        dual.dual_play(&mut out, &mut blip, &mut source).unwrap();
        let level = (0.1 * 65_536.0) as i32;
        assert!((out[400] as i32 - level).abs() < 16, "{}", out[400]);
        assert_eq!(out[400], out[401]);
    }

    #[test]
    fn test_partial_frames_continue_seamlessly() {
        let mut whole = dual();
        let mut split = dual();
        let mut blip_a = blip();
        let mut blip_b = blip();
        let mut src_a = ConstSource {
            level: 500,
            psg: None,
            frames: 0,
        };
        let mut src_b = ConstSource {
            level: 500,
            psg: None,
            frames: 0,
        };

        let mut a = vec![0i16; 2000];
        whole.dual_play(&mut a, &mut blip_a, &mut src_a).unwrap();

        let mut b = vec![0i16; 2000];
        let (first, second) = b.split_at_mut(600);
        split.dual_play(first, &mut blip_b, &mut src_b).unwrap();
        split.dual_play(second, &mut blip_b, &mut src_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_frame_larger_than_blip_buffer() {
        let mut dual = dual();
        let mut blip = BlipBuffer::new();
        blip.set_sample_rate(44_100, 10).unwrap();
        blip.set_clock_rate(3_579_545).unwrap();
        let mut source = ConstSource {
            level: 100,
            psg: None,
            frames: 0,
        };

        let mut out = vec![0i16; 735 * 2];
        let err = dual.dual_play(&mut out, &mut blip, &mut source).unwrap_err();
        assert!(matches!(
            err,
            BlipError::FrameOverrun {
                available: 735,
                ..
            }
        ));
        assert_eq!(source.frames, 0);
        assert_eq!(blip.samples_avail(), 0);
    }

    #[test]
    fn test_play_before_reset() {
        let mut dual = DualResampler::new();
        let mut blip = blip();
        let mut source = ConstSource {
            level: 0,
            psg: None,
            frames: 0,
        };
        let mut out = vec![0i16; 4];
        assert!(dual.dual_play(&mut out, &mut blip, &mut source).is_err());
    }
}
