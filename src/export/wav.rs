//! WAV file export

use crate::{BlipError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

fn wav_spec(sample_rate: u32, channels: u16) -> Result<hound::WavSpec> {
    if channels == 0 {
        return Err(BlipError::ConfigError(
            "WAV export needs at least one channel".to_string(),
        ));
    }
    Ok(hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    })
}

/// Write interleaved 16-bit samples to a WAV file
///
/// # Arguments
///
/// * `path` - Destination file, created or truncated
/// * `samples` - Interleaved PCM, `channels` samples per frame
/// * `sample_rate` - Output rate in Hz
/// * `channels` - 1 for mono, 2 for stereo
///
/// # Examples
///
/// ```no_run
/// use blip_mix::write_wav;
///
/// # fn main() -> blip_mix::Result<()> {
/// let silence = vec![0i16; 44_100 * 2];
/// write_wav("silence.wav", &silence, 44_100, 2)?;
/// # Ok(())
/// # }
/// ```
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let mut sink = WavSink::create(path, sample_rate, channels)?;
    sink.write_samples(samples)?;
    sink.finalize()
}

/// Streaming WAV writer fed one block at a time
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    channels: u16,
    written: u64,
}

impl WavSink {
    /// Create the file and write its header
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = wav_spec(sample_rate, channels)?;
        let writer = hound::WavWriter::create(path.as_ref(), spec).map_err(|e| {
            BlipError::AudioFileError(format!(
                "failed to create {}: {e}",
                path.as_ref().display()
            ))
        })?;
        log::debug!(
            "writing {} Hz, {} channel WAV to {}",
            sample_rate,
            channels,
            path.as_ref().display()
        );
        Ok(Self {
            writer,
            channels,
            written: 0,
        })
    }

    /// Append interleaved samples
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        for &sample in samples {
            self.writer
                .write_sample(sample)
                .map_err(|e| BlipError::AudioFileError(format!("failed to write sample: {e}")))?;
        }
        self.written += samples.len() as u64;
        Ok(())
    }

    /// Frames written so far
    pub fn frames_written(&self) -> u64 {
        self.written / u64::from(self.channels)
    }

    /// Patch the header lengths and close the file
    pub fn finalize(self) -> Result<()> {
        let frames = self.frames_written();
        self.writer
            .finalize()
            .map_err(|e| BlipError::AudioFileError(format!("failed to finalize WAV file: {e}")))?;
        log::debug!("finalized WAV with {frames} frames");
        Ok(())
    }
}

impl std::fmt::Debug for WavSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSink")
            .field("channels", &self.channels)
            .field("written", &self.written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..200).map(|i| (i * 100 - 10_000) as i16).collect();
        write_wav(&path, &samples, 22_050, 2).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.bits_per_sample, 16);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_sink_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wav");
        let mut sink = WavSink::create(&path, 44_100, 2).unwrap();
        sink.write_samples(&[1, 2, 3, 4]).unwrap();
        sink.write_samples(&[5, 6]).unwrap();
        assert_eq!(sink.frames_written(), 3);
        sink.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 3);
    }

    #[test]
    fn test_zero_channels_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        assert!(matches!(
            WavSink::create(&path, 44_100, 0),
            Err(BlipError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_audio_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        assert!(matches!(
            write_wav(&path, &[0, 0], 44_100, 1),
            Err(BlipError::AudioFileError(_))
        ));
    }
}
