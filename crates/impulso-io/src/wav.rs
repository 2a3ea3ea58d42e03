//! WAV file reading and writing.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::path::Path;

/// A decoded audio file: left channel, optional right channel, sample rate.
///
/// Mono files populate only `left`. Files with more than two channels are
/// rejected at decode time.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Left (or only) channel.
    pub left: Vec<f32>,
    /// Right channel for stereo files.
    pub right: Option<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of sample frames per channel.
    pub fn frames(&self) -> usize {
        self.left.len()
    }
}

/// Read a WAV file into float channel buffers.
///
/// Integer formats are scaled to [-1, 1]. A mono file fills only the left
/// channel; a stereo file is deinterleaved into both; anything wider is an
/// error, as is a file with no sample data.
pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels;

    if channels == 0 || channels > 2 {
        return Err(Error::UnsupportedChannelCount(channels));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(Error::EmptyFile(path.display().to_string()));
    }

    let decoded = if channels == 1 {
        DecodedAudio {
            left: samples,
            right: None,
            sample_rate: spec.sample_rate,
        }
    } else {
        let frames = samples.len() / 2;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for chunk in samples.chunks_exact(2) {
            left.push(chunk[0]);
            right.push(chunk[1]);
        }
        DecodedAudio {
            left,
            right: Some(right),
            sample_rate: spec.sample_rate,
        }
    };

    Ok(decoded)
}

/// Write channel buffers to a 32-bit float WAV file.
///
/// Passing `right` produces a stereo file; the shorter channel is padded
/// with silence to the longer one's length.
pub fn write_audio<P: AsRef<Path>>(
    path: P,
    left: &[f32],
    right: Option<&[f32]>,
    sample_rate: u32,
) -> Result<()> {
    let channels = if right.is_some() { 2 } else { 1 };
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;

    match right {
        None => {
            for &sample in left {
                writer.write_sample(sample)?;
            }
        }
        Some(right) => {
            let frames = left.len().max(right.len());
            for i in 0..frames {
                writer.write_sample(left.get(i).copied().unwrap_or(0.0))?;
                writer.write_sample(right.get(i).copied().unwrap_or(0.0))?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mono_roundtrip() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0).sin()).collect();

        let file = NamedTempFile::new().unwrap();
        write_audio(file.path(), &samples, None, 48000).unwrap();

        let decoded = read_audio(file.path()).unwrap();
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.left.len(), samples.len());
        assert!(decoded.right.is_none());

        for (a, b) in samples.iter().zip(decoded.left.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stereo_roundtrip() {
        let left: Vec<f32> = (0..500).map(|i| (i as f32 / 500.0).sin()).collect();
        let right: Vec<f32> = (0..500).map(|i| (i as f32 / 500.0).cos()).collect();

        let file = NamedTempFile::new().unwrap();
        write_audio(file.path(), &left, Some(&right), 44100).unwrap();

        let decoded = read_audio(file.path()).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.frames(), 500);

        let dec_right = decoded.right.expect("stereo file lost its right channel");
        for (a, b) in left.iter().zip(decoded.left.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        for (a, b) in right.iter().zip(dec_right.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_generated_sweep_roundtrip() {
        // A one-second bare sweep survives the container bit-exact in both
        // length and 32-bit float sample values.
        let sweep = impulso_dsp::SweepSpec {
            duration_s: 1.0,
            preroll_s: 0.0,
            marker_s: 0.0,
            gap_s: 0.0,
            sample_rate: 48000,
            amplitude_db: -1.0,
            start_freq: 100.0,
            end_freq: 1000.0,
        }
        .generate()
        .unwrap();

        let file = NamedTempFile::new().unwrap();
        write_audio(file.path(), &sweep.samples, None, sweep.sample_rate).unwrap();

        let decoded = read_audio(file.path()).unwrap();
        assert_eq!(decoded.left.len(), 48000);
        assert_eq!(decoded.sample_rate, 48000);
        for (a, b) in sweep.samples.iter().zip(decoded.left.iter()) {
            assert_eq!(a, b, "32-bit float samples must round-trip exactly");
        }
    }

    #[test]
    fn test_unequal_stereo_channels_padded() {
        let left = vec![0.5f32; 100];
        let right = vec![0.25f32; 60];

        let file = NamedTempFile::new().unwrap();
        write_audio(file.path(), &left, Some(&right), 48000).unwrap();

        let decoded = read_audio(file.path()).unwrap();
        assert_eq!(decoded.frames(), 100);
        let dec_right = decoded.right.unwrap();
        assert_eq!(dec_right[59], 0.25);
        assert_eq!(dec_right[60], 0.0);
    }

    #[test]
    fn test_int16_scaling() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = WavWriter::create(file.path(), spec).unwrap();
            writer.write_sample(16384i16).unwrap(); // half scale
            writer.write_sample(-16384i16).unwrap();
            writer.finalize().unwrap();
        }

        let decoded = read_audio(file.path()).unwrap();
        assert!((decoded.left[0] - 0.5).abs() < 1e-4);
        assert!((decoded.left[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_too_many_channels_rejected() {
        let spec = hound::WavSpec {
            channels: 4,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = WavWriter::create(file.path(), spec).unwrap();
            for _ in 0..16 {
                writer.write_sample(0.1f32).unwrap();
            }
            writer.finalize().unwrap();
        }

        match read_audio(file.path()) {
            Err(Error::UnsupportedChannelCount(4)) => {}
            other => panic!("expected channel-count rejection, got {:?}", other.map(|d| d.frames())),
        }
    }

    #[test]
    fn test_empty_file_rejected() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let file = NamedTempFile::new().unwrap();
        {
            let writer = WavWriter::create(file.path(), spec).unwrap();
            writer.finalize().unwrap();
        }

        assert!(matches!(read_audio(file.path()), Err(Error::EmptyFile(_))));
    }
}
