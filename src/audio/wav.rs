//! WAV decoding and audio path validation.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, SubalignError};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Decoded mono waveform, normalized to -1.0..=1.0.
///
/// Loaded once per pipeline run and shared read-only by every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Wraps already-decoded samples, resampling to 16kHz if needed.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let samples = if sample_rate != SAMPLE_RATE && sample_rate > 0 {
            resample(&samples, sample_rate, SAMPLE_RATE)
        } else {
            samples
        };
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Decodes WAV data from any reader.
    /// Supports integer and float PCM, any channel count and sample rate.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let wav_reader = hound::WavReader::new(reader).map_err(|e| SubalignError::AudioDecode {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(SubalignError::AudioDecode {
                message: "WAV file declares zero channels".to_string(),
            });
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => wav_reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                wav_reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| SubalignError::AudioDecode {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        // Average channels down to mono
        let channels = spec.channels as usize;
        let mono = if channels > 1 {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        } else {
            interleaved
        };

        Ok(Self::from_samples(mono, spec.sample_rate))
    }

    /// Validates `path` and decodes the WAV file it points to.
    pub fn load(path: &Path) -> Result<Self> {
        let path = validate_audio_path(path)?;
        let file = std::fs::File::open(&path)?;
        let waveform = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::debug!(
            path = %path.display(),
            samples = waveform.samples.len(),
            duration_secs = waveform.duration(),
            "audio loaded"
        );
        Ok(waveform)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

}

/// Checks that an audio path is absolute, free of `..` traversal, and names
/// an existing regular file.
///
/// Runs before any analysis so a bad path never produces partial output.
pub fn validate_audio_path(path: &Path) -> Result<PathBuf> {
    let display = path.display().to_string();
    if path.as_os_str().is_empty() {
        return Err(SubalignError::AudioPathInvalid {
            path: display,
            reason: "path is empty".to_string(),
        });
    }
    if !path.is_absolute() {
        return Err(SubalignError::AudioPathInvalid {
            path: display,
            reason: "path must be absolute".to_string(),
        });
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SubalignError::AudioPathInvalid {
            path: display,
            reason: "path must not contain '..' traversal".to_string(),
        });
    }
    if !path.is_file() {
        return Err(SubalignError::AudioNotFound { path: display });
    }
    Ok(path.to_path_buf())
}

/// Simple linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
