//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use subalign::segment::EnhancedSegment;

pub const SAMPLE_RATE: u32 = 16_000;

/// Writes a 16-bit mono WAV with a 220 Hz tone inside `spans` and silence
/// elsewhere. Returns the absolute path.
pub fn write_tone_wav(dir: &Path, name: &str, total_secs: f64, spans: &[(f64, f64)]) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    let n = (total_secs * SAMPLE_RATE as f64) as usize;
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE as f64;
        let voiced = spans.iter().any(|&(start, end)| t >= start && t < end);
        let value = if voiced {
            0.3 * (2.0 * std::f64::consts::PI * 220.0 * t).sin()
        } else {
            0.0
        };
        writer
            .write_sample((value * i16::MAX as f64) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

pub fn seg(start: f64, end: f64, text: &str) -> EnhancedSegment {
    EnhancedSegment::new(start, end, text)
}
