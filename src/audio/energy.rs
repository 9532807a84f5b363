//! Short-time energy envelope.

use crate::audio::wav::Waveform;

/// Calculates the Root Mean Square (RMS) of normalized samples.
///
/// Returns 0.0 for empty input, ~0.707 for a full-scale sine and 1.0 for a
/// full-scale square wave.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// RMS energy over centered, overlapping frames.
///
/// Frame `i` is centered on sample `i * hop_length`, so its timestamp is
/// `i * hop_length / sample_rate`. Frames near the edges are truncated rather
/// than padded.
#[derive(Debug, Clone)]
pub struct EnergyEnvelope {
    rms: Vec<f32>,
    hop_length: usize,
    sample_rate: u32,
}

impl EnergyEnvelope {
    pub fn compute(waveform: &Waveform, frame_length: usize, hop_length: usize) -> Self {
        let samples = waveform.samples();
        let hop_length = hop_length.max(1);
        let half = frame_length.max(1) / 2;

        // Prefix sums of squares make every frame O(1).
        let mut prefix = Vec::with_capacity(samples.len() + 1);
        prefix.push(0.0f64);
        let mut acc = 0.0f64;
        for &s in samples {
            acc += (s as f64) * (s as f64);
            prefix.push(acc);
        }

        let frame_count = if samples.is_empty() {
            0
        } else {
            samples.len() / hop_length + 1
        };
        let rms = (0..frame_count)
            .map(|i| {
                let center = i * hop_length;
                let lo = center.saturating_sub(half);
                let hi = (center + half).min(samples.len());
                if hi <= lo {
                    return 0.0;
                }
                ((prefix[hi] - prefix[lo]) / (hi - lo) as f64).sqrt() as f32
            })
            .collect();

        Self {
            rms,
            hop_length,
            sample_rate: waveform.sample_rate(),
        }
    }

    pub fn len(&self) -> usize {
        self.rms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }

    /// Timestamp of frame `index` in seconds.
    pub fn frame_time(&self, index: usize) -> f64 {
        (index * self.hop_length) as f64 / self.sample_rate as f64
    }

    /// Finds the quietest frame whose timestamp lies in `[lo, hi]`.
    ///
    /// Ties (e.g. digital silence) resolve to the frame nearest `target`.
    /// Returns the frame time and its energy.
    pub fn quietest_near(&self, target: f64, lo: f64, hi: f64) -> Option<(f64, f32)> {
        if self.rms.is_empty() || hi < lo {
            return None;
        }
        let seconds_per_frame = self.hop_length as f64 / self.sample_rate as f64;
        let first = (lo.max(0.0) / seconds_per_frame).ceil() as usize;
        let last = ((hi / seconds_per_frame).floor().max(0.0) as usize).min(self.rms.len() - 1);
        if first > last {
            return None;
        }

        (first..=last)
            .map(|i| (self.frame_time(i), self.rms[i]))
            .min_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| (a.0 - target).abs().total_cmp(&(b.0 - target).abs()))
            })
    }
}
