//! Frame-energy speech detector.
//!
//! Classifies fixed 30ms frames by RMS against a threshold picked by the
//! aggressiveness level. Needs no model and is always available.

use super::{SpeechSpan, VadEngine, spans_from_flags};
use crate::audio::{Waveform, calculate_rms};
use crate::defaults;
use crate::error::Result;

/// RMS thresholds for aggressiveness 0 (most permissive) through 3.
const THRESHOLDS: [f32; 4] = [0.005, 0.01, 0.02, 0.04];

pub struct EnergyVad {
    aggressiveness: u8,
    frame_ms: u32,
}

impl EnergyVad {
    /// Aggressiveness above 3 is clamped.
    pub fn new(aggressiveness: u8) -> Self {
        Self {
            aggressiveness: aggressiveness.min(3),
            frame_ms: defaults::VAD_FRAME_MS,
        }
    }

    pub fn threshold(&self) -> f32 {
        THRESHOLDS[self.aggressiveness as usize]
    }
}

impl VadEngine for EnergyVad {
    fn name(&self) -> &'static str {
        "energy"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn detect(&mut self, waveform: &Waveform) -> Result<Vec<SpeechSpan>> {
        let frame_len = (waveform.sample_rate() as usize * self.frame_ms as usize / 1000).max(1);
        let threshold = self.threshold();
        let flags: Vec<bool> = waveform
            .samples()
            .chunks(frame_len)
            .map(|frame| calculate_rms(frame) >= threshold)
            .collect();

        let frame_secs = frame_len as f64 / waveform.sample_rate() as f64;
        Ok(spans_from_flags(&flags, frame_secs, waveform.duration()))
    }
}
