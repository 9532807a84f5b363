//! Silero neural VAD via ONNX Runtime.
//!
//! The model consumes 512-sample windows at 16kHz and carries a recurrent
//! state of shape [2, 1, 128] between windows.

use super::{SpeechSpan, VadEngine, spans_from_flags};
use crate::audio::Waveform;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, SubalignError};
use std::path::PathBuf;

const WINDOW: usize = 512;
const STATE_LEN: usize = 2 * 128;

fn runtime_error(stage: &str, e: impl std::fmt::Display) -> SubalignError {
    SubalignError::Vad {
        message: format!("{stage}: {e}"),
    }
}

pub struct SileroVad {
    model_path: Option<PathBuf>,
    threshold: f32,
    session: Option<ort::session::Session>,
}

impl SileroVad {
    pub fn new(model_path: Option<PathBuf>, threshold: f32) -> Self {
        Self {
            model_path,
            threshold: threshold.clamp(0.0, 1.0),
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut ort::session::Session> {
        if self.session.is_none() {
            let path = self
                .model_path
                .as_ref()
                .ok_or_else(|| runtime_error("silero", "no model path configured"))?;
            let session = ort::session::Session::builder()
                .map_err(|e| runtime_error("onnx session builder", e))?
                .commit_from_file(path)
                .map_err(|e| runtime_error("onnx model load", e))?;
            tracing::info!(model_path = %path.display(), "silero VAD model loaded");
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| runtime_error("silero", "session unavailable"))
    }

    fn window_probability(
        session: &mut ort::session::Session,
        window: &[f32],
        state: &mut Vec<f32>,
    ) -> Result<f32> {
        let input = ort::value::Tensor::from_array(([1usize, WINDOW], window.to_vec()))
            .map_err(|e| runtime_error("onnx input tensor", e))?;
        let state_in = ort::value::Tensor::from_array(([2usize, 1, 128], state.clone()))
            .map_err(|e| runtime_error("onnx state tensor", e))?;
        let sr = ort::value::Tensor::from_array(([1usize], vec![SAMPLE_RATE as i64]))
            .map_err(|e| runtime_error("onnx sr tensor", e))?;

        let outputs = session
            .run(ort::inputs!["input" => input, "state" => state_in, "sr" => sr])
            .map_err(|e| runtime_error("onnx forward pass", e))?;

        let (_, probability) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| runtime_error("onnx extract probability", e))?;
        let (_, next_state) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| runtime_error("onnx extract state", e))?;
        if next_state.len() == STATE_LEN {
            state.copy_from_slice(next_state);
        }
        Ok(probability.first().copied().unwrap_or(0.0))
    }
}

impl VadEngine for SileroVad {
    fn name(&self) -> &'static str {
        "silero"
    }

    fn is_available(&self) -> bool {
        self.model_path.as_ref().is_some_and(|p| p.is_file())
    }

    fn detect(&mut self, waveform: &Waveform) -> Result<Vec<SpeechSpan>> {
        let threshold = self.threshold;
        let session = self.session()?;
        let mut state = vec![0.0f32; STATE_LEN];
        let mut window = [0.0f32; WINDOW];
        let mut flags = Vec::with_capacity(waveform.samples().len() / WINDOW + 1);

        for chunk in waveform.samples().chunks(WINDOW) {
            window[..chunk.len()].copy_from_slice(chunk);
            window[chunk.len()..].fill(0.0);
            let p = Self::window_probability(session, &window, &mut state)?;
            flags.push(p >= threshold);
        }

        let frame_secs = WINDOW as f64 / SAMPLE_RATE as f64;
        Ok(spans_from_flags(&flags, frame_secs, waveform.duration()))
    }
}
