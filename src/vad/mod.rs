//! Voice activity detection over a whole waveform.
//!
//! Engines produce raw speech spans. [`VoiceActivityManager`] picks an
//! engine, cleans up its spans (drop short, merge close) and uses the
//! resulting silences to drop segments that were hallucinated over silence.

pub mod energy;
#[cfg(feature = "silero")]
pub mod silero;

use crate::audio::Waveform;
use crate::config::VadConfig;
use crate::error::Result;
use crate::segment::{EnhancedSegment, TAG_VAD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use energy::EnergyVad;
#[cfg(feature = "silero")]
pub use silero::SileroVad;

/// Engine tag reported when no engine could run.
pub const ENGINE_NONE: &str = "none";

const EPS: f64 = 1e-6;

/// A detected stretch of speech, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechSpan {
    pub start: f64,
    pub end: f64,
}

impl SpeechSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A voice activity engine.
///
/// Implementations are free to use any frame size; they report speech as
/// time spans over the full waveform.
pub trait VadEngine: Send {
    /// Name reported as `engine_used`.
    fn name(&self) -> &'static str;

    /// Whether the engine can run in this process (model present, feature built).
    fn is_available(&self) -> bool;

    /// Detects raw speech spans, ordered and non-overlapping.
    fn detect(&mut self, waveform: &Waveform) -> Result<Vec<SpeechSpan>>;
}

/// Engine selection from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// Model engine when available, otherwise the energy engine.
    Auto,
    Silero,
    Energy,
}

impl EngineChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineChoice::Auto => "auto",
            EngineChoice::Silero => "silero",
            EngineChoice::Energy => "energy",
        }
    }
}

impl fmt::Display for EngineChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(EngineChoice::Auto),
            "silero" => Ok(EngineChoice::Silero),
            "energy" => Ok(EngineChoice::Energy),
            other => Err(format!(
                "unknown engine '{other}'; valid options: auto, silero, energy"
            )),
        }
    }
}

#[cfg(feature = "silero")]
fn model_engine(config: &VadConfig) -> Option<Box<dyn VadEngine>> {
    let engine = SileroVad::new(config.model_path.clone(), config.threshold);
    engine
        .is_available()
        .then(|| Box::new(engine) as Box<dyn VadEngine>)
}

#[cfg(not(feature = "silero"))]
fn model_engine(_config: &VadConfig) -> Option<Box<dyn VadEngine>> {
    None
}

/// Builds the engine named by `config.engine`, falling back to the energy
/// engine when the model engine cannot run.
pub fn select_engine(config: &VadConfig) -> Option<Box<dyn VadEngine>> {
    let choice = config.engine.parse().unwrap_or(EngineChoice::Auto);
    let energy = || {
        let engine = EnergyVad::new(config.aggressiveness);
        engine
            .is_available()
            .then(|| Box::new(engine) as Box<dyn VadEngine>)
    };

    match choice {
        EngineChoice::Energy => energy(),
        EngineChoice::Silero => model_engine(config).or_else(|| {
            tracing::warn!(
                model_path = ?config.model_path,
                "silero engine unavailable, falling back to energy engine"
            );
            energy()
        }),
        EngineChoice::Auto => model_engine(config).or_else(energy),
    }
}

/// Drops speech spans shorter than `min_speech_ms`.
pub fn filter_short_spans(spans: Vec<SpeechSpan>, min_speech_ms: u32) -> Vec<SpeechSpan> {
    let min = min_speech_ms as f64 / 1000.0;
    spans
        .into_iter()
        .filter(|s| s.duration() + EPS >= min)
        .collect()
}

/// Merges speech spans separated by at most `max_silence_ms` of silence.
pub fn merge_close_spans(spans: Vec<SpeechSpan>, max_silence_ms: u32) -> Vec<SpeechSpan> {
    let max_gap = max_silence_ms as f64 / 1000.0;
    let mut merged: Vec<SpeechSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start - last.end <= max_gap + EPS => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Complement of `spans` over `[0, duration]`.
pub fn silence_spans(spans: &[SpeechSpan], duration: f64) -> Vec<SpeechSpan> {
    let mut silences = Vec::with_capacity(spans.len() + 1);
    let mut cursor = 0.0;
    for span in spans {
        if span.start > cursor + EPS {
            silences.push(SpeechSpan::new(cursor, span.start));
        }
        cursor = cursor.max(span.end);
    }
    if duration > cursor + EPS {
        silences.push(SpeechSpan::new(cursor, duration));
    }
    silences
}

/// Result of filtering segments against detected speech.
#[derive(Debug, Clone, PartialEq)]
pub struct VadOutcome {
    pub segments: Vec<EnhancedSegment>,
    /// Engine that actually ran, or `"none"`.
    pub engine_used: String,
    /// Cleaned speech spans.
    pub speech: Vec<SpeechSpan>,
    /// Midpoints of the silences between speech spans.
    pub pause_hints: Vec<f64>,
    pub removed: usize,
}

impl VadOutcome {
    /// Fraction of the audio classified as speech.
    pub fn speech_ratio(&self, duration: f64) -> f64 {
        if duration <= 0.0 {
            return 0.0;
        }
        let speech: f64 = self.speech.iter().map(SpeechSpan::duration).sum();
        (speech / duration).clamp(0.0, 1.0)
    }
}

/// Selects a VAD engine and applies it to segment lists.
pub struct VoiceActivityManager {
    config: VadConfig,
    engine: Option<Box<dyn VadEngine>>,
}

impl VoiceActivityManager {
    pub fn new(config: VadConfig) -> Self {
        let engine = select_engine(&config);
        Self { config, engine }
    }

    /// Uses a specific engine instead of the configured one.
    pub fn with_engine(config: VadConfig, engine: Box<dyn VadEngine>) -> Self {
        Self {
            config,
            engine: Some(engine),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.as_ref().map_or(ENGINE_NONE, |e| e.name())
    }

    pub fn is_available(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_available())
    }

    /// Speech spans after short-span filtering and close-span merging.
    ///
    /// Short spans are dropped first, so a noise burst next to real speech
    /// cannot be absorbed into it.
    pub fn detect_speech(&mut self, waveform: &Waveform) -> Result<Vec<SpeechSpan>> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(Vec::new());
        };
        let raw = engine.detect(waveform)?;
        let kept = filter_short_spans(raw, self.config.min_speech_ms);
        Ok(merge_close_spans(kept, self.config.max_silence_ms))
    }

    /// Drops segments that lie entirely inside a silence longer than
    /// `min_silence_ms`. Every kept segment is tagged.
    ///
    /// If no engine is usable or detection fails, the segments are returned
    /// unchanged with `engine_used = "none"`.
    pub fn process_segments(
        &mut self,
        segments: Vec<EnhancedSegment>,
        waveform: &Waveform,
    ) -> VadOutcome {
        let engine_used = self.engine_name();
        let speech = match self.detect_speech(waveform) {
            Ok(speech) if self.engine.is_some() => speech,
            Ok(_) => return Self::untouched(segments),
            Err(e) => {
                tracing::warn!(engine = engine_used, error = %e, "speech detection failed");
                return Self::untouched(segments);
            }
        };

        let silences = silence_spans(&speech, waveform.duration());
        let min_silence = self.config.min_silence_ms as f64 / 1000.0;
        let long_silences: Vec<SpeechSpan> = silences
            .iter()
            .copied()
            .filter(|s| s.duration() > min_silence)
            .collect();
        let pause_hints = silences
            .iter()
            .filter(|s| s.start > EPS && s.end < waveform.duration() - EPS)
            .map(|s| (s.start + s.end) / 2.0)
            .collect();

        let before = segments.len();
        let kept: Vec<EnhancedSegment> = segments
            .into_iter()
            .filter(|seg| {
                // Malformed segments are not ours to judge.
                !seg.is_valid()
                    || !long_silences
                        .iter()
                        .any(|s| seg.start >= s.start - EPS && seg.end <= s.end + EPS)
            })
            .map(|mut seg| {
                seg.mark_enhanced(TAG_VAD);
                seg
            })
            .collect();
        let removed = before - kept.len();

        tracing::debug!(
            engine = engine_used,
            speech_spans = speech.len(),
            removed,
            "vad filter applied"
        );

        VadOutcome {
            segments: kept,
            engine_used: engine_used.to_string(),
            speech,
            pause_hints,
            removed,
        }
    }

    fn untouched(segments: Vec<EnhancedSegment>) -> VadOutcome {
        VadOutcome {
            segments,
            engine_used: ENGINE_NONE.to_string(),
            speech: Vec::new(),
            pause_hints: Vec::new(),
            removed: 0,
        }
    }
}

/// Turns per-frame speech flags into spans.
pub(crate) fn spans_from_flags(flags: &[bool], frame_secs: f64, duration: f64) -> Vec<SpeechSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (i, &speech) in flags.iter().enumerate() {
        match (speech, open) {
            (true, None) => open = Some(i),
            (false, Some(start)) => {
                spans.push(SpeechSpan::new(
                    start as f64 * frame_secs,
                    (i as f64 * frame_secs).min(duration),
                ));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push(SpeechSpan::new(start as f64 * frame_secs, duration));
    }
    spans
}
