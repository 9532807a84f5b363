//! Segment and metadata model shared by every pipeline component.
//!
//! Timing arrays are optional: a segment either carries `chars`/`words` or it
//! does not, and every consumer has to handle both cases. Each `CharTiming`
//! maps one-to-one onto a non-whitespace character of the segment text.

use crate::error::SubalignError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag appended by the voice activity filter.
pub const TAG_VAD: &str = "vad_filter";
/// Tag appended by the boundary refiner.
pub const TAG_REFINE: &str = "timestamp_refine";
/// Tag appended by the splitter/merger.
pub const TAG_SPLIT: &str = "segment_split";

/// Source model tag used when the recognizer did not identify itself.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Timing of a single character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharTiming {
    #[serde(rename = "char")]
    pub ch: char,
    pub start: f64,
    pub end: f64,
    /// Alignment confidence (0.0 to 1.0).
    pub score: f32,
}

/// Timing of a single word (or CJK phrase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    /// Alignment confidence (0.0 to 1.0).
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A raw recognizer segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A segment with the metadata the enhancement pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTiming>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chars: Option<Vec<CharTiming>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_speech_prob: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_logprob: Option<f32>,
    #[serde(default = "unknown_model")]
    pub source_model: String,
    /// Audit trail of components that touched this segment. Append-only.
    #[serde(default)]
    pub enhancements_applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_model: Option<String>,
    /// Reserved for diarization. Never written by this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

fn unknown_model() -> String {
    UNKNOWN_MODEL.to_string()
}

impl From<Segment> for EnhancedSegment {
    fn from(segment: Segment) -> Self {
        Self::new(segment.start, segment.end, segment.text)
    }
}

impl EnhancedSegment {
    /// Creates a bare segment with no timing arrays and no scores.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: None,
            chars: None,
            confidence: None,
            no_speech_prob: None,
            avg_logprob: None,
            source_model: unknown_model(),
            enhancements_applied: Vec::new(),
            alignment_model: None,
            speaker: None,
        }
    }

    pub fn with_source_model(mut self, model: impl Into<String>) -> Self {
        self.source_model = model.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Number of non-whitespace characters in the text.
    pub fn char_count(&self) -> usize {
        crate::text::visible_len(&self.text)
    }

    /// Checks the structural invariants of a single segment.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(format!(
                "timestamps must be finite, got {}..{}",
                self.start, self.end
            ));
        }
        if self.start < 0.0 {
            return Err(format!("start must not be negative, got {}", self.start));
        }
        if self.end <= self.start {
            return Err(format!(
                "end ({:.3}) must be greater than start ({:.3})",
                self.end, self.start
            ));
        }
        if self.text.trim().is_empty() {
            return Err("text must not be empty".to_string());
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Appends `tag` to the audit trail unless it is already recorded.
    pub fn mark_enhanced(&mut self, tag: &str) {
        if !self.enhancements_applied.iter().any(|t| t == tag) {
            self.enhancements_applied.push(tag.to_string());
        }
    }

    pub fn has_enhancement(&self, tag: &str) -> bool {
        self.enhancements_applied.iter().any(|t| t == tag)
    }

    /// Mean character alignment score, if the segment carries chars.
    pub fn average_char_score(&self) -> Option<f32> {
        let chars = self.chars.as_ref().filter(|c| !c.is_empty())?;
        Some(chars.iter().map(|c| c.score).sum::<f32>() / chars.len() as f32)
    }

    /// True when every timing entry lies within `[start, end]` and entries are ordered.
    pub fn timing_within_bounds(&self) -> bool {
        const EPS: f64 = 1e-6;
        let within = |s: f64, e: f64| s >= self.start - EPS && e <= self.end + EPS && s <= e + EPS;

        let chars_ok = self.chars.as_ref().is_none_or(|chars| {
            chars.iter().all(|c| within(c.start, c.end))
                && chars.windows(2).all(|w| w[0].end <= w[1].start + EPS)
        });
        let words_ok = self.words.as_ref().is_none_or(|words| {
            words.iter().all(|w| within(w.start, w.end))
                && words.windows(2).all(|w| w[0].end <= w[1].start + EPS)
        });
        chars_ok && words_ok
    }
}

/// One `InvalidSegment` error per malformed segment, in input order.
pub fn malformed_segments(segments: &[EnhancedSegment]) -> Vec<SubalignError> {
    segments
        .iter()
        .enumerate()
        .filter_map(|(index, s)| {
            s.validate()
                .err()
                .map(|message| SubalignError::InvalidSegment { index, message })
        })
        .collect()
}

/// True when segments are sorted by start and no two overlap.
pub fn is_ordered(segments: &[EnhancedSegment]) -> bool {
    const EPS: f64 = 1e-6;
    segments
        .windows(2)
        .all(|w| w[0].start <= w[1].start && w[0].end <= w[1].start + EPS)
}

/// Transcription-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    pub language: String,
    /// Total audio duration in seconds.
    pub duration: f64,
    pub model_name: String,
    /// Total processing time in seconds.
    pub processing_time: f64,
    pub vad_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_model: Option<String>,
}

/// Top-level artifact handed to the editor and exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<EnhancedSegment>,
    pub metadata: TranscriptionMetadata,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
}

/// Accepts either a bare segment array or a full transcription result.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SegmentsInput {
    Result(Box<TranscriptionResult>),
    Segments(Vec<EnhancedSegment>),
}

impl SegmentsInput {
    pub fn into_segments(self) -> Vec<EnhancedSegment> {
        match self {
            SegmentsInput::Result(result) => result.segments,
            SegmentsInput::Segments(segments) => segments,
        }
    }
}
