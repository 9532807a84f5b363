//! The component interface and the factory that builds components from
//! configuration.

use crate::audio::Waveform;
use crate::config::Config;
use crate::error::{Result, SubalignError};
use crate::pipeline::error::ComponentError;
use crate::pipeline::refiner::TimestampRefiner;
use crate::pipeline::splitter::SegmentSplitter;
use crate::pipeline::vad_filter::VadFilter;
use crate::segment::EnhancedSegment;
use crate::timing::TimingScores;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Per-invocation state shared between components.
///
/// Everything here lives for one `process()` call only.
#[derive(Debug, Default)]
pub struct PipelineContext<'a> {
    /// Decoded audio, loaded once up front when any component needs it.
    pub waveform: Option<&'a Waveform>,
    pub language: Option<String>,
    /// Candidate split points (seconds) published by upstream components.
    pub pause_hints: Vec<f64>,
    /// Engine the VAD component actually used.
    pub vad_engine: Option<String>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(waveform: Option<&'a Waveform>, language: Option<String>) -> Self {
        Self {
            waveform,
            language,
            ..Default::default()
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// The waveform, or `Unavailable` naming the component that needed it.
    pub fn require_waveform(&self, component: &str) -> std::result::Result<&'a Waveform, ComponentError> {
        self.waveform.ok_or_else(|| {
            ComponentError::Unavailable(format!("{component} requires audio but none was loaded"))
        })
    }
}

/// A segment enhancement component.
///
/// Components never mutate their input slice; they return a new list. The
/// orchestrator keeps the previous list as the fallback if they fail.
pub trait Enhancer: Send {
    /// Key used in configuration strings and metrics.
    fn name(&self) -> &'static str;

    /// Whether the component reads the waveform.
    fn requires_audio(&self) -> bool;

    /// Whether the component can run at all in this process.
    fn is_available(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        segments: &[EnhancedSegment],
        ctx: &mut PipelineContext<'_>,
    ) -> std::result::Result<Vec<EnhancedSegment>, ComponentError>;

    /// Counters from the most recent `process` call.
    fn metrics(&self) -> BTreeMap<String, f64>;
}

/// The components a pipeline string may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Vad,
    Refine,
    Split,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [ComponentKind::Vad, ComponentKind::Refine, ComponentKind::Split];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Vad => "vad",
            ComponentKind::Refine => "refine",
            ComponentKind::Split => "split",
        }
    }

    fn valid_options() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = SubalignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vad" => Ok(ComponentKind::Vad),
            "refine" => Ok(ComponentKind::Refine),
            "split" => Ok(ComponentKind::Split),
            _ => Err(SubalignError::UnknownComponent {
                name: s.trim().to_string(),
                valid: Self::valid_options(),
            }),
        }
    }
}

/// Parses a component order string such as `"vad,refine,split"`.
///
/// `"none"` and the empty string yield an empty pipeline. Unknown and
/// repeated names are errors.
pub fn parse_components(spec: &str) -> Result<Vec<ComponentKind>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(crate::defaults::PIPELINE_NONE) {
        return Ok(Vec::new());
    }

    let mut kinds = Vec::new();
    for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind: ComponentKind = part.parse()?;
        if kinds.contains(&kind) {
            return Err(SubalignError::DuplicateComponent {
                name: kind.to_string(),
            });
        }
        kinds.push(kind);
    }
    Ok(kinds)
}

/// Build components from configuration, in configured order.
pub fn build_components(config: &Config) -> Result<Vec<Box<dyn Enhancer>>> {
    let scores = TimingScores {
        word: config.refine.default_word_score,
        char: config.refine.default_char_score,
    };

    let components = parse_components(&config.pipeline.components)?
        .into_iter()
        .map(|kind| -> Box<dyn Enhancer> {
            match kind {
                ComponentKind::Vad => Box::new(VadFilter::new(config.vad.clone())),
                ComponentKind::Refine => Box::new(TimestampRefiner::new(config.refine.clone())),
                ComponentKind::Split => {
                    Box::new(SegmentSplitter::new(config.split.clone()).with_scores(scores))
                }
            }
        })
        .collect();
    Ok(components)
}
