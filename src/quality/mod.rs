//! Quality validation of enhanced segments.
//!
//! The validator only reads segments. It scores accuracy against a
//! reference transcript, summarizes lengths and confidences, compares a run
//! with a stored baseline and compares recognizers side by side.

pub mod accuracy;
pub mod baseline;
pub mod stats;

pub use accuracy::{AccuracyMetrics, character_error_rate, edit_distance, word_error_rate};
pub use baseline::{BaselineComparison, BaselineRecord};
pub use stats::{CharTimingStats, ConfidenceStats, Distribution, EnhancementStats, SegmentStats};

use crate::config::QualityConfig;
use crate::error::Result;
use crate::pipeline::PipelineMetrics;
use crate::segment::EnhancedSegment;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// The quality-metrics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// RFC 3339 time the report was produced.
    pub generated_at: String,
    pub segment_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<SegmentStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_timing: Option<CharTimingStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceStats>,
    pub enhancement: EnhancementStats,
}

impl QualityReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reports for each `source_model`, keyed by model name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub models: BTreeMap<String, QualityReport>,
}

impl ModelComparison {
    /// Model with the lowest CER, if any model could be scored.
    pub fn best_by_cer(&self) -> Option<(&str, f64)> {
        self.models
            .iter()
            .filter_map(|(name, r)| Some((name.as_str(), r.accuracy.as_ref()?.cer?)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Model with the highest length compliance.
    pub fn best_by_compliance(&self) -> Option<(&str, f64)> {
        self.models
            .iter()
            .filter_map(|(name, r)| Some((name.as_str(), r.segments.as_ref()?.compliance_pct)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Concatenates segment texts into one hypothesis transcript.
pub fn hypothesis_text(segments: &[EnhancedSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .fold(String::new(), |acc, t| text::join_texts(&acc, t))
}

pub struct QualityValidator {
    config: QualityConfig,
}

impl QualityValidator {
    /// Rejects out-of-range thresholds.
    pub fn new(config: QualityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Scores one segment list.
    ///
    /// `reference` enables CER/WER; `metrics` adds pipeline overhead to the
    /// enhancement section. Missing inputs only omit sections.
    pub fn validate(
        &self,
        segments: &[EnhancedSegment],
        reference: Option<&str>,
        metrics: Option<&PipelineMetrics>,
    ) -> QualityReport {
        let threshold = self.config.low_confidence_threshold;
        let accuracy = reference
            .filter(|r| !r.trim().is_empty())
            .map(|r| AccuracyMetrics::compute(r, &hypothesis_text(segments)));

        QualityReport {
            generated_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            segment_count: segments.len(),
            accuracy,
            segments: SegmentStats::compute(segments, &self.config),
            char_timing: CharTimingStats::compute(segments, threshold),
            confidence: ConfidenceStats::compute(segments, threshold),
            enhancement: EnhancementStats::compute(segments, metrics),
        }
    }

    /// Scores `baseline`'s segments and compares `current` against them.
    pub fn compare_baseline(
        &self,
        baseline: &BaselineRecord,
        current: &QualityReport,
    ) -> BaselineComparison {
        let baseline_report = self.validate(
            &baseline.segments,
            baseline.reference_transcript.as_deref(),
            None,
        );
        let comparison = BaselineComparison::between(&baseline.name, &baseline_report, current);
        if comparison.regression {
            tracing::warn!(baseline = %baseline.name, notes = ?comparison.notes, "quality regression");
        }
        comparison
    }

    /// Groups segments by `source_model` and scores each group on its own.
    ///
    /// Each group is scored against the same reference, so two recognizers
    /// run on identical audio compare directly.
    pub fn compare_models(
        &self,
        segments: &[EnhancedSegment],
        reference: Option<&str>,
    ) -> ModelComparison {
        let mut groups: BTreeMap<String, Vec<EnhancedSegment>> = BTreeMap::new();
        for segment in segments {
            groups
                .entry(segment.source_model.clone())
                .or_default()
                .push(segment.clone());
        }
        let models = groups
            .into_iter()
            .map(|(model, group)| {
                let report = self.validate(&group, reference, None);
                (model, report)
            })
            .collect();
        ModelComparison { models }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> QualityValidator {
        QualityValidator::new(QualityConfig::default()).unwrap()
    }

    #[test]
    fn new_rejects_bad_threshold() {
        let config = QualityConfig {
            low_confidence_threshold: 2.0,
            ..Default::default()
        };
        let err = QualityValidator::new(config).err().unwrap();
        assert!(err.to_string().contains("quality.low_confidence_threshold"));
    }

    #[test]
    fn validate_without_optional_metadata_omits_sections() {
        let report = validator().validate(&[EnhancedSegment::new(0.0, 2.0, "hello")], None, None);
        assert_eq!(report.segment_count, 1);
        assert!(report.accuracy.is_none());
        assert!(report.confidence.is_none());
        assert!(report.char_timing.is_none());
        assert!(report.segments.is_some());

        let json = report.to_json().unwrap();
        assert!(!json.contains("\"accuracy\""), "got {json}");
    }

    #[test]
    fn validate_scores_against_reference() {
        let segments = vec![
            EnhancedSegment::new(0.0, 1.5, "你好"),
            EnhancedSegment::new(1.5, 3.0, "世间"),
        ];
        let report = validator().validate(&segments, Some("你好世界"), None);
        let accuracy = report.accuracy.unwrap();
        assert!((accuracy.cer.unwrap() - 0.25).abs() < 1e-9);
        assert!(accuracy.wer.unwrap() > 0.0);
    }

    #[test]
    fn hypothesis_joins_latin_with_spaces() {
        let segments = vec![
            EnhancedSegment::new(0.0, 1.0, "hello"),
            EnhancedSegment::new(1.0, 2.0, "world"),
        ];
        assert_eq!(hypothesis_text(&segments), "hello world");
    }

    #[test]
    fn baseline_improvement_on_compliance_gain() {
        let baseline = BaselineRecord::new(
            "raw",
            "/data/a.wav",
            vec![
                EnhancedSegment::new(0.0, 12.0, "one"),
                EnhancedSegment::new(12.0, 24.0, "two"),
            ],
        );
        let current = validator().validate(
            &[
                EnhancedSegment::new(0.0, 6.0, "one"),
                EnhancedSegment::new(6.0, 12.0, "two"),
            ],
            None,
            None,
        );
        let comparison = validator().compare_baseline(&baseline, &current);
        assert_eq!(comparison.compliance_delta, Some(100.0));
        assert!(comparison.improvement);
        assert!(!comparison.regression);
        assert!(comparison.cer_delta.is_none());
    }

    #[test]
    fn baseline_regression_on_accuracy_loss() {
        let baseline = BaselineRecord::new(
            "good",
            "/data/a.wav",
            vec![EnhancedSegment::new(0.0, 2.0, "你好世界")],
        )
        .with_reference("你好世界");
        let current = validator().validate(
            &[EnhancedSegment::new(0.0, 2.0, "你好世间")],
            Some("你好世界"),
            None,
        );
        let comparison = validator().compare_baseline(&baseline, &current);
        assert!(comparison.regression);
        assert!((comparison.cer_delta.unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn compare_models_groups_by_source() {
        let segments = vec![
            EnhancedSegment::new(0.0, 2.0, "你好世界").with_source_model("whisper"),
            EnhancedSegment::new(0.0, 2.0, "你好世间").with_source_model("sensevoice"),
        ];
        let comparison = validator().compare_models(&segments, Some("你好世界"));
        assert_eq!(comparison.models.len(), 2);
        assert_eq!(comparison.best_by_cer(), Some(("whisper", 0.0)));
        assert_eq!(
            comparison.models["sensevoice"]
                .accuracy
                .as_ref()
                .and_then(|a| a.cer),
            Some(0.25)
        );
    }

    #[test]
    fn best_by_compliance_prefers_subtitle_sized_segments() {
        let segments = vec![
            EnhancedSegment::new(0.0, 12.0, "一段太长的字幕").with_source_model("raw"),
            EnhancedSegment::new(0.0, 4.0, "一段").with_source_model("split"),
            EnhancedSegment::new(4.0, 8.0, "字幕").with_source_model("split"),
        ];
        let comparison = validator().compare_models(&segments, None);
        assert_eq!(comparison.best_by_compliance(), Some(("split", 100.0)));
        assert!(comparison.best_by_cer().is_none());
    }
}
