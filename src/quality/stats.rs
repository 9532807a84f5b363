//! Descriptive statistics over segment lists.
//!
//! Every section is optional: a statistic that needs metadata the segments
//! do not carry is reported as `None` instead of failing.

use crate::config::QualityConfig;
use crate::pipeline::PipelineMetrics;
use crate::segment::EnhancedSegment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Linearly interpolated percentile of an ascending slice.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Summary of one numeric distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl Distribution {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let v = sorted(values);
        let first = *v.first()?;
        let last = *v.last()?;
        Some(Self {
            mean: v.iter().sum::<f64>() / v.len() as f64,
            median: percentile(&v, 0.5)?,
            p95: percentile(&v, 0.95)?,
            p99: percentile(&v, 0.99)?,
            min: first,
            max: last,
        })
    }
}

/// Length statistics and subtitle-readability compliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub count: usize,
    pub duration: Distribution,
    pub chars: Distribution,
    /// Share of segments within the ideal duration range.
    pub duration_compliance_pct: f64,
    /// Share of segments within the character limit.
    pub char_compliance_pct: f64,
    /// Share of segments meeting both constraints at once.
    pub compliance_pct: f64,
}

impl SegmentStats {
    pub fn compute(segments: &[EnhancedSegment], config: &QualityConfig) -> Option<Self> {
        if segments.is_empty() {
            return None;
        }
        let duration_ok = |s: &EnhancedSegment| {
            s.duration() >= config.ideal_min_duration - 1e-9
                && s.duration() <= config.ideal_max_duration + 1e-9
        };
        let chars_ok = |s: &EnhancedSegment| s.char_count() <= config.ideal_max_chars;

        let n = segments.len();
        Some(Self {
            count: n,
            duration: Distribution::from_values(segments.iter().map(EnhancedSegment::duration))?,
            chars: Distribution::from_values(segments.iter().map(|s| s.char_count() as f64))?,
            duration_compliance_pct: pct(segments.iter().filter(|s| duration_ok(s)).count(), n),
            char_compliance_pct: pct(segments.iter().filter(|s| chars_ok(s)).count(), n),
            compliance_pct: pct(
                segments
                    .iter()
                    .filter(|s| duration_ok(s) && chars_ok(s))
                    .count(),
                n,
            ),
        })
    }
}

/// Alignment quality over segments that carry char timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharTimingStats {
    pub segments_with_chars: usize,
    pub avg_char_score: f64,
    /// Segments whose mean char score is below the low-confidence threshold.
    pub low_confidence_segments: usize,
}

impl CharTimingStats {
    pub fn compute(segments: &[EnhancedSegment], threshold: f32) -> Option<Self> {
        let averages: Vec<f32> = segments
            .iter()
            .filter_map(EnhancedSegment::average_char_score)
            .collect();
        if averages.is_empty() {
            return None;
        }
        Some(Self {
            segments_with_chars: averages.len(),
            avg_char_score: averages.iter().map(|&a| a as f64).sum::<f64>() / averages.len() as f64,
            low_confidence_segments: averages.iter().filter(|&&a| a < threshold).count(),
        })
    }
}

/// Segment-level recognizer confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub below_threshold: usize,
    pub below_threshold_pct: f64,
}

impl ConfidenceStats {
    pub fn compute(segments: &[EnhancedSegment], threshold: f32) -> Option<Self> {
        let values = sorted(segments.iter().filter_map(|s| s.confidence).map(f64::from));
        let n = values.len();
        let first = *values.first()?;
        let last = *values.last()?;
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let below = values.iter().filter(|&&v| v < threshold as f64).count();
        Some(Self {
            count: n,
            mean,
            median: percentile(&values, 0.5)?,
            min: first,
            max: last,
            std_dev: variance.sqrt(),
            below_threshold: below,
            below_threshold_pct: pct(below, n),
        })
    }
}

/// How many segments each component touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancementStats {
    /// Segment count per `enhancements_applied` tag.
    pub tag_counts: BTreeMap<String, usize>,
    /// Segments carrying at least one tag.
    pub segments_enhanced: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_overhead_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components_executed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

impl EnhancementStats {
    pub fn compute(segments: &[EnhancedSegment], metrics: Option<&PipelineMetrics>) -> Self {
        let mut tag_counts = BTreeMap::new();
        for tag in segments.iter().flat_map(|s| &s.enhancements_applied) {
            *tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        Self {
            tag_counts,
            segments_enhanced: segments
                .iter()
                .filter(|s| !s.enhancements_applied.is_empty())
                .count(),
            pipeline_overhead_ms: metrics.map(|m| m.total_pipeline_time_ms),
            components_executed: metrics.map(|m| m.components_executed.clone()),
            degraded: metrics.map(|m| m.degraded),
        }
    }
}
