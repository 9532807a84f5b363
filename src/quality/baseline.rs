//! Baseline records for regression and improvement checks.

use crate::defaults;
use crate::error::{Result, SubalignError};
use crate::quality::QualityReport;
use crate::segment::EnhancedSegment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A stored reference result. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub version: String,
    pub name: String,
    pub audio_file: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_transcript: Option<String>,
    pub segments: Vec<EnhancedSegment>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl BaselineRecord {
    pub fn new(
        name: impl Into<String>,
        audio_file: impl Into<String>,
        segments: Vec<EnhancedSegment>,
    ) -> Self {
        Self {
            version: defaults::BASELINE_VERSION.to_string(),
            name: name.into(),
            audio_file: audio_file.into(),
            timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            reference_transcript: None,
            segments,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_transcript = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Creation time, if the stored timestamp parses.
    pub fn created_at(&self) -> Option<SystemTime> {
        humantime::parse_rfc3339_weak(&self.timestamp).ok()
    }

    /// Writes the record as pretty JSON. Refuses to overwrite an existing file.
    ///
    /// The JSON is written to a staging file first and linked into place, so
    /// `path` only ever appears complete.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)? + "\n";
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let staging = staging_path(path);
        let written = fs::write(&staging, json);
        let linked = written.and_then(|()| fs::hard_link(&staging, path));
        if let Err(e) = fs::remove_file(&staging) {
            tracing::debug!(path = %staging.display(), error = %e, "staging file not removed");
        }
        linked.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => SubalignError::Baseline {
                message: format!(
                    "baseline already exists at {}; baselines are never overwritten",
                    path.display()
                ),
            },
            _ => SubalignError::Io(e),
        })?;
        tracing::info!(name = %self.name, path = %path.display(), "baseline saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let record: BaselineRecord = serde_json::from_str(&contents)?;
        if record.version != defaults::BASELINE_VERSION {
            tracing::warn!(
                version = %record.version,
                expected = defaults::BASELINE_VERSION,
                "baseline version differs"
            );
        }
        Ok(record)
    }
}

/// Differences between a current report and a baseline report.
///
/// Deltas are `current - baseline`; lower error rates are better, higher
/// compliance and confidence are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cer_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wer_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_delta: Option<f64>,
    pub regression: bool,
    pub improvement: bool,
    /// Human-readable reasons behind the two flags.
    pub notes: Vec<String>,
}

/// Hidden sibling of `path` used while a save is in progress.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

fn delta(current: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    Some(current? - baseline?)
}

impl BaselineComparison {
    pub fn between(name: &str, baseline: &QualityReport, current: &QualityReport) -> Self {
        let cer = |r: &QualityReport| r.accuracy.as_ref().and_then(|a| a.cer);
        let wer = |r: &QualityReport| r.accuracy.as_ref().and_then(|a| a.wer);
        let compliance = |r: &QualityReport| r.segments.as_ref().map(|s| s.compliance_pct);
        let confidence = |r: &QualityReport| r.confidence.as_ref().map(|c| c.mean);

        let cer_delta = delta(cer(current), cer(baseline));
        let wer_delta = delta(wer(current), wer(baseline));
        let compliance_delta = delta(compliance(current), compliance(baseline));
        let confidence_delta = delta(confidence(current), confidence(baseline));

        let mut notes = Vec::new();
        let mut regression = false;
        let mut improvement = false;

        if let Some(d) = cer_delta
            && d > defaults::REGRESSION_ERROR_RATE_TOLERANCE
        {
            regression = true;
            notes.push(format!("CER rose by {:.3}", d));
        }
        if let Some(d) = compliance_delta
            && d < -defaults::REGRESSION_COMPLIANCE_TOLERANCE
        {
            regression = true;
            notes.push(format!("compliance fell by {:.1} points", -d));
        }
        if let Some(d) = confidence_delta
            && d < -defaults::REGRESSION_CONFIDENCE_TOLERANCE
        {
            regression = true;
            notes.push(format!("mean confidence fell by {:.3}", -d));
        }

        if let Some(d) = compliance_delta
            && d >= defaults::IMPROVEMENT_COMPLIANCE_GAIN
        {
            improvement = true;
            notes.push(format!("compliance rose by {:.1} points", d));
        }
        if let (Some(base), Some(now)) = (cer(baseline), cer(current))
            && base > 0.0
            && (base - now) / base >= defaults::IMPROVEMENT_ERROR_RATE_REDUCTION
        {
            improvement = true;
            notes.push(format!("CER fell from {:.3} to {:.3}", base, now));
        }

        Self {
            baseline_name: name.to_string(),
            cer_delta,
            wer_delta,
            compliance_delta,
            confidence_delta,
            regression,
            improvement,
            notes,
        }
    }
}
