//! Per-run pipeline telemetry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What one component reported for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub processing_time_ms: f64,
    /// Component-specific counters (segments removed, splits, ...).
    #[serde(flatten)]
    pub counters: BTreeMap<String, f64>,
    /// Set when the component failed; the run is then degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated telemetry for one `Pipeline::process` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// False when the kill switch short-circuited the run.
    pub enabled: bool,
    pub components: BTreeMap<String, ComponentReport>,
    /// Components that completed successfully, in execution order.
    pub components_executed: Vec<String>,
    pub total_pipeline_time_ms: f64,
    /// True when a component failed and its output was discarded.
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vad_engine: Option<String>,
    pub segments_in: usize,
    pub segments_out: usize,
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

impl PipelineMetrics {
    /// Metrics for a run that never started a component.
    pub fn passthrough(enabled: bool, segments: usize) -> Self {
        Self {
            enabled,
            segments_in: segments,
            segments_out: segments,
            ..Default::default()
        }
    }

    pub fn record_success(
        &mut self,
        component: &str,
        elapsed: Duration,
        counters: BTreeMap<String, f64>,
    ) {
        self.components.insert(
            component.to_string(),
            ComponentReport {
                processing_time_ms: millis(elapsed),
                counters,
                error: None,
            },
        );
        self.components_executed.push(component.to_string());
        self.total_pipeline_time_ms += millis(elapsed);
    }

    pub fn record_failure(&mut self, component: &str, elapsed: Duration, error: String) {
        self.components.insert(
            component.to_string(),
            ComponentReport {
                processing_time_ms: millis(elapsed),
                counters: BTreeMap::new(),
                error: Some(error),
            },
        );
        self.total_pipeline_time_ms += millis(elapsed);
        self.degraded = true;
    }

    /// Name and message of the failed component, if any.
    pub fn failure(&self) -> Option<(&str, &str)> {
        self.components
            .iter()
            .find_map(|(name, report)| report.error.as_deref().map(|e| (name.as_str(), e)))
    }

    /// Flat view used for `TranscriptionResult::stats`.
    pub fn to_stats(&self) -> BTreeMap<String, f64> {
        let mut stats = BTreeMap::from([
            (
                "total_pipeline_time_ms".to_string(),
                self.total_pipeline_time_ms,
            ),
            (
                "components_executed".to_string(),
                self.components_executed.len() as f64,
            ),
            ("segments_in".to_string(), self.segments_in as f64),
            ("segments_out".to_string(), self.segments_out as f64),
            ("degraded".to_string(), if self.degraded { 1.0 } else { 0.0 }),
        ]);
        for (name, report) in &self.components {
            stats.insert(format!("{name}.processing_time_ms"), report.processing_time_ms);
            for (key, value) in &report.counters {
                stats.insert(format!("{name}.{key}"), *value);
            }
        }
        stats
    }
}
