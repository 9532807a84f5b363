//! Runs configured components in order and aggregates their telemetry.

use crate::audio::Waveform;
use crate::config::{Config, RequestOverrides};
use crate::defaults;
use crate::error::{Result, SubalignError};
use crate::pipeline::component::{Enhancer, PipelineContext, build_components};
use crate::pipeline::error::{ComponentError, ErrorReporter, LogReporter};
use crate::pipeline::metrics::PipelineMetrics;
use crate::segment::{
    EnhancedSegment, TranscriptionMetadata, TranscriptionResult, malformed_segments,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Segments and telemetry from one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub segments: Vec<EnhancedSegment>,
    pub metrics: PipelineMetrics,
    /// Duration of the loaded audio, when audio was loaded.
    pub audio_duration: Option<f64>,
}

/// The enhancement pipeline.
///
/// Holds no state between `process` calls beyond its configuration and
/// components; waveform and metrics are local to each call.
pub struct Pipeline {
    config: Config,
    components: Vec<Box<dyn Enhancer>>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Validates `config` and builds its components.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let components = build_components(&config)?;
        Ok(Self {
            config,
            components,
            error_reporter: Arc::new(LogReporter),
        })
    }

    /// Builds a pipeline for one request: `overrides` win over `base`.
    pub fn for_request(base: &Config, overrides: &RequestOverrides) -> Result<Self> {
        Self::new(base.clone().with_request_overrides(overrides))
    }

    /// Uses explicit components instead of the configured list.
    pub fn with_components(config: Config, components: Vec<Box<dyn Enhancer>>) -> Self {
        Self {
            config,
            components,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    fn language_hint(&self) -> Option<String> {
        let language = self.config.pipeline.language.trim();
        (!language.is_empty() && !language.eq_ignore_ascii_case(defaults::AUTO_LANGUAGE))
            .then(|| language.to_string())
    }

    /// Runs every component in order.
    ///
    /// Audio is validated and decoded once, before any component runs, and
    /// only if some component needs it. Path and decode problems are returned
    /// as errors. Component failures are not: the run stops at the failed
    /// component and returns the last good segment list with degraded metrics.
    pub fn process(
        &mut self,
        segments: Vec<EnhancedSegment>,
        audio_path: Option<&Path>,
    ) -> Result<PipelineOutput> {
        let enabled = self.config.pipeline.enabled;
        if !enabled || self.components.is_empty() {
            tracing::debug!(enabled, "pipeline skipped");
            let metrics = PipelineMetrics::passthrough(enabled, segments.len());
            return Ok(PipelineOutput {
                segments,
                metrics,
                audio_duration: None,
            });
        }

        let waveform = match self.components.iter().find(|c| c.requires_audio()) {
            Some(component) => {
                let path = audio_path.ok_or_else(|| SubalignError::AudioRequired {
                    component: component.name().to_string(),
                })?;
                Some(Waveform::load(path)?)
            }
            None => None,
        };

        for error in malformed_segments(&segments) {
            tracing::warn!(%error, "malformed segment will not be refined or split");
        }

        let mut ctx = PipelineContext::new(waveform.as_ref(), self.language_hint());
        let mut metrics = PipelineMetrics::passthrough(true, segments.len());
        let mut current = segments;
        let run_start = Instant::now();

        for component in self.components.iter_mut() {
            let name = component.name();
            let started = Instant::now();
            let result = if component.is_available() {
                catch_unwind(AssertUnwindSafe(|| component.process(&current, &mut ctx)))
                    .unwrap_or_else(|payload| Err(ComponentError::from_panic(payload)))
            } else {
                Err(ComponentError::Unavailable(format!("{name} is not available")))
            };
            let elapsed = started.elapsed();

            match result {
                Ok(next) => {
                    tracing::debug!(
                        component = name,
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        segments = next.len(),
                        "component finished"
                    );
                    metrics.record_success(name, elapsed, component.metrics());
                    current = next;
                }
                Err(error) => {
                    self.error_reporter.report(name, &error);
                    metrics.record_failure(name, elapsed, error.to_string());
                    break;
                }
            }
        }

        metrics.vad_engine = ctx.vad_engine.take();
        metrics.segments_out = current.len();
        tracing::info!(
            components = ?metrics.components_executed,
            degraded = metrics.degraded,
            segments_in = metrics.segments_in,
            segments_out = metrics.segments_out,
            elapsed_ms = run_start.elapsed().as_secs_f64() * 1000.0,
            "pipeline finished"
        );

        Ok(PipelineOutput {
            segments: current,
            metrics,
            audio_duration: waveform.as_ref().map(Waveform::duration),
        })
    }
}

impl PipelineOutput {
    /// Wraps the output as a transcription result.
    ///
    /// `processing_time` is the caller's end-to-end time in seconds. When no
    /// audio was loaded, the duration falls back to the last segment end.
    pub fn into_result(
        self,
        language: &str,
        model_name: &str,
        processing_time: f64,
    ) -> TranscriptionResult {
        TranscriptionResult::from_pipeline(self, language, model_name, processing_time)
    }
}

impl TranscriptionResult {
    pub fn from_pipeline(
        output: PipelineOutput,
        language: &str,
        model_name: &str,
        processing_time: f64,
    ) -> Self {
        let duration = output.audio_duration.unwrap_or_else(|| {
            output
                .segments
                .iter()
                .map(|s| s.end)
                .fold(0.0, f64::max)
        });
        let vad_enabled = output
            .metrics
            .components_executed
            .iter()
            .any(|c| c == "vad")
            && output
                .metrics
                .vad_engine
                .as_deref()
                .is_some_and(|e| e != crate::vad::ENGINE_NONE);
        let alignment_model = output
            .segments
            .iter()
            .find_map(|s| s.alignment_model.clone());
        let stats = output.metrics.to_stats();

        TranscriptionResult {
            segments: output.segments,
            metadata: TranscriptionMetadata {
                language: language.to_string(),
                duration,
                model_name: model_name.to_string(),
                processing_time,
                vad_enabled,
                alignment_model,
            },
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::TAG_SPLIT;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Upper;

    impl Enhancer for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }
        fn requires_audio(&self) -> bool {
            false
        }
        fn process(
            &mut self,
            segments: &[EnhancedSegment],
            _ctx: &mut PipelineContext<'_>,
        ) -> std::result::Result<Vec<EnhancedSegment>, ComponentError> {
            Ok(segments
                .iter()
                .map(|s| {
                    let mut s = s.clone();
                    s.text = s.text.to_uppercase();
                    s
                })
                .collect())
        }
        fn metrics(&self) -> BTreeMap<String, f64> {
            BTreeMap::from([("touched".to_string(), 1.0)])
        }
    }

    struct Failing;

    impl Enhancer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn requires_audio(&self) -> bool {
            false
        }
        fn process(
            &mut self,
            _segments: &[EnhancedSegment],
            _ctx: &mut PipelineContext<'_>,
        ) -> std::result::Result<Vec<EnhancedSegment>, ComponentError> {
            Err(ComponentError::Failed("simulated".to_string()))
        }
        fn metrics(&self) -> BTreeMap<String, f64> {
            BTreeMap::new()
        }
    }

    struct Panicking;

    impl Enhancer for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn requires_audio(&self) -> bool {
            false
        }
        fn process(
            &mut self,
            _segments: &[EnhancedSegment],
            _ctx: &mut PipelineContext<'_>,
        ) -> std::result::Result<Vec<EnhancedSegment>, ComponentError> {
            panic!("index out of bounds")
        }
        fn metrics(&self) -> BTreeMap<String, f64> {
            BTreeMap::new()
        }
    }

    #[derive(Default)]
    struct CollectingReporter(Mutex<Vec<(String, String)>>);

    impl ErrorReporter for CollectingReporter {
        fn report(&self, component: &str, error: &ComponentError) {
            self.0
                .lock()
                .unwrap()
                .push((component.to_string(), error.to_string()));
        }
    }

    fn input() -> Vec<EnhancedSegment> {
        vec![
            EnhancedSegment::new(0.0, 2.0, "hello"),
            EnhancedSegment::new(2.0, 4.0, "world"),
        ]
    }

    #[test]
    fn new_rejects_unknown_component() {
        let mut config = Config::default();
        config.pipeline.components = "vad,xyz".to_string();
        let err = Pipeline::new(config).err().unwrap();
        assert_eq!(
            err.to_string(),
            "unknown pipeline component 'xyz'; valid options: vad, refine, split"
        );
    }

    #[test]
    fn none_pipeline_returns_input_unchanged() {
        let mut config = Config::default();
        config.pipeline.components = "none".to_string();
        let mut pipeline = Pipeline::new(config).unwrap();
        let out = pipeline.process(input(), None).unwrap();
        assert_eq!(out.segments, input());
        assert!(out.metrics.components_executed.is_empty());
        assert!(out.metrics.enabled);
    }

    #[test]
    fn kill_switch_overrides_configured_components() {
        let mut config = Config::default();
        config.pipeline.enabled = false;
        let mut pipeline = Pipeline::new(config).unwrap();
        // No audio needed: nothing runs.
        let out = pipeline.process(input(), None).unwrap();
        assert_eq!(out.segments, input());
        assert!(!out.metrics.enabled);
        assert!(out.metrics.components_executed.is_empty());
    }

    #[test]
    fn missing_audio_is_a_resource_error() {
        let mut pipeline = Pipeline::new(Config::default()).unwrap();
        let err = pipeline.process(input(), None).unwrap_err();
        assert!(err.is_resource_error(), "got {err:?}");

        let err = pipeline
            .process(input(), Some(Path::new("relative.wav")))
            .unwrap_err();
        assert!(matches!(err, SubalignError::AudioPathInvalid { .. }));
    }

    #[test]
    fn failing_component_degrades_to_last_good_output() {
        let reporter = Arc::new(CollectingReporter::default());
        let mut pipeline = Pipeline::with_components(
            Config::default(),
            vec![Box::new(Upper), Box::new(Failing), Box::new(Upper)],
        )
        .with_error_reporter(reporter.clone());

        let out = pipeline.process(input(), None).unwrap();
        assert_eq!(out.segments[0].text, "HELLO");
        assert_eq!(out.metrics.components_executed, vec!["upper"]);
        assert!(out.metrics.degraded);
        assert_eq!(
            out.metrics.components["failing"].error.as_deref(),
            Some("component failed: simulated")
        );
        assert_eq!(reporter.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn first_component_failure_returns_original_input() {
        let mut pipeline =
            Pipeline::with_components(Config::default(), vec![Box::new(Failing), Box::new(Upper)]);
        let out = pipeline.process(input(), None).unwrap();
        assert_eq!(out.segments, input());
        assert!(out.metrics.components_executed.is_empty());
    }

    #[test]
    fn panicking_component_is_contained() {
        let mut pipeline = Pipeline::with_components(
            Config::default(),
            vec![Box::new(Upper), Box::new(Panicking)],
        );
        let out = pipeline.process(input(), None).unwrap();
        assert_eq!(out.segments[1].text, "WORLD");
        let error = out.metrics.components["panicking"].error.clone().unwrap();
        assert!(error.contains("index out of bounds"), "got {error}");
    }

    #[test]
    fn split_only_pipeline_needs_no_audio() {
        let mut config = Config::default();
        config.pipeline.components = "split".to_string();
        let mut pipeline = Pipeline::new(config).unwrap();
        let segments = vec![EnhancedSegment::new(0.0, 10.0, "这是第一句话。这是第二句话。")];
        let out = pipeline.process(segments, None).unwrap();

        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.metrics.components_executed, vec!["split"]);
        assert_eq!(out.metrics.components["split"].counters["split_count"], 1.0);
        assert!(out.segments.iter().all(|s| s.has_enhancement(TAG_SPLIT)));
    }

    #[test]
    fn request_overrides_pick_components() {
        let overrides = RequestOverrides {
            components: Some("split".to_string()),
            ..Default::default()
        };
        let pipeline = Pipeline::for_request(&Config::default(), &overrides).unwrap();
        assert_eq!(pipeline.component_names(), vec!["split"]);
    }

    #[test]
    fn into_result_fills_metadata() {
        let mut config = Config::default();
        config.pipeline.components = "split".to_string();
        let mut pipeline = Pipeline::new(config).unwrap();
        let out = pipeline.process(input(), None).unwrap();
        let result = out.into_result("en", "whisper-small", 1.5);

        assert_eq!(result.metadata.language, "en");
        assert_eq!(result.metadata.duration, 4.0);
        assert!(!result.metadata.vad_enabled);
        assert_eq!(result.stats["components_executed"], 1.0);
    }
}
