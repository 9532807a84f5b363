mod common;

use common::{seg, write_tone_wav};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use subalign::config::{Config, QualityConfig, RequestOverrides, SplitConfig, VadConfig};
use subalign::error::SubalignError;
use subalign::pipeline::{
    ComponentError, Enhancer, ErrorReporter, Pipeline, PipelineContext, SegmentSplitter,
    TimestampRefiner,
};
use subalign::quality::QualityValidator;
use subalign::segment::{EnhancedSegment, TAG_REFINE, TAG_SPLIT, TAG_VAD, is_ordered};
use subalign::vad::VoiceActivityManager;

fn pipeline(components: &str) -> Pipeline {
    let mut config = Config::default();
    config.pipeline.components = components.to_string();
    config.vad.engine = "energy".to_string();
    Pipeline::new(config).unwrap()
}

struct Failing;

impl Enhancer for Failing {
    fn name(&self) -> &'static str {
        "boom"
    }

    fn requires_audio(&self) -> bool {
        false
    }

    fn process(
        &mut self,
        _segments: &[EnhancedSegment],
        _ctx: &mut PipelineContext<'_>,
    ) -> Result<Vec<EnhancedSegment>, ComponentError> {
        Err(ComponentError::Failed("injected failure".to_string()))
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

#[derive(Default)]
struct CollectingReporter {
    seen: Mutex<Vec<String>>,
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, component: &str, error: &ComponentError) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{component}: {error}"));
    }
}

// ── Kill switch and empty pipelines ─────────────────────────────────────

#[test]
fn kill_switch_returns_input_unchanged() {
    let mut config = Config::default();
    config.pipeline.enabled = false;
    let mut pipeline = Pipeline::new(config).unwrap();

    let input = vec![seg(0.0, 12.0, "一个很长但不会被切开的句子。另一句。")];
    let output = pipeline.process(input.clone(), None).unwrap();

    assert_eq!(output.segments, input);
    assert!(!output.metrics.enabled);
    assert!(output.metrics.components_executed.is_empty());
}

#[test]
fn none_pipeline_is_identity() {
    let mut pipeline = pipeline("none");
    assert!(pipeline.component_names().is_empty());

    let input = vec![seg(0.0, 0.5, "短"), seg(0.5, 20.0, "很长。很长。")];
    let output = pipeline.process(input.clone(), None).unwrap();
    assert_eq!(output.segments, input);
    assert!(output.metrics.components_executed.is_empty());
    assert!(!output.metrics.degraded);
}

// ── Configuration errors ────────────────────────────────────────────────

#[test]
fn unknown_component_is_rejected_with_field_message() {
    let mut config = Config::default();
    config.pipeline.components = "vad,xyz".to_string();
    let err = Pipeline::new(config).err().unwrap();
    assert_eq!(
        err.to_string(),
        "unknown pipeline component 'xyz'; valid options: vad, refine, split"
    );
    assert!(err.is_config_error());
}

#[test]
fn request_overrides_win_over_process_config() {
    let mut base = Config::default();
    base.split.max_duration = 6.0;
    let overrides = RequestOverrides {
        components: Some("split".to_string()),
        max_duration: Some(3.0),
        ..Default::default()
    };
    let pipeline = Pipeline::for_request(&base, &overrides).unwrap();
    assert_eq!(pipeline.config().split.max_duration, 3.0);
    assert_eq!(pipeline.component_names(), vec!["split"]);
    assert_eq!(base.split.max_duration, 6.0, "base config is not mutated");
}

#[test]
fn out_of_range_override_names_field() {
    let overrides = RequestOverrides {
        vad_threshold: Some(1.5),
        ..Default::default()
    };
    let err = Pipeline::for_request(&Config::default(), &overrides)
        .err()
        .unwrap();
    assert!(err.to_string().contains("vad.threshold"), "got: {err}");
}

// ── Path safety ─────────────────────────────────────────────────────────

#[test]
fn relative_audio_path_is_rejected() {
    let mut pipeline = pipeline("refine");
    let err = pipeline
        .process(vec![seg(0.0, 1.0, "a")], Some(Path::new("audio/clip.wav")))
        .unwrap_err();
    assert!(
        matches!(err, SubalignError::AudioPathInvalid { .. }),
        "got {err:?}"
    );
    assert!(err.is_resource_error());
}

#[test]
fn traversal_audio_path_is_rejected() {
    let mut pipeline = pipeline("refine");
    let err = pipeline
        .process(vec![seg(0.0, 1.0, "a")], Some(Path::new("/tmp/../etc/clip.wav")))
        .unwrap_err();
    assert!(
        matches!(err, SubalignError::AudioPathInvalid { ref reason, .. } if reason.contains("..")),
        "got {err:?}"
    );
}

#[test]
fn missing_audio_is_a_resource_error() {
    let mut pipeline = pipeline("vad,refine");
    let err = pipeline.process(vec![seg(0.0, 1.0, "a")], None).unwrap_err();
    assert!(
        matches!(err, SubalignError::AudioRequired { ref component } if component == "vad"),
        "got {err:?}"
    );

    let dir = tempfile::tempdir().unwrap();
    let absent = dir.path().join("absent.wav");
    let err = pipeline
        .process(vec![seg(0.0, 1.0, "a")], Some(&absent))
        .unwrap_err();
    assert!(matches!(err, SubalignError::AudioNotFound { .. }), "got {err:?}");
}

#[test]
fn refiner_rejects_unsafe_paths_directly() {
    let mut refiner = TimestampRefiner::new(Default::default());
    let segments = vec![seg(0.0, 1.0, "a")];
    assert!(
        refiner
            .refine_file(&segments, Path::new("clip.wav"), None)
            .is_err()
    );
    assert!(
        refiner
            .refine_file(&segments, Path::new("/data/../../clip.wav"), None)
            .is_err()
    );
}

// ── Splitting and merging ───────────────────────────────────────────────

#[test]
fn long_cjk_segment_splits_at_sentence_end() {
    let mut pipeline = pipeline("split");
    let output = pipeline
        .process(vec![seg(0.0, 10.0, "这是第一句话。这是第二句话。")], None)
        .unwrap();

    let out = &output.segments;
    assert_eq!(out.len(), 2, "got {out:?}");
    assert!(out[0].text.ends_with('。'), "got {:?}", out[0].text);
    assert!(out.iter().all(|s| s.chars.is_some()));
    assert!(out.iter().all(|s| s.has_enhancement(TAG_SPLIT)));

    // Children reproduce the parent exactly.
    assert_eq!(format!("{}{}", out[0].text, out[1].text), "这是第一句话。这是第二句话。");
    assert_eq!(out[0].start, 0.0);
    assert_eq!(out[0].end, out[1].start);
    assert_eq!(out[1].end, 10.0);
    assert!(out.iter().all(EnhancedSegment::timing_within_bounds));

    let split = &output.metrics.components["split"];
    assert_eq!(split.counters["split_count"], 1.0);
}

#[test]
fn short_neighbours_merge() {
    let mut pipeline = pipeline("split");
    let output = pipeline
        .process(vec![seg(0.0, 0.8, "短"), seg(0.8, 1.5, "句子")], None)
        .unwrap();

    assert_eq!(output.segments.len(), 1);
    let merged = &output.segments[0];
    assert_eq!(merged.text, "短句子");
    assert_eq!(merged.start, 0.0);
    assert_eq!(merged.end, 1.5);
    let chars = merged.chars.as_ref().unwrap();
    assert_eq!(chars.len(), 3);
    assert!(merged.timing_within_bounds());
}

#[test]
fn splitting_raises_compliance_above_95_percent() {
    // Every segment is 20s and 90 characters: all outside [1s, 7s].
    let sentence = "这是一个测试句子。".repeat(10);
    let segments: Vec<EnhancedSegment> = (0..40)
        .map(|i| seg(i as f64 * 20.0, (i + 1) as f64 * 20.0, &sentence))
        .collect();

    let validator = QualityValidator::new(QualityConfig::default()).unwrap();
    let before = validator.validate(&segments, None, None);
    assert_eq!(before.segments.as_ref().unwrap().compliance_pct, 0.0);

    let mut pipeline = pipeline("split");
    let output = pipeline.process(segments, None).unwrap();
    assert!(is_ordered(&output.segments));

    let after = validator.validate(&output.segments, None, Some(&output.metrics));
    let compliance = after.segments.as_ref().unwrap().compliance_pct;
    assert!(compliance >= 95.0, "compliance {compliance}");
    assert_eq!(after.enhancement.components_executed, Some(vec!["split".to_string()]));
}

// ── Graceful degradation ────────────────────────────────────────────────

#[test]
fn failing_component_returns_last_good_output() {
    let reporter = Arc::new(CollectingReporter::default());
    let components: Vec<Box<dyn Enhancer>> = vec![
        Box::new(SegmentSplitter::new(SplitConfig::default())),
        Box::new(Failing),
    ];
    let mut pipeline =
        Pipeline::with_components(Config::default(), components).with_error_reporter(reporter.clone());

    let output = pipeline
        .process(vec![seg(0.0, 10.0, "这是第一句话。这是第二句话。")], None)
        .unwrap();

    assert_eq!(output.segments.len(), 2, "split output survives the failure");
    assert!(output.metrics.degraded);
    assert_eq!(output.metrics.components_executed, vec!["split"]);
    let error = output.metrics.components["boom"].error.as_deref().unwrap();
    assert!(error.contains("injected failure"), "got {error}");

    let seen = reporter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("boom:"), "got {:?}", seen[0]);
}

#[test]
fn failure_in_first_component_returns_input() {
    let components: Vec<Box<dyn Enhancer>> = vec![Box::new(Failing)];
    let mut pipeline = Pipeline::with_components(Config::default(), components);
    let input = vec![seg(0.0, 1.0, "a"), seg(1.0, 2.0, "b")];
    let output = pipeline.process(input.clone(), None).unwrap();
    assert_eq!(output.segments, input);
    assert!(output.metrics.degraded);
}

// ── Audio-backed stages ─────────────────────────────────────────────────

#[test]
fn vad_discards_spurious_burst() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "burst.wav", 4.0, &[(0.5, 1.5), (3.0, 3.15)]);
    let waveform = subalign::audio::Waveform::load(&path).unwrap();

    let config = VadConfig {
        engine: "energy".to_string(),
        min_speech_ms: 300,
        ..Default::default()
    };
    let mut manager = VoiceActivityManager::new(config);
    let spans = manager.detect_speech(&waveform).unwrap();
    assert_eq!(spans.len(), 1, "got {spans:?}");
    assert!((spans[0].start - 0.5).abs() < 0.05, "got {spans:?}");
}

#[test]
fn vad_drops_burst_close_to_speech() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "burst.wav", 3.0, &[(0.5, 1.5), (1.9, 2.05)]);
    let waveform = subalign::audio::Waveform::load(&path).unwrap();

    let config = VadConfig {
        engine: "energy".to_string(),
        min_speech_ms: 300,
        max_silence_ms: 500,
        ..Default::default()
    };
    let mut manager = VoiceActivityManager::new(config);
    let spans = manager.detect_speech(&waveform).unwrap();
    assert_eq!(spans.len(), 1, "got {spans:?}");
    assert!((spans[0].end - 1.5).abs() < 0.05, "burst absorbed: {spans:?}");
}

#[test]
fn vad_merges_detections_330ms_apart() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "gap.wav", 3.0, &[(0.5, 1.2), (1.53, 2.3)]);
    let waveform = subalign::audio::Waveform::load(&path).unwrap();

    let config = VadConfig {
        engine: "energy".to_string(),
        max_silence_ms: 500,
        ..Default::default()
    };
    let mut manager = VoiceActivityManager::new(config);
    let spans = manager.detect_speech(&waveform).unwrap();
    assert_eq!(spans.len(), 1, "got {spans:?}");
    assert!((spans[0].start - 0.5).abs() < 0.05, "got {spans:?}");
    assert!((spans[0].end - 2.3).abs() < 0.05, "got {spans:?}");
}

#[test]
fn refined_boundaries_stay_within_200ms() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "refine.wav", 8.0, &[(0.5, 2.0), (3.0, 4.5), (5.0, 7.0)]);

    let input = vec![
        seg(0.35, 2.15, "the first line"),
        seg(2.85, 4.62, "第二句话。"),
        seg(5.1, 6.9, "and the last one"),
    ];
    let mut pipeline = pipeline("refine");
    let output = pipeline.process(input.clone(), Some(&path)).unwrap();

    assert_eq!(output.segments.len(), input.len());
    assert!(is_ordered(&output.segments));
    for (before, after) in input.iter().zip(&output.segments) {
        assert!((after.start - before.start).abs() <= 0.2 + 1e-9, "{before:?} -> {after:?}");
        assert!((after.end - before.end).abs() <= 0.2 + 1e-9, "{before:?} -> {after:?}");
        assert!(after.timing_within_bounds(), "{after:?}");
        assert!(after.has_enhancement(TAG_REFINE));
        assert!(after.alignment_model.is_some());
    }
    assert!(output.segments[0].words.is_some());
    assert!(output.segments[1].chars.is_some());

    let refine = &output.metrics.components["refine"];
    assert!(refine.counters["max_shift_ms"] <= 200.0 + 1e-6);
}

#[test]
fn full_pipeline_drops_silence_and_keeps_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(
        dir.path(),
        "episode.wav",
        10.0,
        &[(0.5, 3.0), (3.4, 6.0), (8.0, 9.5)],
    );

    let input = vec![
        seg(0.4, 3.1, "第一句话说完了。"),
        seg(3.3, 6.1, "第二句话也说完了。"),
        seg(6.6, 7.6, "谢谢观看"),
        seg(7.9, 9.6, "最后一句。"),
    ];
    let mut pipeline = pipeline("vad,refine,split");
    let output = pipeline.process(input, Some(&path)).unwrap();

    let texts: Vec<&str> = output.segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["第一句话说完了。", "第二句话也说完了。", "最后一句。"]);
    assert!(is_ordered(&output.segments));
    for segment in &output.segments {
        assert!(segment.timing_within_bounds(), "{segment:?}");
        assert!(segment.has_enhancement(TAG_VAD));
        assert!(segment.has_enhancement(TAG_REFINE));
        assert!(segment.chars.is_some());
    }

    assert!(!output.metrics.degraded);
    assert_eq!(output.metrics.components_executed, vec!["vad", "refine", "split"]);
    assert_eq!(output.metrics.vad_engine.as_deref(), Some("energy"));
    assert_eq!(output.metrics.components["vad"].counters["segments_removed"], 1.0);

    let result = output.into_result("zh", "whisper-small", 1.25);
    assert!(result.metadata.vad_enabled);
    assert!((result.metadata.duration - 10.0).abs() < 1e-6);
    assert!(result.metadata.alignment_model.is_some());
    assert_eq!(result.stats["degraded"], 0.0);
}

// ── Split timing integrity ──────────────────────────────────────────────

fn words_match_text(segment: &EnhancedSegment) -> bool {
    segment
        .words
        .as_deref()
        .is_some_and(|words| subalign::timing::words_cover_text(&segment.text, words))
}

#[test]
fn forced_split_after_refine_keeps_words_with_their_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "long.wav", 11.0, &[(0.5, 10.5)]);
    let text = "甲乙丙丁戊己庚辛壬癸".repeat(3);

    let mut pipeline = pipeline("refine,split");
    let output = pipeline
        .process(vec![seg(0.5, 10.5, &text)], Some(&path))
        .unwrap();

    assert_eq!(output.segments.len(), 2, "{:?}", output.segments);
    for child in &output.segments {
        assert!(words_match_text(child), "words do not match text: {child:?}");
        assert!(child.timing_within_bounds(), "{child:?}");
    }
    let total: usize = output.segments.iter().map(|s| s.char_count()).sum();
    assert_eq!(total, 30);
    assert!(is_ordered(&output.segments));
}

#[test]
fn pause_hint_split_never_cuts_a_word() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone_wav(dir.path(), "pause.wav", 10.0, &[(0.0, 3.0), (3.6, 10.0)]);
    let text = "alpha beta gamma delta epsilon zeta";

    let mut pipeline = pipeline("vad,refine,split");
    let output = pipeline
        .process(vec![seg(0.2, 9.8, text)], Some(&path))
        .unwrap();

    assert!(output.segments.len() >= 2, "{:?}", output.segments);
    let original: Vec<&str> = text.split_whitespace().collect();
    for child in &output.segments {
        assert!(words_match_text(child), "words do not match text: {child:?}");
        assert!(
            child.text.split_whitespace().all(|w| original.contains(&w)),
            "word cut in half: {:?}",
            child.text
        );
    }
    let rejoined: Vec<&str> = output.segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(rejoined.join(" "), text);
}
