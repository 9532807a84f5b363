//! Layered configuration.
//!
//! Priority, applied identically to every component:
//! per-request overrides > config file / environment > built-in defaults.

use crate::defaults;
use crate::error::{Result, SubalignError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub vad: VadConfig,
    pub refine: RefineConfig,
    pub split: SplitConfig,
    pub quality: QualityConfig,
}

/// Which components run, and the process-wide kill switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Kill switch. When false the pipeline returns its input unchanged.
    pub enabled: bool,
    /// Comma-separated component order, e.g. "vad,refine,split" or "none".
    pub components: String,
    /// Language hint ("auto" detects CJK from the text).
    pub language: String,
}

/// Voice activity detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// "auto", "silero" or "energy".
    pub engine: String,
    /// Speech probability threshold for the model engine (0.0 to 1.0).
    pub threshold: f32,
    /// Aggressiveness of the frame engine (0 to 3).
    pub aggressiveness: u8,
    /// Segments inside a silence longer than this are dropped.
    pub min_silence_ms: u32,
    /// Speech spans shorter than this are discarded.
    pub min_speech_ms: u32,
    /// Speech spans separated by at most this much silence are merged.
    pub max_silence_ms: u32,
    /// Path to the Silero ONNX model.
    pub model_path: Option<PathBuf>,
}

/// Boundary refinement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefineConfig {
    /// Half-width of the search window, also the maximum boundary shift.
    pub search_window_ms: u32,
    pub frame_length: usize,
    pub hop_length: usize,
    pub default_word_score: f32,
    pub default_char_score: f32,
}

/// Splitting and merging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitConfig {
    pub max_duration: f64,
    pub min_duration: f64,
    pub max_chars: usize,
    /// Largest gap (seconds) between merge candidates.
    pub merge_gap: f64,
    /// Estimated speaking time per CJK character.
    pub seconds_per_char: f64,
    pub merge_enabled: bool,
}

/// Quality validator thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub low_confidence_threshold: f32,
    pub ideal_min_duration: f64,
    pub ideal_max_duration: f64,
    pub ideal_max_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            components: defaults::DEFAULT_PIPELINE.to_string(),
            language: defaults::AUTO_LANGUAGE.to_string(),
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            engine: defaults::VAD_ENGINE.to_string(),
            threshold: defaults::VAD_THRESHOLD,
            aggressiveness: defaults::VAD_AGGRESSIVENESS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            max_silence_ms: defaults::MAX_SILENCE_MS,
            model_path: None,
        }
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            search_window_ms: defaults::SEARCH_WINDOW_MS,
            frame_length: defaults::FRAME_LENGTH,
            hop_length: defaults::HOP_LENGTH,
            default_word_score: defaults::DEFAULT_WORD_SCORE,
            default_char_score: defaults::DEFAULT_CHAR_SCORE,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_duration: defaults::MAX_DURATION_SECS,
            min_duration: defaults::MIN_DURATION_SECS,
            max_chars: defaults::MAX_CHARS,
            merge_gap: defaults::MERGE_GAP_SECS,
            seconds_per_char: defaults::SECONDS_PER_CHAR,
            merge_enabled: true,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: defaults::LOW_CONFIDENCE_THRESHOLD,
            ideal_min_duration: defaults::MIN_DURATION_SECS,
            ideal_max_duration: defaults::MAX_DURATION_SECS,
            ideal_max_chars: defaults::MAX_CHARS,
        }
    }
}

/// Per-request settings. `None` leaves the process-wide value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOverrides {
    pub enabled: Option<bool>,
    pub components: Option<String>,
    pub language: Option<String>,
    pub vad_engine: Option<String>,
    pub vad_threshold: Option<f32>,
    pub vad_aggressiveness: Option<u8>,
    pub min_silence_ms: Option<u32>,
    pub min_speech_ms: Option<u32>,
    pub max_silence_ms: Option<u32>,
    pub search_window_ms: Option<u32>,
    pub max_duration: Option<f64>,
    pub max_chars: Option<usize>,
    pub low_confidence_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SubalignError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => SubalignError::Io(e),
        })?;
        toml::from_str(&contents).map_err(|e| SubalignError::ConfigParse {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Load configuration from a file, or return defaults if it doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SubalignError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SUBALIGN_PIPELINE → pipeline.components
    /// - SUBALIGN_PIPELINE_ENABLED → pipeline.enabled (kill switch)
    /// - SUBALIGN_LANGUAGE → pipeline.language
    /// - SUBALIGN_VAD_ENGINE → vad.engine
    /// - SUBALIGN_VAD_MODEL → vad.model_path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(components) = std::env::var("SUBALIGN_PIPELINE")
            && !components.is_empty()
        {
            self.pipeline.components = components;
        }

        if let Ok(enabled) = std::env::var("SUBALIGN_PIPELINE_ENABLED")
            && let Some(flag) = parse_flag(&enabled)
        {
            self.pipeline.enabled = flag;
        }

        if let Ok(language) = std::env::var("SUBALIGN_LANGUAGE")
            && !language.is_empty()
        {
            self.pipeline.language = language;
        }

        if let Ok(engine) = std::env::var("SUBALIGN_VAD_ENGINE")
            && !engine.is_empty()
        {
            self.vad.engine = engine;
        }

        if let Ok(model) = std::env::var("SUBALIGN_VAD_MODEL")
            && !model.is_empty()
        {
            self.vad.model_path = Some(PathBuf::from(model));
        }

        self
    }

    /// Apply per-request overrides on top of the process-wide configuration.
    pub fn with_request_overrides(mut self, overrides: &RequestOverrides) -> Self {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut self.pipeline.enabled, &overrides.enabled);
        set(&mut self.pipeline.components, &overrides.components);
        set(&mut self.pipeline.language, &overrides.language);
        set(&mut self.vad.engine, &overrides.vad_engine);
        set(&mut self.vad.threshold, &overrides.vad_threshold);
        set(&mut self.vad.aggressiveness, &overrides.vad_aggressiveness);
        set(&mut self.vad.min_silence_ms, &overrides.min_silence_ms);
        set(&mut self.vad.min_speech_ms, &overrides.min_speech_ms);
        set(&mut self.vad.max_silence_ms, &overrides.max_silence_ms);
        set(&mut self.refine.search_window_ms, &overrides.search_window_ms);
        set(&mut self.split.max_duration, &overrides.max_duration);
        set(&mut self.split.max_chars, &overrides.max_chars);
        set(
            &mut self.quality.low_confidence_threshold,
            &overrides.low_confidence_threshold,
        );
        self
    }

    /// Reject out-of-range values. Errors name the offending field.
    pub fn validate(&self) -> Result<()> {
        crate::pipeline::component::parse_components(&self.pipeline.components)?;
        self.vad.validate()?;
        self.refine.validate()?;
        self.split.validate()?;
        self.quality.validate()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/subalign/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("subalign")
            .join("config.toml")
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn check_unit(key: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SubalignError::invalid(
            key,
            format!("must be within 0.0..=1.0, got {value}"),
        ));
    }
    Ok(())
}

fn check_positive(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SubalignError::invalid(
            key,
            format!("must be a positive number, got {value}"),
        ));
    }
    Ok(())
}

impl VadConfig {
    pub fn validate(&self) -> Result<()> {
        self.engine
            .parse::<crate::vad::EngineChoice>()
            .map_err(|message| SubalignError::invalid("vad.engine", message))?;
        check_unit("vad.threshold", self.threshold)?;
        if self.aggressiveness > 3 {
            return Err(SubalignError::invalid(
                "vad.aggressiveness",
                format!("must be within 0..=3, got {}", self.aggressiveness),
            ));
        }
        Ok(())
    }
}

impl RefineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search_window_ms == 0 || self.search_window_ms > 2000 {
            return Err(SubalignError::invalid(
                "refine.search_window_ms",
                format!("must be within 1..=2000, got {}", self.search_window_ms),
            ));
        }
        if self.hop_length == 0 {
            return Err(SubalignError::invalid(
                "refine.hop_length",
                "must be greater than zero",
            ));
        }
        if self.frame_length < self.hop_length {
            return Err(SubalignError::invalid(
                "refine.frame_length",
                format!(
                    "must be at least hop_length ({}), got {}",
                    self.hop_length, self.frame_length
                ),
            ));
        }
        check_unit("refine.default_word_score", self.default_word_score)?;
        check_unit("refine.default_char_score", self.default_char_score)?;
        Ok(())
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("split.max_duration", self.max_duration)?;
        check_positive("split.min_duration", self.min_duration)?;
        check_positive("split.seconds_per_char", self.seconds_per_char)?;
        if self.min_duration >= self.max_duration {
            return Err(SubalignError::invalid(
                "split.min_duration",
                format!(
                    "must be less than max_duration ({}), got {}",
                    self.max_duration, self.min_duration
                ),
            ));
        }
        if self.max_chars < 2 {
            return Err(SubalignError::invalid(
                "split.max_chars",
                format!("must be at least 2, got {}", self.max_chars),
            ));
        }
        if !self.merge_gap.is_finite() || self.merge_gap < 0.0 {
            return Err(SubalignError::invalid(
                "split.merge_gap",
                format!("must not be negative, got {}", self.merge_gap),
            ));
        }
        Ok(())
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit(
            "quality.low_confidence_threshold",
            self.low_confidence_threshold,
        )?;
        check_positive("quality.ideal_max_duration", self.ideal_max_duration)?;
        if self.ideal_min_duration < 0.0 || self.ideal_min_duration >= self.ideal_max_duration {
            return Err(SubalignError::invalid(
                "quality.ideal_min_duration",
                format!(
                    "must be within 0..ideal_max_duration ({}), got {}",
                    self.ideal_max_duration, self.ideal_min_duration
                ),
            ));
        }
        if self.ideal_max_chars == 0 {
            return Err(SubalignError::invalid(
                "quality.ideal_max_chars",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_subalign_env() {
        for key in [
            "SUBALIGN_PIPELINE",
            "SUBALIGN_PIPELINE_ENABLED",
            "SUBALIGN_LANGUAGE",
            "SUBALIGN_VAD_ENGINE",
            "SUBALIGN_VAD_MODEL",
        ] {
            remove_env(key);
        }
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert!(config.pipeline.enabled);
        assert_eq!(config.pipeline.components, "vad,refine,split");
        assert_eq!(config.vad.engine, "auto");
        assert_eq!(config.vad.min_speech_ms, 300);
        assert_eq!(config.vad.max_silence_ms, 500);
        assert_eq!(config.vad.min_silence_ms, 1000);
        assert_eq!(config.refine.search_window_ms, 200);
        assert_eq!(config.refine.frame_length, 2048);
        assert_eq!(config.refine.hop_length, 512);
        assert_eq!(config.split.max_duration, 7.0);
        assert_eq!(config.split.max_chars, 200);
        assert_eq!(config.quality.low_confidence_threshold, 0.7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [pipeline]
            components = "refine,split"

            [split]
            max_duration = 6.0
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.pipeline.components, "refine,split");
        assert_eq!(config.split.max_duration, 6.0);
        assert_eq!(config.split.max_chars, 200);
        assert_eq!(config.vad, VadConfig::default());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[vad\nengine = \"broken").unwrap();

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(SubalignError::ConfigParse { .. })
        ));
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let missing = Path::new("/tmp/nonexistent_subalign_config_12345.toml");
        let err = Config::load(missing).unwrap_err();
        assert!(
            matches!(err, SubalignError::ConfigFileNotFound { ref path } if path.contains("12345")),
            "got {err:?}"
        );
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_subalign_config_12345.toml");
        assert_eq!(Config::load_or_default(missing).unwrap(), Config::default());
    }

    #[test]
    fn test_env_overrides_apply_and_ignore_empty() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_subalign_env();

        set_env("SUBALIGN_PIPELINE", "split");
        set_env("SUBALIGN_PIPELINE_ENABLED", "false");
        set_env("SUBALIGN_VAD_ENGINE", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.pipeline.components, "split");
        assert!(!config.pipeline.enabled);
        assert_eq!(config.vad.engine, "auto");

        clear_subalign_env();
    }

    #[test]
    fn test_env_kill_switch_ignores_garbage() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_subalign_env();

        set_env("SUBALIGN_PIPELINE_ENABLED", "maybe");
        let config = Config::default().with_env_overrides();
        assert!(config.pipeline.enabled);

        clear_subalign_env();
    }

    #[test]
    fn test_request_overrides_take_precedence() {
        let process_wide = Config {
            pipeline: PipelineSettings {
                components: "vad,split".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let overrides = RequestOverrides {
            components: Some("refine".to_string()),
            max_duration: Some(5.0),
            ..Default::default()
        };

        let config = process_wide.with_request_overrides(&overrides);
        assert_eq!(config.pipeline.components, "refine");
        assert_eq!(config.split.max_duration, 5.0);
        // Untouched fields keep the process-wide value
        assert_eq!(config.split.max_chars, 200);
    }

    #[test]
    fn test_validate_names_offending_field() {
        let mut config = Config::default();
        config.vad.threshold = 1.5;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("vad.threshold"), "got: {err}");

        let mut config = Config::default();
        config.vad.aggressiveness = 4;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("vad.aggressiveness"), "got: {err}");

        let mut config = Config::default();
        config.split.min_duration = 8.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("split.min_duration"), "got: {err}");

        let mut config = Config::default();
        config.refine.hop_length = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("refine.hop_length"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_unknown_engine_and_component() {
        let mut config = Config::default();
        config.vad.engine = "webrtc2".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("vad.engine"), "got: {err}");

        let mut config = Config::default();
        config.pipeline.components = "vad,xyz".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert_eq!(
            err,
            "unknown pipeline component 'xyz'; valid options: vad, refine, split"
        );
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("subalign"));
        assert!(path_str.ends_with("config.toml"));
    }
}
