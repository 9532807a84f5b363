//! Error types for subalign.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubalignError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("unknown pipeline component '{name}'; valid options: {valid}")]
    UnknownComponent { name: String, valid: String },

    #[error("pipeline component '{name}' is listed more than once")]
    DuplicateComponent { name: String },

    // Audio resource errors
    #[error("Unsafe audio path {path}: {reason}")]
    AudioPathInvalid { path: String, reason: String },

    #[error("Audio file not found at {path}")]
    AudioNotFound { path: String },

    #[error("Failed to decode audio: {message}")]
    AudioDecode { message: String },

    #[error("Audio is required by component '{component}' but no audio path was given")]
    AudioRequired { component: String },

    #[error("Voice activity detection failed: {message}")]
    Vad { message: String },

    // Data errors
    #[error("Invalid segment at index {index}: {message}")]
    InvalidSegment { index: usize, message: String },

    // Baseline persistence
    #[error("Baseline error: {message}")]
    Baseline { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubalignError {
    /// Shorthand for a field-specific configuration error.
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::ConfigInvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by configuration, as opposed to audio or data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigFileNotFound { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigInvalidValue { .. }
                | Self::UnknownComponent { .. }
                | Self::DuplicateComponent { .. }
        )
    }

    /// True for errors caused by a missing, unreadable or unsafe audio resource.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            Self::AudioPathInvalid { .. }
                | Self::AudioNotFound { .. }
                | Self::AudioDecode { .. }
                | Self::AudioRequired { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SubalignError>;
