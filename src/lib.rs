//! subalign - subtitle-ready post-processing for speech recognition output
//!
//! Drops non-speech segments, snaps boundaries to audio, splits and merges
//! segments to subtitle length, and measures the quality of the result.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod segment;
pub mod text;
pub mod timing;
pub mod vad;

// Data model
pub use segment::{
    CharTiming, EnhancedSegment, Segment, TranscriptionMetadata, TranscriptionResult, WordTiming,
};

// Pipeline
pub use pipeline::{ComponentError, Enhancer, Pipeline, PipelineMetrics, PipelineOutput};

// Quality
pub use quality::{BaselineComparison, BaselineRecord, QualityReport, QualityValidator};

// Error handling
pub use error::{Result, SubalignError};

// Config
pub use config::{Config, RequestOverrides};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
