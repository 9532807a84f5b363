//! Default configuration constants for subalign.
//!
//! Every built-in default lives here so the config layer, the components and
//! the tests agree on the same numbers.

/// Working sample rate in Hz. All audio is resampled to this on load.
pub const SAMPLE_RATE: u32 = 16000;

/// Default pipeline component order.
pub const DEFAULT_PIPELINE: &str = "vad,refine,split";

/// Pipeline string that disables every component.
pub const PIPELINE_NONE: &str = "none";

// Voice activity detection

/// Default VAD engine selection. "auto" prefers the model engine when available.
pub const VAD_ENGINE: &str = "auto";

/// Speech probability threshold for the model-based engine (0.0 to 1.0).
pub const VAD_THRESHOLD: f32 = 0.5;

/// Aggressiveness of the frame-based engine (0 = lenient, 3 = strict).
pub const VAD_AGGRESSIVENESS: u8 = 2;

/// Frame size of the frame-based engine in milliseconds.
pub const VAD_FRAME_MS: u32 = 30;

/// Silence longer than this swallows any transcribed segment lying inside it.
pub const MIN_SILENCE_MS: u32 = 1000;

/// Detected speech shorter than this is treated as a noise burst.
pub const MIN_SPEECH_MS: u32 = 300;

/// Speech spans separated by at most this much silence are merged.
pub const MAX_SILENCE_MS: u32 = 500;

// Boundary refinement

/// Half-width of the boundary search window. Also the maximum allowed shift.
pub const SEARCH_WINDOW_MS: u32 = 200;

/// RMS frame length in samples (~128 ms at 16 kHz).
pub const FRAME_LENGTH: usize = 2048;

/// RMS hop length in samples (~32 ms at 16 kHz).
pub const HOP_LENGTH: usize = 512;

/// Confidence assigned to word timings derived without a model score.
pub const DEFAULT_WORD_SCORE: f32 = 0.85;

/// Confidence assigned to character timings derived without a model score.
pub const DEFAULT_CHAR_SCORE: f32 = 0.8;

/// Alignment tag for timings computed by proportional distribution.
pub const ALIGNMENT_PROPORTIONAL: &str = "energy_proportional";

/// Alignment tag for timings supplied by the recognizer.
pub const ALIGNMENT_MODEL_PROVIDED: &str = "model_provided";

// Splitting and merging

/// Longest subtitle segment in seconds.
pub const MAX_DURATION_SECS: f64 = 7.0;

/// Shortest comfortable subtitle segment in seconds.
pub const MIN_DURATION_SECS: f64 = 1.0;

/// Longest subtitle segment in characters.
pub const MAX_CHARS: usize = 200;

/// Estimated speaking time per CJK character, in seconds.
pub const SECONDS_PER_CHAR: f64 = 0.4;

/// Largest gap in seconds between two segments that still counts as adjacent.
pub const MERGE_GAP_SECS: f64 = 0.1;

// Quality validation

/// Scores below this count as low confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Compliance gain (in percentage points) that counts as a measurable improvement.
pub const IMPROVEMENT_COMPLIANCE_GAIN: f64 = 20.0;

/// Relative error-rate reduction that counts as a measurable improvement.
pub const IMPROVEMENT_ERROR_RATE_REDUCTION: f64 = 0.2;

/// Error-rate increase (absolute) tolerated before flagging a regression.
pub const REGRESSION_ERROR_RATE_TOLERANCE: f64 = 0.01;

/// Compliance drop (percentage points) tolerated before flagging a regression.
pub const REGRESSION_COMPLIANCE_TOLERANCE: f64 = 5.0;

/// Mean confidence drop tolerated before flagging a regression.
pub const REGRESSION_CONFIDENCE_TOLERANCE: f64 = 0.05;

/// Baseline record format version.
pub const BASELINE_VERSION: &str = "1.0";

/// Language value that triggers script detection from the text itself.
pub const AUTO_LANGUAGE: &str = "auto";
