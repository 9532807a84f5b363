//! Command-line interface for subalign
//!
//! Provides argument parsing using clap derive macros.

use crate::config::RequestOverrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Subtitle-ready post-processing for speech recognition output
#[derive(Parser, Debug)]
#[command(
    name = "subalign",
    version,
    about = "Subtitle-ready post-processing for speech recognition output"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "subalign=warn",
            (false, 0) => "subalign=info",
            (false, 1) => "subalign=debug",
            (false, _) => "subalign=trace",
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the enhancement pipeline over recognizer segments
    Process(ProcessArgs),

    /// Compute quality metrics for a transcription result
    Validate {
        /// Transcription result or segment array (JSON)
        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,

        /// Reference transcript (plain text) for CER/WER
        #[arg(long, value_name = "FILE")]
        reference: Option<PathBuf>,

        /// Baseline record to compare against
        #[arg(long, value_name = "FILE")]
        baseline: Option<PathBuf>,

        /// Write the quality report here (JSON)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Compare recognizers side by side, grouped by source model
    Compare {
        /// Transcription result or segment array (JSON)
        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,

        /// Reference transcript (plain text) for CER/WER
        #[arg(long, value_name = "FILE")]
        reference: Option<PathBuf>,
    },

    /// Record a baseline from a pipeline run
    Baseline {
        /// Baseline name
        #[arg(long, value_name = "NAME")]
        name: String,

        #[command(flatten)]
        run: ProcessArgs,

        /// Reference transcript stored with the baseline
        #[arg(long, value_name = "FILE")]
        reference: Option<PathBuf>,
    },

    /// Show effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Inputs and per-request overrides for one pipeline run.
#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Recognizer segments: a JSON array or a transcription result
    #[arg(long, short = 's', value_name = "FILE")]
    pub segments: PathBuf,

    /// Source audio (absolute path to a WAV file)
    #[arg(long, short = 'a', value_name = "WAV")]
    pub audio: Option<PathBuf>,

    /// Component order, e.g. "vad,refine,split" or "none"
    #[arg(long, value_name = "ORDER")]
    pub pipeline: Option<String>,

    /// Language hint (default: auto)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Recognizer name recorded in the result metadata
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// VAD engine (auto, silero, energy)
    #[arg(long, value_name = "ENGINE")]
    pub vad_engine: Option<String>,

    /// Maximum segment duration in seconds
    #[arg(long, value_name = "SECONDS")]
    pub max_duration: Option<f64>,

    /// Maximum characters per segment
    #[arg(long, value_name = "N")]
    pub max_chars: Option<usize>,

    /// Bypass the pipeline entirely
    #[arg(long)]
    pub disable: bool,

    /// Write output here instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl ProcessArgs {
    pub fn overrides(&self) -> RequestOverrides {
        RequestOverrides {
            enabled: self.disable.then_some(false),
            components: self.pipeline.clone(),
            language: self.language.clone(),
            vad_engine: self.vad_engine.clone(),
            max_duration: self.max_duration,
            max_chars: self.max_chars,
            ..Default::default()
        }
    }
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
