use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use subalign::cli::{Cli, Commands, ConfigAction, ProcessArgs};
use subalign::config::Config;
use subalign::pipeline::{Pipeline, PipelineMetrics};
use subalign::quality::{BaselineComparison, BaselineRecord, QualityReport, QualityValidator};
use subalign::segment::{EnhancedSegment, SegmentsInput, TranscriptionResult, UNKNOWN_MODEL};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process(args) => {
            let (result, metrics) = run_pipeline(&config, &args)?;
            if !cli.quiet {
                print_result_summary(&result, &metrics);
            }
            write_json(args.output.as_deref(), &result)?;
        }
        Commands::Validate {
            input,
            reference,
            baseline,
            output,
        } => {
            let validator = QualityValidator::new(config.quality.clone())?;
            let segments = read_segments(&input)?;
            let reference = read_reference(reference.as_deref())?;
            let report = validator.validate(&segments, reference.as_deref(), None);
            if !cli.quiet {
                print_report_summary(&report);
            }
            if let Some(path) = baseline {
                let record = BaselineRecord::load(&path)
                    .with_context(|| format!("Failed to load baseline {}", path.display()))?;
                let comparison = validator.compare_baseline(&record, &report);
                print_comparison(&comparison);
            }
            write_json(output.as_deref(), &report)?;
        }
        Commands::Compare { input, reference } => {
            let validator = QualityValidator::new(config.quality.clone())?;
            let segments = read_segments(&input)?;
            let reference = read_reference(reference.as_deref())?;
            let comparison = validator.compare_models(&segments, reference.as_deref());
            if !cli.quiet {
                for (model, report) in &comparison.models {
                    eprintln!("{}", model.bold());
                    print_report_summary(report);
                }
                if let Some((model, cer)) = comparison.best_by_cer() {
                    eprintln!("Lowest CER: {} ({:.3})", model.green(), cer);
                }
                if let Some((model, pct)) = comparison.best_by_compliance() {
                    eprintln!("Best compliance: {} ({:.1}%)", model.green(), pct);
                }
            }
            write_json(None, &comparison)?;
        }
        Commands::Baseline {
            name,
            run,
            reference,
        } => {
            let Some(path) = run.output.clone() else {
                bail!("baseline needs --output <FILE>");
            };
            let reference = read_reference(reference.as_deref())?;
            let (result, _) = run_pipeline(&config, &run)?;
            let audio = run
                .audio
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let mut record = BaselineRecord::new(name, audio, result.segments)
                .with_metadata("model", result.metadata.model_name.into())
                .with_metadata("language", result.metadata.language.into())
                .with_metadata("vad_enabled", result.metadata.vad_enabled.into());
            if let Some(reference) = reference {
                record = record.with_reference(reference);
            }
            record.save(&path)?;
            if !cli.quiet {
                eprintln!("{} {}", "Baseline saved:".green(), path.display());
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                let path = cli.config.clone().unwrap_or_else(Config::default_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration file and apply environment overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

fn run_pipeline(
    config: &Config,
    args: &ProcessArgs,
) -> Result<(TranscriptionResult, PipelineMetrics)> {
    let segments = read_segments(&args.segments)?;
    let model = args
        .model
        .clone()
        .or_else(|| segments.first().map(|s| s.source_model.clone()))
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string());

    let mut pipeline = Pipeline::for_request(config, &args.overrides())?;
    let language = pipeline.config().pipeline.language.clone();

    let started = Instant::now();
    let output = pipeline.process(segments, args.audio.as_deref())?;
    let metrics = output.metrics.clone();
    let result = output.into_result(&language, &model, started.elapsed().as_secs_f64());
    Ok((result, metrics))
}

fn read_segments(path: &Path) -> Result<Vec<EnhancedSegment>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let input: SegmentsInput = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a segment list or result", path.display()))?;
    Ok(input.into_segments())
}

fn read_reference(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
    })
    .transpose()
}

/// Write pretty JSON to `path`, or to stdout.
fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_result_summary(result: &TranscriptionResult, metrics: &PipelineMetrics) {
    let meta = &result.metadata;
    eprintln!(
        "{} {} segments, {:.1}s audio, processed in {:.2}s",
        "Done:".green().bold(),
        result.segments.len(),
        meta.duration,
        meta.processing_time
    );
    if let Some((component, error)) = metrics.failure() {
        eprintln!(
            "{} {} failed ({}); output is from the last good stage",
            "Degraded:".yellow().bold(),
            component,
            error
        );
    }
}

fn print_report_summary(report: &QualityReport) {
    eprintln!("  segments: {}", report.segment_count);
    if let Some(accuracy) = &report.accuracy {
        if let Some(cer) = accuracy.cer {
            eprintln!("  CER: {:.3}", cer);
        }
        if let Some(wer) = accuracy.wer {
            eprintln!("  WER: {:.3}", wer);
        }
    }
    if let Some(stats) = &report.segments {
        let pct = format!("{:.1}%", stats.compliance_pct);
        let pct = if stats.compliance_pct >= 95.0 {
            pct.green().to_string()
        } else {
            pct.yellow().to_string()
        };
        eprintln!(
            "  compliance: {} (duration {:.1}%, chars {:.1}%)",
            pct, stats.duration_compliance_pct, stats.char_compliance_pct
        );
        eprintln!(
            "  duration: mean {:.2}s, p95 {:.2}s",
            stats.duration.mean, stats.duration.p95
        );
    }
    if let Some(confidence) = &report.confidence {
        eprintln!(
            "  confidence: mean {:.3}, {} below threshold",
            confidence.mean, confidence.below_threshold
        );
    }
}

fn print_comparison(comparison: &BaselineComparison) {
    let verdict = if comparison.regression {
        "regression".red().bold().to_string()
    } else if comparison.improvement {
        "improvement".green().bold().to_string()
    } else {
        "no significant change".to_string()
    };
    eprintln!("Against '{}': {}", comparison.baseline_name, verdict);
    for note in &comparison.notes {
        eprintln!("  - {}", note);
    }
}
