//! nodulescan CLI
//!
//! Classifies chest X-ray images as benign, malignant or non-nodule using a
//! pre-trained ONNX model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

use nodulescan::inference::benchmark::{run_benchmark, BenchmarkConfig};
use nodulescan::model::artifact::{self, ZIPPED_MODEL_ENTRY};
use nodulescan::model::config::MODEL_PATH_ENV;
use nodulescan::utils::format_millis;
use nodulescan::utils::logging::{init_logging, LogConfig, LogLevel, ProgressLogger};
use nodulescan::{
    BatchSummary, ClassLabel, ClassifierService, ClinicalFinding, EngineConfig, InferenceEngine,
    OutputActivation, PredictionReport,
};

/// Image extensions picked up when walking directories
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Confidence at which a prediction counts as high confidence in summaries
const HIGH_CONFIDENCE: f32 = 0.9;

/// Chest X-ray nodule classification
#[derive(Parser, Debug)]
#[command(name = "nodulescan")]
#[command(version)]
#[command(about = "Classify chest X-rays as benign, malignant or non-nodule", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Path to the ONNX model
    #[arg(short, long, global = true, env = MODEL_PATH_ENV)]
    model: Option<PathBuf>,

    /// JSON engine configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify images or directories of images
    Predict {
        /// Image files or directories (searched for .jpg/.jpeg/.png)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Apply softmax to the raw network output
        #[arg(long, default_value = "false")]
        softmax: bool,

        /// Print one JSON report per line instead of text
        #[arg(long, default_value = "false")]
        json: bool,

        /// Maximum number of predictions in flight
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Per-attempt deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Inspect the model file and try to load it
    CheckModel,

    /// Extract the ONNX graph from a zipped model export
    ExtractModel {
        /// Zip archive produced by the model export
        archive: PathBuf,

        /// Archive entry holding the graph
        #[arg(long, default_value = ZIPPED_MODEL_ENTRY)]
        entry: String,

        /// Where to write the graph (defaults to the configured model path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Benchmark prediction latency on one image
    Benchmark {
        /// Image to classify repeatedly
        image: PathBuf,

        /// Number of timed iterations
        #[arg(short, long, default_value = "100")]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "10")]
        warmup: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail unless P95 latency is at or below this many milliseconds
        #[arg(long)]
        target_ms: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }

    let _ = init_logging(&log_config);

    let config = resolve_config(cli.config.as_deref(), cli.model)?;

    match cli.command {
        Commands::Predict {
            inputs,
            softmax,
            json,
            concurrency,
            timeout_ms,
        } => {
            let config = if softmax {
                config.with_activation(OutputActivation::Softmax)
            } else {
                config
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(cmd_predict(
                config,
                &inputs,
                json,
                concurrency,
                timeout_ms.map(Duration::from_millis),
            ))?;
        }

        Commands::CheckModel => {
            cmd_check_model(config)?;
        }

        Commands::ExtractModel {
            archive,
            entry,
            output,
        } => {
            let output = output.unwrap_or_else(|| config.model_path.clone());
            cmd_extract_model(&archive, &entry, &output)?;
        }

        Commands::Benchmark {
            image,
            iterations,
            warmup,
            output,
            target_ms,
        } => {
            cmd_benchmark(config, &image, iterations, warmup, output, target_ms)?;
        }
    }

    Ok(())
}

/// Config file (or defaults), then environment, then `--model`
fn resolve_config(path: Option<&Path>, model: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    if let Some(model) = model {
        config.model_path = model;
    }
    config.validate()?;
    Ok(config)
}

/// Expand files and directories into a sorted list of image paths
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && has_image_extension(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            if found.is_empty() {
                warn!(dir = %input.display(), "No images found");
            }
            images.extend(found);
        } else if input.is_file() {
            images.push(input.clone());
        } else {
            bail!("Input path not found: {}", input.display());
        }
    }

    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

async fn cmd_predict(
    config: EngineConfig,
    inputs: &[PathBuf],
    json: bool,
    concurrency: usize,
    timeout: Option<Duration>,
) -> Result<()> {
    let images = collect_images(inputs)?;
    if images.is_empty() {
        bail!("No images to classify");
    }

    if !json {
        println!("{}", "Prediction Configuration:".cyan().bold());
        println!("  Model:       {}", config.model_path.display());
        println!("  Activation:  {:?}", config.output_activation);
        println!("  Images:      {}", images.len());
        println!();
    }

    let mut service = ClassifierService::new(Arc::new(InferenceEngine::onnx(config)));
    if let Some(timeout) = timeout {
        service = service.with_timeout(timeout);
    }

    service.initialize().await.context("Failed to load model")?;
    if let Some(session) = service.engine().session_info() {
        info!(input = %session.input_name, output = %session.output_name, "Model ready");
    }

    let concurrency = concurrency.max(1);
    let mut progress = ProgressLogger::new("Predicting", images.len());
    let mut tasks = JoinSet::new();
    let mut outcomes = Vec::with_capacity(images.len());

    for (index, path) in images.into_iter().enumerate() {
        while tasks.len() >= concurrency {
            if let Some(joined) = tasks.join_next().await {
                let outcome = joined.context("Prediction task panicked")?;
                progress.record(outcome_ok(&outcome));
                outcomes.push(outcome);
            }
        }

        let service = service.clone();
        tasks.spawn(async move {
            let source = path.display().to_string();
            let start = Instant::now();
            let result = match tokio::fs::read(&path).await {
                Ok(bytes) => service
                    .predict(bytes)
                    .await
                    .map(|prediction| {
                        PredictionReport::new(source.clone(), &prediction, start.elapsed())
                    })
                    .map_err(|e| e.to_string()),
                Err(e) => Err(format!("Failed to read file: {}", e)),
            };
            (index, source, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.context("Prediction task panicked")?;
        progress.record(outcome_ok(&outcome));
        outcomes.push(outcome);
    }
    progress.finish();

    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for (_, source, result) in outcomes {
        match result {
            Ok(report) => {
                if json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    print_report(&report);
                }
                reports.push(report);
            }
            Err(reason) => {
                failed += 1;
                if json {
                    println!("{}", serde_json::json!({ "source": source, "error": reason }));
                } else {
                    println!("{} {}: {}", "Error:".red(), source, reason);
                    println!();
                }
            }
        }
    }

    if !json {
        let summary = BatchSummary::from_reports(&reports, failed, HIGH_CONFIDENCE);
        println!("{}", summary.to_string().green());
    }

    Ok(())
}

type Outcome = (usize, String, std::result::Result<PredictionReport, String>);

fn outcome_ok(outcome: &Outcome) -> bool {
    outcome.2.is_ok()
}

fn print_report(report: &PredictionReport) {
    let finding = match report.result {
        ClinicalFinding::Normal => report.result.to_string().green().bold(),
        ClinicalFinding::Abnormal => report.result.to_string().red().bold(),
    };

    println!("{} {}", "Image:".cyan(), report.source);
    println!("  Result:     {} ({})", finding, report.category);
    println!("  Confidence: {:.1}%", report.confidence * 100.0);
    println!("  Time:       {}", format_millis(report.inference_time_ms));
    for label in ClassLabel::ALL {
        println!("    {:<11} {:.4}", label.as_str(), report.probabilities[label.index()]);
    }
    println!();
}

fn cmd_check_model(config: EngineConfig) -> Result<()> {
    let report = artifact::inspect(&config.model_path)?;
    println!("{}", "Model Artifact:".cyan().bold());
    println!("{}", report);

    if let Err(e) = artifact::ensure_loadable(&report) {
        println!("{} {}", "Error:".red(), e);
        return Err(e.into());
    }

    let engine = InferenceEngine::onnx(config);
    let start = Instant::now();
    engine.initialize().context("Model failed to load")?;
    info!("Model loaded in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    if let Some(info) = engine.session_info() {
        println!("{}", "Model loaded successfully".green().bold());
        println!("  Input:  {}", info.input_name);
        println!("  Output: {}", info.output_name);
    }

    Ok(())
}

fn cmd_extract_model(archive: &Path, entry: &str, output: &Path) -> Result<()> {
    let report = artifact::extract_model(archive, entry, output)
        .with_context(|| format!("Failed to extract model from {}", archive.display()))?;

    println!("{}", "Extracted Model:".cyan().bold());
    println!("{}", report);
    println!(
        "{} run `nodulescan check-model --model {}` to verify it loads",
        "Next:".green(),
        output.display()
    );

    Ok(())
}

fn cmd_benchmark(
    config: EngineConfig,
    image: &Path,
    iterations: usize,
    warmup: usize,
    output: Option<PathBuf>,
    target_ms: Option<f64>,
) -> Result<()> {
    if iterations == 0 {
        bail!("--iterations must be at least 1");
    }

    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image {}", image.display()))?;

    println!("{}", "Benchmark Configuration:".cyan().bold());
    println!("  Model:      {}", config.model_path.display());
    println!("  Image:      {}", image.display());
    println!("  Iterations: {}", iterations);
    println!("  Warmup:     {}", warmup);
    println!();

    let engine = InferenceEngine::onnx(config);
    let bench_config = BenchmarkConfig {
        warmup_iterations: warmup,
        iterations,
        verbose: output.is_some(),
        output_path: output,
    };

    let result = run_benchmark(&engine, &bytes, bench_config)?;
    println!("{}", result);

    if let Some(target) = target_ms {
        if !result.meets_latency_target(target) {
            println!(
                "{} P95 {} exceeds target {}",
                "FAIL:".red().bold(),
                format_millis(result.latency.p95_ms),
                format_millis(target)
            );
            bail!("Latency target of {}ms not met", target);
        }
        println!("{} P95 within {}", "PASS:".green().bold(), format_millis(target));
    }

    println!("{}", "Benchmark complete!".green().bold());

    Ok(())
}
