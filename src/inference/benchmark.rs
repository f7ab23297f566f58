//! Latency benchmarking for the prediction pipeline.
//!
//! Times full `predict` calls (decode, resize, forward pass, decoding) on one
//! image, after a number of warmup runs that are excluded from the statistics.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::engine::InferenceEngine;
use crate::model::labels::ClassLabel;
use crate::utils::error::{NoduleScanError, Result};
use crate::utils::format_millis;

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of timed iterations
    pub iterations: usize,

    /// Keep individual iteration times in the result
    pub verbose: bool,

    /// Output file for results (optional)
    pub output_path: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 100,
            verbose: false,
            output_path: None,
        }
    }
}

impl BenchmarkConfig {
    pub fn quick() -> Self {
        Self {
            warmup_iterations: 2,
            iterations: 20,
            verbose: false,
            output_path: None,
        }
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times_ms.sort_by(f64::total_cmp);

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub latency: LatencyStats,

    /// Images per second at mean latency
    pub throughput: f64,

    /// Label predicted for the benchmark image
    pub label: ClassLabel,

    /// Individual iteration times (if verbose)
    pub iteration_times_ms: Vec<f64>,

    pub config: BenchmarkConfig,

    /// RFC 3339 timestamp of the run
    pub timestamp: String,
}

impl BenchmarkResult {
    pub fn from_timings(timings: &[Duration], label: ClassLabel, config: BenchmarkConfig) -> Self {
        let latency = LatencyStats::from_durations(timings);
        let throughput = if latency.mean_ms > 0.0 {
            1000.0 / latency.mean_ms
        } else {
            0.0
        };

        let iteration_times_ms = if config.verbose {
            timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect()
        } else {
            Vec::new()
        };

        Self {
            latency,
            throughput,
            label,
            iteration_times_ms,
            config,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Save results to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check whether p95 latency is within `target_ms`
    pub fn meets_latency_target(&self, target_ms: f64) -> bool {
        self.latency.p95_ms <= target_ms
    }

    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} img/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Benchmark ({} iterations, {} warmup)",
            self.config.iterations, self.config.warmup_iterations
        )?;
        writeln!(f, "  Predicted:  {}", self.label)?;
        writeln!(f, "  Mean:       {:>10}", format_millis(self.latency.mean_ms))?;
        writeln!(f, "  Std Dev:    {:>10}", format_millis(self.latency.std_ms))?;
        writeln!(
            f,
            "  Min / Max:  {:>10} / {}",
            format_millis(self.latency.min_ms),
            format_millis(self.latency.max_ms)
        )?;
        writeln!(f, "  P50:        {:>10}", format_millis(self.latency.p50_ms))?;
        writeln!(f, "  P95:        {:>10}", format_millis(self.latency.p95_ms))?;
        writeln!(f, "  P99:        {:>10}", format_millis(self.latency.p99_ms))?;
        writeln!(f, "  Throughput: {:>10.1} images/s", self.throughput)
    }
}

/// Benchmark `engine.predict` on one encoded image
pub fn run_benchmark(
    engine: &InferenceEngine,
    image: &[u8],
    config: BenchmarkConfig,
) -> Result<BenchmarkResult> {
    if config.iterations == 0 {
        return Err(NoduleScanError::Config(
            "benchmark needs at least one timed iteration".into(),
        ));
    }

    engine.initialize()?;

    for _ in 0..config.warmup_iterations {
        engine.predict(image)?;
    }

    let mut label = None;
    let mut timings = Vec::with_capacity(config.iterations);
    for _ in 0..config.iterations {
        let start = Instant::now();
        let result = engine.predict(image)?;
        timings.push(start.elapsed());
        label = Some(result.label);
    }
    let label = label.ok_or_else(|| NoduleScanError::Config("no timed iterations ran".into()))?;

    let result = BenchmarkResult::from_timings(&timings, label, config);
    info!("{}", result.summary());

    if let Some(path) = &result.config.output_path {
        result.save(path)?;
        info!(path = %path.display(), "Benchmark results saved");
    }

    Ok(result)
}
