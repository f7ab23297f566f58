//! Inference module: the image -> tensor -> network -> label pipeline
//!
//! This module provides:
//! - Deterministic preprocessing into a `[1, 224, 224, 3]` tensor
//! - Output decoding (argmax, confidence, optional softmax)
//! - `InferenceEngine`, owning the once-only model session
//! - `ClassifierService`, dispatching predictions onto tokio's blocking pool
//! - Latency benchmarking

pub mod benchmark;
pub mod decode;
pub mod engine;
pub mod preprocess;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats};
pub use decode::{argmax, decode, softmax, PredictionResult};
pub use engine::InferenceEngine;
pub use preprocess::{preprocess, InputTensor, PreprocessLimits, INPUT_LEN, INPUT_SHAPE};
pub use service::ClassifierService;
