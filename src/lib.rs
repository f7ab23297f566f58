//! # nodulescan
//!
//! Chest X-ray nodule classification on top of ONNX Runtime.
//!
//! An uploaded image is decoded, stretched to 224x224, converted to a
//! channel-last `[1, 224, 224, 3]` tensor scaled to `[0, 1]`, run through a
//! pre-trained network and decoded into one of three classes:
//! `benign`, `malignant` or `non-nodule`.
//!
//! ## Modules
//!
//! - `model`: class labels, engine configuration, model artifact inspection
//!   and the session/loader seam around ONNX Runtime
//! - `inference`: preprocessing, output decoding, the engine, the async
//!   service front and latency benchmarking
//! - `report`: caller-side presentation (Normal/Abnormal mapping, batch summaries)
//! - `utils`: errors and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nodulescan::{EngineConfig, InferenceEngine};
//!
//! let engine = Arc::new(InferenceEngine::onnx(EngineConfig::from_env()?));
//! engine.initialize()?;
//!
//! let bytes = std::fs::read("scan.png")?;
//! let result = engine.predict(&bytes)?;
//! println!("{} ({:.1}%)", result.label, result.confidence * 100.0);
//! ```

pub mod inference;
pub mod model;
pub mod report;
pub mod utils;

// Re-export commonly used items for convenience
pub use inference::decode::PredictionResult;
pub use inference::engine::InferenceEngine;
pub use inference::preprocess::InputTensor;
pub use inference::service::ClassifierService;
pub use model::config::{EngineConfig, OutputActivation};
pub use model::labels::{ClassLabel, NUM_CLASSES};
pub use model::session::{InferenceSession, ModelLoader, OnnxModelLoader};
pub use report::{BatchSummary, ClinicalFinding, PredictionReport};
pub use utils::error::{ErrorCategory, NoduleScanError, Result};

/// Side length of the square network input
pub const IMAGE_SIZE: usize = 224;

/// Number of color channels fed to the network
pub const CHANNELS: usize = 3;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
