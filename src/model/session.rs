//! Model sessions and loaders.
//!
//! `InferenceSession` is the seam between the engine and the network runtime:
//! the engine only needs "tensor in, score vector out". `OnnxSession` is the
//! ONNX Runtime implementation; tests substitute their own sessions and
//! loaders.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use crate::inference::preprocess::{InputTensor, INPUT_SHAPE};
use crate::model::artifact;
use crate::model::config::EngineConfig;
use crate::utils::error::{NoduleScanError, Result};

/// Tensor names the session was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub input_name: String,
    pub output_name: String,
}

/// A loaded, immutable network
pub trait InferenceSession: Send + Sync {
    /// Run one forward pass and return the raw output vector
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>>;

    fn info(&self) -> &SessionInfo;
}

/// Produces a session from configuration. Called at most once per engine
/// unless a previous attempt failed.
pub trait ModelLoader: Send + Sync {
    fn load(&self, config: &EngineConfig) -> Result<Arc<dyn InferenceSession>>;
}

/// Loads `config.model_path` with ONNX Runtime on the CPU
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxModelLoader;

impl ModelLoader for OnnxModelLoader {
    fn load(&self, config: &EngineConfig) -> Result<Arc<dyn InferenceSession>> {
        Ok(Arc::new(OnnxSession::load(config)?))
    }
}

/// ONNX Runtime session bound to one input and one output.
///
/// `Session::run` needs exclusive access, so forward passes are serialized by
/// the mutex; the graph and weights are never modified after load.
pub struct OnnxSession {
    session: Mutex<Session>,
    info: SessionInfo,
}

impl OnnxSession {
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let path = &config.model_path;
        let start = Instant::now();

        let report = artifact::inspect(path).map_err(|e| NoduleScanError::model_load(path, e))?;
        artifact::ensure_loadable(&report)?;
        debug!(
            path = %path.display(),
            size = report.size_bytes,
            kind = %report.kind,
            "Model artifact inspected"
        );

        let session = Session::builder()
            .map_err(|e| NoduleScanError::model_load(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| NoduleScanError::model_load(path, e))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| NoduleScanError::model_load(path, e))?
            .commit_from_file(path)
            .map_err(|e| NoduleScanError::model_load(path, e))?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let input_name = resolve_name(config.input_name.as_deref(), &input_names, "input")
            .map_err(|reason| NoduleScanError::model_load(path, reason))?;
        let output_name = resolve_name(config.output_name.as_deref(), &output_names, "output")
            .map_err(|reason| NoduleScanError::model_load(path, reason))?;

        if input_names.len() > 1 || output_names.len() > 1 {
            warn!(
                inputs = ?input_names,
                outputs = ?output_names,
                "Model has more than one input or output; only '{}' -> '{}' is used",
                input_name,
                output_name
            );
        }

        info!(
            path = %path.display(),
            input = %input_name,
            output = %output_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ONNX model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            info: SessionInfo {
                input_name,
                output_name,
            },
        })
    }
}

/// Pick the configured tensor name, or the first one the model declares
fn resolve_name(
    configured: Option<&str>,
    available: &[String],
    kind: &str,
) -> std::result::Result<String, String> {
    match configured {
        Some(name) if available.iter().any(|n| n == name) => Ok(name.to_string()),
        Some(name) => Err(format!(
            "model has no {} named '{}' (available: {:?})",
            kind, name, available
        )),
        None => available
            .first()
            .cloned()
            .ok_or_else(|| format!("model declares no {}s", kind)),
    }
}

impl InferenceSession for OnnxSession {
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array((&INPUT_SHAPE[..], input.as_slice().to_vec()))
            .map_err(|e| {
                NoduleScanError::Inference(format!("failed to build input tensor: {}", e))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| NoduleScanError::Inference("session lock poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![self.info.input_name.as_str() => tensor])
            .map_err(|e| NoduleScanError::Inference(e.to_string()))?;

        let output = outputs.get(self.info.output_name.as_str()).ok_or_else(|| {
            NoduleScanError::Inference(format!("missing output '{}'", self.info.output_name))
        })?;

        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                NoduleScanError::Inference(format!("output is not an f32 tensor: {}", e))
            })?;

        Ok(data.to_vec())
    }

    fn info(&self) -> &SessionInfo {
        &self.info
    }
}
