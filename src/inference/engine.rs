//! The inference engine.
//!
//! Owns the model session lifecycle and runs the preprocess -> forward pass ->
//! decode pipeline. Construct one engine at startup, call `initialize()`, and
//! share it behind an `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::inference::decode::{decode, PredictionResult};
use crate::inference::preprocess::{preprocess, InputTensor, PreprocessLimits};
use crate::model::config::{EngineConfig, OutputActivation};
use crate::model::session::{InferenceSession, ModelLoader, OnnxModelLoader, SessionInfo};
use crate::utils::error::{NoduleScanError, Result};

/// Allowed distance of an identity-activated output from summing to one
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

pub struct InferenceEngine {
    config: EngineConfig,
    limits: PreprocessLimits,
    loader: Box<dyn ModelLoader>,
    /// Set exactly once; concurrent initializers block on the running load
    session: OnceCell<Arc<dyn InferenceSession>>,
    calibration_warned: AtomicBool,
}

impl InferenceEngine {
    pub fn new(config: EngineConfig, loader: impl ModelLoader + 'static) -> Self {
        let limits = PreprocessLimits::from(&config);
        Self {
            config,
            limits,
            loader: Box::new(loader),
            session: OnceCell::new(),
            calibration_warned: AtomicBool::new(false),
        }
    }

    /// Engine backed by ONNX Runtime
    pub fn onnx(config: EngineConfig) -> Self {
        Self::new(config, OnnxModelLoader)
    }

    /// Engine around an already-loaded session
    pub fn with_session(config: EngineConfig, session: Arc<dyn InferenceSession>) -> Self {
        let engine = Self::new(config, OnnxModelLoader);
        // A fresh cell is always empty, so this cannot fail
        let _ = engine.session.set(session);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.session.get().is_some()
    }

    /// Tensor names of the loaded session, if any
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.get().map(|s| s.info().clone())
    }

    /// Load the model unless it is already loaded.
    ///
    /// Only one load runs at a time: callers arriving while a load is in
    /// flight block until it finishes and share its session. A failed load
    /// leaves the engine not ready and returns the error; calling again
    /// starts a new attempt.
    pub fn initialize(&self) -> Result<()> {
        if self.is_ready() {
            debug!("Model already loaded");
            return Ok(());
        }

        self.config.validate()?;

        self.session
            .get_or_try_init(|| {
                let path = self.config.model_path.display().to_string();
                info!(model = %path, "Loading model");
                let start = Instant::now();

                let session = self.loader.load(&self.config)?;

                let info = session.info();
                info!(
                    model = %path,
                    input = %info.input_name,
                    output = %info.output_name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model ready"
                );
                Ok::<_, NoduleScanError>(session)
            })
            .map(|_| ())
            .map_err(|e| {
                error!(error = %e, "Model initialization failed");
                e
            })
    }

    fn ready_session(&self) -> Result<&Arc<dyn InferenceSession>> {
        self.initialize()?;
        self.session.get().ok_or(NoduleScanError::NotReady)
    }

    /// Preprocess an encoded image into the network input tensor
    pub fn preprocess(&self, image: &[u8]) -> Result<InputTensor> {
        preprocess(image, &self.limits)
    }

    /// Classify an encoded JPEG/PNG image.
    ///
    /// Loads the model first if needed (blocking on an in-flight load).
    /// CPU-bound; async callers should go through `ClassifierService`.
    pub fn predict(&self, image: &[u8]) -> Result<PredictionResult> {
        let session = self.ready_session()?;
        self.run_pipeline(session.as_ref(), image)
    }

    /// Like `predict`, but fails with `NotReady` instead of loading the model
    pub fn try_predict(&self, image: &[u8]) -> Result<PredictionResult> {
        let session = self.session.get().ok_or(NoduleScanError::NotReady)?;
        self.run_pipeline(session.as_ref(), image)
    }

    fn run_pipeline(
        &self,
        session: &dyn InferenceSession,
        image: &[u8],
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let tensor = self.preprocess(image)?;
        let preprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let raw = session.run(&tensor)?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = decode(&raw, self.config.output_activation)?;
        self.check_calibration(&result);

        debug!(
            bytes = image.len(),
            label = %result.label,
            confidence = result.confidence,
            preprocess_ms,
            inference_ms,
            "Prediction completed"
        );
        Ok(result)
    }

    /// Warn once when the network output does not look like a distribution
    fn check_calibration(&self, result: &PredictionResult) {
        if self.config.output_activation != OutputActivation::Identity {
            return;
        }
        let sum: f32 = result.probabilities.iter().sum();
        let in_range = result.probabilities.iter().all(|p| (0.0..=1.0).contains(p));
        if (!in_range || (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE)
            && !self.calibration_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                sum,
                "Model output is not a probability distribution; confidence is uncalibrated. \
                 Set output_activation = \"softmax\" if the network emits logits"
            );
        }
    }
}
