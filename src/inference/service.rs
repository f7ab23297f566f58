//! Async front for the inference engine.
//!
//! Predictions are CPU-bound, so the service moves them onto tokio's blocking
//! pool instead of stalling the async workers. It also owns the caller-side
//! policy: an optional per-attempt deadline and a bounded retry for runtime
//! faults. Bad images and load failures are returned immediately.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::inference::decode::PredictionResult;
use crate::inference::engine::InferenceEngine;
use crate::utils::error::{NoduleScanError, Result};

/// Default number of extra attempts after an `Inference` failure
pub const DEFAULT_MAX_RETRIES: usize = 1;

#[derive(Clone)]
pub struct ClassifierService {
    engine: Arc<InferenceEngine>,
    timeout: Option<Duration>,
    max_retries: usize,
}

impl ClassifierService {
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self {
            engine,
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Give up on an attempt after `timeout`; its result is discarded
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    /// Load the model on the blocking pool.
    ///
    /// A load task that panics or is cancelled is reported as `ModelLoad`.
    pub async fn initialize(&self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.initialize())
            .await
            .map_err(|e| {
                NoduleScanError::model_load(
                    &self.engine.config().model_path,
                    format!("initialization task failed: {}", e),
                )
            })?
    }

    /// Classify an encoded image without blocking the async runtime
    pub async fn predict(&self, image: impl Into<Arc<[u8]>>) -> Result<PredictionResult> {
        let image: Arc<[u8]> = image.into();
        let mut retries = 0;

        loop {
            match self.predict_once(Arc::clone(&image)).await {
                Err(err) if err.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    warn!(retries, error = %err, "Prediction failed, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    async fn predict_once(&self, image: Arc<[u8]>) -> Result<PredictionResult> {
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.predict(&image));

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| NoduleScanError::Timeout(limit))?,
            None => task.await,
        };

        joined.map_err(|e| NoduleScanError::Inference(format!("prediction task failed: {}", e)))?
    }
}
