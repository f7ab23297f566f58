//! Test doubles for sessions and loaders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::inference::preprocess::InputTensor;
use crate::model::config::EngineConfig;
use crate::model::session::{InferenceSession, ModelLoader, SessionInfo};
use crate::utils::error::{NoduleScanError, Result};
use crate::CHANNELS;

pub(crate) fn stub_info() -> SessionInfo {
    SessionInfo {
        input_name: "input_1".into(),
        output_name: "dense_2".into(),
    }
}

/// Returns a fixed vector, optionally after a delay or a number of failures
pub(crate) struct ScriptedSession {
    info: SessionInfo,
    output: Vec<f32>,
    failures_left: AtomicUsize,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSession {
    pub(crate) fn returning(output: Vec<f32>) -> Self {
        Self {
            info: stub_info(),
            output,
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceSession for ScriptedSession {
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(input.shape(), [1, 224, 224, 3]);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(NoduleScanError::Inference("transient runtime fault".into()));
        }
        Ok(self.output.clone())
    }

    fn info(&self) -> &SessionInfo {
        &self.info
    }
}

/// Scores each class with the mean of one color channel, so the output
/// depends on the input image
pub(crate) struct MeanColorSession {
    info: SessionInfo,
}

impl MeanColorSession {
    pub(crate) fn new() -> Self {
        Self { info: stub_info() }
    }

    pub(crate) fn score(input: &InputTensor) -> Vec<f32> {
        let mut sums = [0.0f64; CHANNELS];
        for pixel in input.as_slice().chunks_exact(CHANNELS) {
            for (sum, &v) in sums.iter_mut().zip(pixel) {
                *sum += f64::from(v);
            }
        }
        let count = (input.as_slice().len() / CHANNELS) as f64;
        sums.iter().map(|s| (s / count) as f32).collect()
    }
}

impl InferenceSession for MeanColorSession {
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>> {
        Ok(Self::score(input))
    }

    fn info(&self) -> &SessionInfo {
        &self.info
    }
}

/// Counts load attempts; can be slowed down, made to fail or to panic
pub(crate) struct CountingLoader {
    loads: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
    panic: bool,
    session: Arc<dyn InferenceSession>,
}

impl CountingLoader {
    pub(crate) fn new(session: Arc<dyn InferenceSession>) -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = Self {
            loads: Arc::clone(&loads),
            delay: Duration::ZERO,
            fail: false,
            panic: false,
            session,
        };
        (loader, loads)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, config: &EngineConfig) -> Result<Arc<dyn InferenceSession>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panic {
            panic!("runtime aborted while loading {}", config.model_path.display());
        }
        if self.fail {
            return Err(NoduleScanError::model_load(
                &config.model_path,
                "truncated protobuf",
            ));
        }
        Ok(Arc::clone(&self.session))
    }
}
