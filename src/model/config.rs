//! Engine Configuration Module
//!
//! Deployment settings for the inference engine: where the model artifact
//! lives, how its tensors are named, and the input limits applied before
//! decoding an upload.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{NoduleScanError, Result};

/// Environment variable overriding `model_path`
pub const MODEL_PATH_ENV: &str = "NODULESCAN_MODEL_PATH";

/// Default location of the serialized network
pub const DEFAULT_MODEL_PATH: &str = "models/nodule_classifier.onnx";

/// Largest accepted upload (10 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Largest accepted decoded image (100 megapixels)
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// How the raw output vector is turned into probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// The network already ends in softmax; use the vector verbatim
    #[default]
    Identity,
    /// Apply softmax to raw logits before decoding
    Softmax,
}

/// Configuration for the inference engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the ONNX model artifact
    pub model_path: PathBuf,

    /// Input tensor name (first model input when unset)
    pub input_name: Option<String>,

    /// Output tensor name (first model output when unset)
    pub output_name: Option<String>,

    /// Activation applied to the raw output vector
    pub output_activation: OutputActivation,

    /// ONNX Runtime intra-op thread count
    pub intra_threads: usize,

    /// Maximum encoded image size in bytes
    pub max_image_bytes: usize,

    /// Maximum decoded pixel count (width * height)
    pub max_pixels: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_name: None,
            output_name: None,
            output_activation: OutputActivation::Identity,
            intra_threads: 1,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for a specific model file
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    /// Defaults, with `model_path` taken from `NODULESCAN_MODEL_PATH` when set
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from the environment
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(MODEL_PATH_ENV) {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
    }

    pub fn with_activation(mut self, activation: OutputActivation) -> Self {
        self.output_activation = activation;
        self
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(NoduleScanError::Config("model_path must not be empty".into()));
        }
        if self.intra_threads == 0 {
            return Err(NoduleScanError::Config("intra_threads must be at least 1".into()));
        }
        if self.max_image_bytes == 0 {
            return Err(NoduleScanError::Config("max_image_bytes must be positive".into()));
        }
        if self.max_pixels == 0 {
            return Err(NoduleScanError::Config("max_pixels must be positive".into()));
        }
        let names = [("input_name", &self.input_name), ("output_name", &self.output_name)];
        for (field, name) in names {
            if matches!(name, Some(n) if n.trim().is_empty()) {
                return Err(NoduleScanError::Config(format!("{} must not be blank", field)));
            }
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.output_activation, OutputActivation::Identity);
        assert_eq!(config.max_image_bytes, 10 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig::default().with_intra_threads(0);
        assert!(matches!(config.validate(), Err(NoduleScanError::Config(_))));

        let config = EngineConfig::new("");
        assert!(config.validate().is_err());

        let config = EngineConfig {
            output_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig::new("/opt/models/xception.onnx")
            .with_activation(OutputActivation::Softmax);
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.model_path, config.model_path);
        assert_eq!(loaded.output_activation, OutputActivation::Softmax);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "model_path": "a.onnx", "output_activation": "softmax" }"#)
                .unwrap();
        assert_eq!(config.model_path, PathBuf::from("a.onnx"));
        assert_eq!(config.output_activation, OutputActivation::Softmax);
        assert_eq!(config.intra_threads, 1);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(NoduleScanError::Serialization(_))
        ));
    }
}
