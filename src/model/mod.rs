//! Model module: class labels, engine configuration, artifact inspection and
//! the session/loader abstraction over ONNX Runtime.

pub mod artifact;
pub mod config;
pub mod labels;
pub mod session;

// Re-export main types for convenience
pub use artifact::{extract_model, inspect, ArtifactKind, ArtifactReport, ZIPPED_MODEL_ENTRY};
pub use config::{EngineConfig, OutputActivation};
pub use labels::{ClassLabel, CLASS_NAMES, NUM_CLASSES};
pub use session::{InferenceSession, ModelLoader, OnnxModelLoader, OnnxSession, SessionInfo};
