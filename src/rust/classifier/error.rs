use ort::Error as OrtError;
use std::io;

use crate::model_manager::ModelError;

/// Represents the different types of errors that can occur while resolving a
/// classifier or running it on an image.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Error occurred while loading or running the ONNX backbone
    #[error("Model error: {0}")]
    ModelError(String),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// The pretrained head does not fit the requested label space and the
    /// model's policy does not allow replacing it
    #[error(
        "Head shape mismatch for '{identifier}': checkpoint has {found:?}, expected {expected:?}"
    )]
    HeadShapeMismatch {
        identifier: String,
        found: [usize; 2],
        expected: [usize; 2],
    },
    /// Weights or tensors failed a consistency check
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Model is in training mode; call eval() before predicting")]
    NotInEvalMode,
    #[error("Missing tensor '{0}' in weights")]
    MissingTensor(String),
    #[error("Unexpected tensor '{0}' in weights")]
    UnexpectedTensor(String),
    #[error("Tensor '{name}' has shape {found:?}, expected {expected:?}")]
    TensorShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    HubError(#[from] ModelError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid weights file: {0}")]
    WeightsFormat(#[from] serde_json::Error),
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}
