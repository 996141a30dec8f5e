use std::path::PathBuf;

use crate::models::Architecture;
use crate::runtime::Device;

mod error;
pub mod head;
mod model;
pub mod builder;
pub mod pipeline;
pub mod state_dict;
#[cfg(test)]
pub(crate) mod testing;
mod utils;

pub use builder::{resolve, ClassifierBuilder};
pub use error::ClassifierError;
pub use head::{plan_head, reconcile_head, ClassificationHead, HeadPlan};
pub use model::{ImageClassifier, Mode, ModelOutput, OnnxClassifier, StructuredOutput, LOGITS, POOLER_OUTPUT};
pub use pipeline::{predict, predict_image, preprocess, ProbabilityVector, INPUT_SIZE};
pub use state_dict::{StateDict, TensorData};

/// Information about a resolved classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    /// Model table identifier it was resolved from
    pub identifier: String,
    pub architecture: Architecture,
    /// Path to the ONNX backbone file
    pub model_path: PathBuf,
    /// Width of the output vector
    pub num_labels: usize,
    /// Width of the pooled features the head consumes
    pub feature_width: usize,
    pub device: Device,
}
