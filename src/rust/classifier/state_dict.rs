use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

/// A single named tensor: its shape and row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorData {
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>, ClassifierError> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone())
            .map_err(|e| ClassifierError::ValidationError(format!("Tensor data does not fit its shape: {}", e)))
    }
}

/// Named weight tensors as stored on disk.
///
/// Serialized as a JSON object mapping tensor names to `{ "shape", "data" }`:
///
/// ```json
/// {
///   "classifier.weight": { "shape": [18, 768], "data": [0.01, ...] },
///   "classifier.bias":   { "shape": [18], "data": [0.0, ...] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorData>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and validates a state dict file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let bytes = fs::read(path.as_ref())?;
        let dict: Self = serde_json::from_slice(&bytes)?;
        dict.validate()?;
        log::debug!("Loaded {} tensors from {:?}", dict.tensors.len(), path.as_ref());
        Ok(dict)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ClassifierError> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        for (name, tensor) in &self.tensors {
            let expected: usize = tensor.shape.iter().product();
            if expected != tensor.data.len() {
                return Err(ClassifierError::ValidationError(format!(
                    "Tensor '{}' declares shape {:?} ({} values) but holds {} values",
                    name,
                    tensor.shape,
                    expected,
                    tensor.data.len()
                )));
            }
        }
        Ok(())
    }
}
