use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayD, ArrayView4, Ix2};
use ort::session::Session;
use ort::value::Tensor;

use super::error::ClassifierError;
use super::head::ClassificationHead;
use super::state_dict::StateDict;
use super::ClassifierInfo;
use crate::models::ModelSpec;
use crate::runtime::Device;

/// Name of the output field holding raw class scores.
pub const LOGITS: &str = "logits";
/// Name of the output field holding the pooled backbone features.
pub const POOLER_OUTPUT: &str = "pooler_output";

/// Whether training-only behavior is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Named output tensors of a forward pass.
#[derive(Debug, Clone, Default)]
pub struct StructuredOutput {
    fields: HashMap<String, ArrayD<f32>>,
}

impl StructuredOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: ArrayD<f32>) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.fields.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.fields.remove(name)
    }
}

/// Result of [`ImageClassifier::forward`]: either a bare logits tensor or a
/// set of named fields, one of which is `logits`.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    Tensor(ArrayD<f32>),
    Structured(StructuredOutput),
}

impl ModelOutput {
    /// Resolves the output to a `[batch, num_labels]` logits matrix.
    pub fn into_logits(self) -> Result<Array2<f32>, ClassifierError> {
        let logits = match self {
            Self::Tensor(tensor) => tensor,
            Self::Structured(mut fields) => fields.take(LOGITS).ok_or_else(|| {
                ClassifierError::PredictionError(format!("Model output has no '{}' field", LOGITS))
            })?,
        };
        logits
            .into_dimensionality::<Ix2>()
            .map_err(|e| ClassifierError::PredictionError(format!("Logits must be [batch, classes]: {}", e)))
    }
}

/// An image classifier the inference pipeline can drive.
///
/// `pixel_values` is an NCHW tensor scaled to `[0, 1]`.
pub trait ImageClassifier {
    /// Width of the logits vector
    fn num_labels(&self) -> usize;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    /// Switches to evaluation mode.
    fn eval(&mut self) {
        self.set_mode(Mode::Eval);
    }

    fn forward(&self, pixel_values: ArrayView4<f32>) -> Result<ModelOutput, ClassifierError>;
}

/// A pretrained ONNX backbone followed by a linear classification head.
///
/// The backbone graph takes `pixel_values` and emits pooled features; the
/// head is evaluated in Rust so its shape can be reconciled with the label
/// space and its weights replaced by fine-tuned ones.
#[derive(Debug)]
pub struct OnnxClassifier {
    spec: &'static ModelSpec,
    model_path: PathBuf,
    session: Session,
    input_name: String,
    feature_output: String,
    head: ClassificationHead,
    mode: Mode,
    device: Device,
}

impl OnnxClassifier {
    pub(crate) fn new(
        spec: &'static ModelSpec,
        model_path: PathBuf,
        session: Session,
        head: ClassificationHead,
        device: Device,
    ) -> Result<Self, ClassifierError> {
        Self::validate_model(&session)?;
        let input_name = session.inputs[0].name.clone();
        let feature_output = session
            .outputs
            .iter()
            .find(|output| output.name == POOLER_OUTPUT)
            .unwrap_or(&session.outputs[0])
            .name
            .clone();
        log::info!(
            "Backbone for {} reads '{}' and pools into '{}'",
            spec.identifier, input_name, feature_output
        );

        Ok(Self {
            spec,
            model_path,
            session,
            input_name,
            feature_output,
            head,
            mode: Mode::Train,
            device,
        })
    }

    /// Validates that the backbone has at least one input and one output
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Backbone must have a pixel_values input".to_string(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Backbone must have at least 1 output for pooled features".to_string(),
            ));
        }
        Ok(())
    }

    pub fn spec(&self) -> &'static ModelSpec {
        self.spec
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn head(&self) -> &ClassificationHead {
        &self.head
    }

    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            identifier: self.spec.identifier.to_string(),
            architecture: self.spec.architecture,
            model_path: self.model_path.clone(),
            num_labels: self.head.num_labels(),
            feature_width: self.head.in_features(),
            device: self.device,
        }
    }

    /// Loads fine-tuned head weights. See [`ClassificationHead::load_state_dict`].
    pub fn load_state_dict(&mut self, dict: &StateDict) -> Result<(), ClassifierError> {
        self.head.load_state_dict(dict)
    }

    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ClassifierError> {
        log::info!("Loading weights from {:?}", path.as_ref());
        let dict = StateDict::from_file(path)?;
        self.load_state_dict(&dict)
    }

    fn extract_features(&self, pixel_values: ArrayView4<f32>) -> Result<Array2<f32>, ClassifierError> {
        let input_dyn = pixel_values.into_dyn();
        let input = input_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), Tensor::from_array(&input)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[self.feature_output.as_str()].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        // [batch, C] or [batch, C, 1, 1] depending on how the pooler was exported
        let batch = *output_tensor.shape().first().ok_or_else(|| {
            ClassifierError::ModelError("Backbone output has no batch dimension".to_string())
        })?;
        let values: Vec<f32> = output_tensor.iter().copied().collect();
        let width = values.len() / batch.max(1);
        Array2::from_shape_vec((batch, width), values)
            .map_err(|e| ClassifierError::ModelError(format!("Unexpected feature shape: {}", e)))
    }
}

impl ImageClassifier for OnnxClassifier {
    fn num_labels(&self) -> usize {
        self.head.num_labels()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&self, pixel_values: ArrayView4<f32>) -> Result<ModelOutput, ClassifierError> {
        let features = self.extract_features(pixel_values)?;
        let logits = self.head.forward(features.view())?;
        Ok(ModelOutput::Structured(
            StructuredOutput::new()
                .with_field(LOGITS, logits.into_dyn())
                .with_field(POOLER_OUTPUT, features.into_dyn()),
        ))
    }
}
