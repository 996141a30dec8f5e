use ndarray::{Array1, Array2, ArrayView2, Ix1, Ix2};
use rand::Rng;

use super::error::ClassifierError;
use super::state_dict::{StateDict, TensorData};
use crate::models::{HeadPolicy, ModelSpec};

pub const WEIGHT_KEY: &str = "classifier.weight";
pub const BIAS_KEY: &str = "classifier.bias";

/// Linear classification head mapping pooled backbone features to logits.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationHead {
    /// Shape `[num_labels, in_features]`
    weight: Array2<f32>,
    /// Shape `[num_labels]`
    bias: Array1<f32>,
}

impl ClassificationHead {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, ClassifierError> {
        if weight.nrows() != bias.len() {
            return Err(ClassifierError::TensorShape {
                name: BIAS_KEY.to_string(),
                expected: vec![weight.nrows()],
                found: vec![bias.len()],
            });
        }
        Ok(Self { weight, bias })
    }

    /// A freshly initialized head: weights uniform in `±1/sqrt(in_features)`,
    /// zero bias.
    pub fn initialized<R: Rng + ?Sized>(num_labels: usize, in_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((num_labels, in_features), |_| rng.random_range(-bound..=bound));
        Self {
            weight,
            bias: Array1::zeros(num_labels),
        }
    }

    /// Builds a head from the `classifier.*` tensors of a state dict, taking
    /// whatever shape they have.
    pub fn from_state_dict(dict: &StateDict) -> Result<Self, ClassifierError> {
        let weight = Self::tensor(dict, WEIGHT_KEY)?
            .to_array()?
            .into_dimensionality::<Ix2>()
            .map_err(|e| ClassifierError::ValidationError(format!("{} must be 2-D: {}", WEIGHT_KEY, e)))?;
        let bias = Self::tensor(dict, BIAS_KEY)?
            .to_array()?
            .into_dimensionality::<Ix1>()
            .map_err(|e| ClassifierError::ValidationError(format!("{} must be 1-D: {}", BIAS_KEY, e)))?;
        Self::new(weight, bias)
    }

    fn tensor<'a>(dict: &'a StateDict, name: &str) -> Result<&'a TensorData, ClassifierError> {
        dict.get(name)
            .ok_or_else(|| ClassifierError::MissingTensor(name.to_string()))
    }

    /// Replaces the head's parameters with the ones in `dict`.
    ///
    /// Strict: every tensor must be present with this head's exact shape and
    /// no other tensors may appear. On error the head is left unchanged.
    pub fn load_state_dict(&mut self, dict: &StateDict) -> Result<(), ClassifierError> {
        if let Some(name) = dict.names().find(|name| *name != WEIGHT_KEY && *name != BIAS_KEY) {
            return Err(ClassifierError::UnexpectedTensor(name.to_string()));
        }

        let expected_weight = self.weight.shape().to_vec();
        let expected_bias = self.bias.shape().to_vec();
        for (name, expected) in [(WEIGHT_KEY, &expected_weight), (BIAS_KEY, &expected_bias)] {
            let found = &Self::tensor(dict, name)?.shape;
            if found != expected {
                return Err(ClassifierError::TensorShape {
                    name: name.to_string(),
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }

        *self = Self::from_state_dict(dict)?;
        Ok(())
    }

    pub fn state_dict(&self) -> StateDict {
        let mut dict = StateDict::new();
        dict.insert(WEIGHT_KEY, TensorData::from_array(&self.weight.clone().into_dyn()));
        dict.insert(BIAS_KEY, TensorData::from_array(&self.bias.clone().into_dyn()));
        dict
    }

    pub fn num_labels(&self) -> usize {
        self.weight.nrows()
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.num_labels(), self.in_features()]
    }

    /// `features` is `[batch, in_features]`; returns logits `[batch, num_labels]`.
    pub fn forward(&self, features: ArrayView2<f32>) -> Result<Array2<f32>, ClassifierError> {
        if features.ncols() != self.in_features() {
            return Err(ClassifierError::PredictionError(format!(
                "Backbone produced {} features, head expects {}",
                features.ncols(),
                self.in_features()
            )));
        }
        Ok(features.dot(&self.weight.t()) + &self.bias)
    }
}

/// How the resolver obtains the classification head for a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadPlan {
    /// The checkpoint's head already has the requested shape.
    KeepPretrained,
    /// The head is missing or was mismatched under a tolerant policy.
    Reinitialize,
}

/// Decides whether a pretrained head of shape `pretrained` can serve a model
/// that needs `expected`.
///
/// A checkpoint without a head always gets a fresh one. A mismatched head is
/// replaced under [`HeadPolicy::Tolerant`] and rejected under
/// [`HeadPolicy::Strict`].
pub fn plan_head(
    spec: &ModelSpec,
    pretrained: Option<[usize; 2]>,
    expected: [usize; 2],
) -> Result<HeadPlan, ClassifierError> {
    match pretrained {
        None => {
            log::info!("Checkpoint for {} has no classification head; initializing a new one", spec.identifier);
            Ok(HeadPlan::Reinitialize)
        }
        Some(found) if found == expected => Ok(HeadPlan::KeepPretrained),
        Some(found) => match spec.head_policy {
            HeadPolicy::Tolerant => {
                log::warn!(
                    "Head of {} has shape {:?}, expected {:?}; newly initializing it",
                    spec.identifier, found, expected
                );
                Ok(HeadPlan::Reinitialize)
            }
            HeadPolicy::Strict => Err(ClassifierError::HeadShapeMismatch {
                identifier: spec.identifier.to_string(),
                found,
                expected,
            }),
        },
    }
}

/// Produces the head a resolved model will use: `pretrained` when its shape
/// fits, otherwise a fresh head as allowed by the model's policy.
///
/// The returned head always has shape `[spec.num_labels, in_features]`.
pub fn reconcile_head<R: Rng + ?Sized>(
    spec: &ModelSpec,
    pretrained: Option<ClassificationHead>,
    in_features: usize,
    rng: &mut R,
) -> Result<ClassificationHead, ClassifierError> {
    let expected = [spec.num_labels, in_features];
    let plan = plan_head(spec, pretrained.as_ref().map(ClassificationHead::shape), expected)?;
    match (plan, pretrained) {
        (HeadPlan::KeepPretrained, Some(head)) => Ok(head),
        _ => Ok(ClassificationHead::initialized(spec.num_labels, in_features, rng)),
    }
}
