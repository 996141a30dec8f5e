use ndarray::{Array1, ArrayView1};

use super::error::ClassifierError;

/// Numerically stable softmax over a single logits row.
///
/// Fails on infinite or NaN logits, which have no meaningful distribution.
pub(crate) fn softmax(logits: ArrayView1<f32>) -> Result<Array1<f32>, ClassifierError> {
    if let Some(bad) = logits.iter().find(|x| !x.is_finite()) {
        return Err(ClassifierError::PredictionError(format!("Non-finite logit {}", bad)));
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    Ok(exp / sum)
}
