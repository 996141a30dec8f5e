use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayView1};

use super::error::ClassifierError;
use super::model::{ImageClassifier, Mode};
use super::utils::softmax;

/// Side length of the square input every backbone expects.
pub const INPUT_SIZE: u32 = 224;

/// Class probabilities for one image, in model output order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    /// Softmax over one row of logits. Infinite or NaN logits are a
    /// [`ClassifierError::PredictionError`].
    pub fn from_logits(logits: ArrayView1<f32>) -> Result<Self, ClassifierError> {
        Ok(Self(softmax(logits)?.to_vec()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs class names with probabilities, stopping at whichever runs out
    /// first.
    pub fn labeled<'a>(&self, names: &[&'a str]) -> Vec<(&'a str, f32)> {
        names.iter().copied().zip(self.0.iter().copied()).collect()
    }

    /// Index and value of the most probable class
    pub fn top(&self) -> Option<(usize, f32)> {
        self.0
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ClassifierError> {
    Ok(image::open(path)?)
}

/// Converts an image into a `(1, 3, 224, 224)` tensor scaled to `[0, 1]`.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let rgb = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// Runs one decoded image through `model`.
pub fn predict_image(
    model: &dyn ImageClassifier,
    image: &DynamicImage,
) -> Result<ProbabilityVector, ClassifierError> {
    if model.mode() != Mode::Eval {
        return Err(ClassifierError::NotInEvalMode);
    }

    let pixel_values = preprocess(image);
    let logits = model.forward(pixel_values.view())?.into_logits()?;
    if logits.nrows() == 0 {
        return Err(ClassifierError::PredictionError("Model returned an empty batch".to_string()));
    }

    let probabilities = ProbabilityVector::from_logits(logits.row(0))?;
    log::debug!("Predicted {} class probabilities", probabilities.len());
    Ok(probabilities)
}

/// Decodes the image at `path` and returns its class probabilities.
pub fn predict<P: AsRef<Path>>(
    model: &dyn ImageClassifier,
    path: P,
) -> Result<ProbabilityVector, ClassifierError> {
    if model.mode() != Mode::Eval {
        return Err(ClassifierError::NotInEvalMode);
    }
    let image = load_image(path)?;
    predict_image(model, &image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::model::{ModelOutput, StructuredOutput, LOGITS};
    use crate::models::{CLASS_NAMES, NUM_LABELS};
    use image::{Rgb, RgbImage};
    use ndarray::{arr1, Array2, ArrayView4};

    struct FixedLogits {
        logits: Vec<f32>,
        structured: bool,
        mode: Mode,
    }

    impl FixedLogits {
        fn new(logits: Vec<f32>, structured: bool) -> Self {
            Self { logits, structured, mode: Mode::Eval }
        }
    }

    impl ImageClassifier for FixedLogits {
        fn num_labels(&self) -> usize {
            self.logits.len()
        }

        fn mode(&self) -> Mode {
            self.mode
        }

        fn set_mode(&mut self, mode: Mode) {
            self.mode = mode;
        }

        fn forward(&self, pixel_values: ArrayView4<f32>) -> Result<ModelOutput, ClassifierError> {
            assert_eq!(pixel_values.shape(), &[1, 3, 224, 224]);
            let logits = Array2::from_shape_vec((1, self.logits.len()), self.logits.clone())
                .unwrap()
                .into_dyn();
            Ok(if self.structured {
                ModelOutput::Structured(StructuredOutput::new().with_field(LOGITS, logits))
            } else {
                ModelOutput::Tensor(logits)
            })
        }
    }

    fn sample_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 255])
        }))
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let tensor = preprocess(&sample_image(640, 480));
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        // blue channel is saturated everywhere
        assert!(tensor.slice(ndarray::s![0, 2, .., ..]).iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_preprocess_grayscale_input() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(50, 50, image::Luma([128])));
        let tensor = preprocess(&gray);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let expected = 128.0 / 255.0;
        assert!(tensor.iter().all(|v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_bare_and_structured_outputs_agree() {
        let logits: Vec<f32> = (0..NUM_LABELS).map(|i| i as f32 * 0.3 - 2.0).collect();
        let image = sample_image(32, 32);

        let bare = predict_image(&FixedLogits::new(logits.clone(), false), &image).unwrap();
        let structured = predict_image(&FixedLogits::new(logits, true), &image).unwrap();

        assert_eq!(bare, structured);
        assert_eq!(bare.len(), NUM_LABELS);
        let sum: f32 = bare.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(bare.as_slice().iter().all(|p| *p >= 0.0));
        assert_eq!(bare.top().map(|(i, _)| i), Some(NUM_LABELS - 1));
    }

    #[test]
    fn test_train_mode_is_rejected() {
        let mut model = FixedLogits::new(vec![0.0; NUM_LABELS], false);
        model.set_mode(Mode::Train);
        assert!(matches!(
            predict_image(&model, &sample_image(8, 8)),
            Err(ClassifierError::NotInEvalMode)
        ));
        assert!(matches!(
            predict(&model, "/nonexistent.png"),
            Err(ClassifierError::NotInEvalMode)
        ));
    }

    #[test]
    fn test_predict_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell.png");
        sample_image(100, 60).save(&path).unwrap();

        let probs = predict(&FixedLogits::new(vec![1.0, 1.0], true), &path).unwrap();
        assert_eq!(probs.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn test_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let model = FixedLogits::new(vec![0.0; NUM_LABELS], false);
        assert!(matches!(predict(&model, &path), Err(ClassifierError::ImageError(_))));
    }

    #[test]
    fn test_non_finite_logits_fail_prediction() {
        let image = sample_image(16, 16);
        let mut overflowing = vec![0.0; NUM_LABELS];
        overflowing[4] = f32::INFINITY;
        let mut undefined = vec![0.5; NUM_LABELS];
        undefined[0] = f32::NAN;

        for logits in [overflowing, undefined] {
            assert!(matches!(
                predict_image(&FixedLogits::new(logits, true), &image),
                Err(ClassifierError::PredictionError(_))
            ));
        }
    }

    #[test]
    fn test_labeled_truncates() {
        let short = ProbabilityVector::from_logits(arr1(&[0.0, 0.0, 0.0]).view()).unwrap();
        let pairs = short.labeled(&CLASS_NAMES);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0, "AmorfHead");
        assert_eq!(pairs[2].0, "CurlyTail");

        let long = ProbabilityVector::from_logits(arr1(&[0.0; 20]).view()).unwrap();
        assert_eq!(long.labeled(&CLASS_NAMES).len(), NUM_LABELS);
    }
}
