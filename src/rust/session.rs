use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use log::{info, warn};

use crate::classifier::{self, ClassifierBuilder, ClassifierInfo, ImageClassifier, ProbabilityVector};
use crate::gallery;
use crate::model_manager::ModelManager;
use crate::models;
use crate::runtime::RuntimeConfig;

/// What a "Load Model" action ended with, short of a fatal error.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(ClassifierInfo),
    /// The file name's identifier is not in the model table; no model is
    /// loaded afterwards.
    UnknownIdentifier(String),
}

/// A decoded image and its class probabilities.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub path: PathBuf,
    pub image: DynamicImage,
    pub probabilities: ProbabilityVector,
}

/// State behind the viewer: the current model and the current folder.
///
/// Each is replaced wholesale by the next load or folder selection.
pub struct ReviewSession {
    manager: ModelManager,
    runtime: RuntimeConfig,
    model: Option<Box<dyn ImageClassifier>>,
    model_info: Option<ClassifierInfo>,
    image_paths: Vec<PathBuf>,
}

impl ReviewSession {
    pub fn new(manager: ModelManager, runtime: RuntimeConfig) -> Self {
        Self {
            manager,
            runtime,
            model: None,
            model_info: None,
            image_paths: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_info(&self) -> Option<&ClassifierInfo> {
        self.model_info.as_ref()
    }

    pub fn image_paths(&self) -> &[PathBuf] {
        &self.image_paths
    }

    /// Installs an already prepared model.
    pub fn set_model(&mut self, model: Box<dyn ImageClassifier>, info: Option<ClassifierInfo>) {
        self.model = Some(model);
        self.model_info = info;
    }

    pub fn clear_model(&mut self) {
        self.model = None;
        self.model_info = None;
    }

    /// Resolves the model named by `weights_path`'s file name, loads the
    /// fine-tuned weights into it and switches it to evaluation mode.
    ///
    /// When an ONNX export sits next to the weights file (same stem,
    /// `.onnx` extension) it is used as the fine-tuned backbone in place of
    /// the hub's pretrained one.
    ///
    /// The current model is dropped first, so after any error no model is
    /// loaded. Every error returned here is fatal to the viewer.
    pub fn load_model<P: AsRef<Path>>(&mut self, weights_path: P) -> Result<LoadOutcome> {
        let weights_path = weights_path.as_ref();
        self.clear_model();
        info!("Loading model from {:?}", weights_path);

        let identifier = models::identifier_from_path(weights_path)?;
        let Some(spec) = models::lookup(&identifier) else {
            warn!("Unknown model identifier '{}'", identifier);
            return Ok(LoadOutcome::UnknownIdentifier(identifier));
        };

        let mut builder = ClassifierBuilder::new(spec).with_runtime_config(self.runtime.clone());
        if let Some(backbone) = fine_tuned_backbone(weights_path) {
            builder = builder.with_backbone(backbone);
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start the download runtime")?;
        let mut model = rt
            .block_on(builder.build(&self.manager))
            .with_context(|| format!("Failed to resolve model '{}'", identifier))?;

        model
            .load_weights(weights_path)
            .with_context(|| format!("Failed to load weights from {:?}", weights_path))?;
        model.eval();

        let info = model.info();
        info!(
            "Loaded {} ({}) with {} labels on {}",
            info.identifier, info.architecture, info.num_labels, info.device
        );
        self.set_model(Box::new(model), Some(info.clone()));
        Ok(LoadOutcome::Loaded(info))
    }

    /// Replaces the image listing with the images in `dir`.
    pub fn select_folder<P: AsRef<Path>>(&mut self, dir: P) -> io::Result<&[PathBuf]> {
        // a failed listing leaves the gallery empty, not stale
        self.image_paths.clear();
        self.image_paths = gallery::list_images(dir)?;
        if self.image_paths.is_empty() {
            info!("No images found in the selected folder.");
        }
        Ok(&self.image_paths)
    }

    /// Classifies the image at `path`. Returns `Ok(None)` when no model is
    /// loaded.
    pub fn predict<P: AsRef<Path>>(&self, path: P) -> Result<Option<Prediction>> {
        let Some(model) = self.model.as_deref() else {
            info!("No model loaded.");
            return Ok(None);
        };

        let path = path.as_ref();
        let image = image::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let probabilities = classifier::predict_image(model, &image)
            .with_context(|| format!("Prediction failed for {:?}", path))?;
        Ok(Some(Prediction {
            path: path.to_path_buf(),
            image,
            probabilities,
        }))
    }
}

/// The fine-tuned ONNX export for `weights_path`: the same path with an
/// `.onnx` extension, if that file exists.
pub fn fine_tuned_backbone(weights_path: &Path) -> Option<PathBuf> {
    let candidate = weights_path.with_extension("onnx");
    candidate.is_file().then_some(candidate)
}
