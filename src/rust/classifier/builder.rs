use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use log::{info, error};

use super::error::ClassifierError;
use super::head::{plan_head, reconcile_head, ClassificationHead, HeadPlan};
use super::model::OnnxClassifier;
use super::state_dict::StateDict;
use crate::model_manager::{HubFile, ModelManager};
use crate::models::{self, HubConfig, ModelSpec};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Resolves a model identifier to a pretrained classifier.
///
/// Returns `Ok(None)` for identifiers outside the model table, without
/// touching the network. Known identifiers fetch the pretrained checkpoint
/// from the hub (or the local cache) and reconcile its head with the
/// 18-class label space.
///
/// The classifier comes back in training mode; load fine-tuned weights and
/// call `eval()` before predicting.
///
/// # Example
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use morphview::{resolve, ImageClassifier, ModelManager, RuntimeConfig};
///
/// let manager = ModelManager::new_default()?;
/// if let Some(mut model) = resolve("dinov2small", &manager, &RuntimeConfig::default()).await? {
///     model.load_weights("dinov2small_fold1.json")?;
///     model.eval();
/// }
/// # Ok(())
/// # }
/// ```
pub async fn resolve(
    identifier: &str,
    manager: &ModelManager,
    config: &RuntimeConfig,
) -> Result<Option<OnnxClassifier>, ClassifierError> {
    let Some(spec) = models::lookup(identifier) else {
        info!("No model registered for identifier '{}'", identifier);
        return Ok(None);
    };

    ClassifierBuilder::new(spec)
        .with_runtime_config(config.clone())
        .build(manager)
        .await
        .map(Some)
}

/// Builds an [`OnnxClassifier`] for one row of the model table.
#[derive(Debug)]
pub struct ClassifierBuilder {
    spec: &'static ModelSpec,
    runtime_config: RuntimeConfig,
    backbone: Option<PathBuf>,
    seed: Option<u64>,
}

impl ClassifierBuilder {
    pub fn new(spec: &'static ModelSpec) -> Self {
        Self {
            spec,
            runtime_config: RuntimeConfig::default(),
            backbone: None,
            seed: None,
        }
    }

    /// Sets the runtime configuration (threads, optimization level, device)
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Uses a fine-tuned ONNX backbone instead of the hub's pretrained one.
    ///
    /// The hub config is still fetched to size the head; the pretrained
    /// backbone is not downloaded.
    pub fn with_backbone(mut self, path: impl Into<PathBuf>) -> Self {
        self.backbone = Some(path.into());
        self
    }

    /// Seeds the initialization of replaced heads
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn build(self, manager: &ModelManager) -> Result<OnnxClassifier, ClassifierError> {
        let spec = self.spec;
        info!("Resolving {} ({}) from {}", spec.identifier, spec.architecture, spec.repository);

        let model_path = match self.backbone {
            Some(path) => {
                manager.fetch(spec, HubFile::Config).await?;
                info!("Using fine-tuned backbone {:?}", path);
                path
            }
            None => {
                manager.ensure_model_downloaded(spec).await?;
                manager.get_file_path(spec, HubFile::Backbone)
            }
        };

        let config = HubConfig::from_file(manager.get_file_path(spec, HubFile::Config))?;
        let in_features = spec.architecture.feature_width(&config).ok_or_else(|| {
            ClassifierError::BuildError(format!(
                "Config for {} does not describe the feature width of a {} backbone",
                spec.identifier, spec.architecture
            ))
        })?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        // Shapes come from the config, so a mismatched head is never downloaded
        let expected = [spec.num_labels, in_features];
        let pretrained_shape = config
            .pretrained_num_labels(spec.architecture)
            .map(|labels| [labels, in_features]);
        let pretrained = match plan_head(spec, pretrained_shape, expected)? {
            HeadPlan::KeepPretrained => {
                let path = manager.fetch(spec, HubFile::Classifier).await?;
                Some(ClassificationHead::from_state_dict(&StateDict::from_file(path)?)?)
            }
            HeadPlan::Reinitialize => None,
        };
        let head = reconcile_head(spec, pretrained, in_features, &mut rng)?;

        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(&model_path)
            .map_err(|e| {
                error!("Failed to load backbone {:?}: {}", model_path, e);
                ClassifierError::BuildError(format!("Failed to load backbone: {}", e))
            })?;
        info!("Backbone loaded on {}", self.runtime_config.device);

        OnnxClassifier::new(spec, model_path, session, head, self.runtime_config.device)
    }
}
