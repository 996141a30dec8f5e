//! A review viewer for sperm-morphology image classifiers.
//!
//! A fine-tuned head-weights file named `<identifier>_<anything>.json`
//! selects one of the pretrained backbones in [`models::MODEL_TABLE`]. The
//! backbone is fetched from the model hub (and cached), its classification
//! head is reconciled with the 18 morphology classes, and the fine-tuned
//! weights replace it. A fine-tuned ONNX export saved next to the weights
//! (`<identifier>_<anything>.onnx`) takes the place of the hub backbone.
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use morphview::{predict, resolve, ImageClassifier, ModelManager, RuntimeConfig, CLASS_NAMES};
//!
//! let manager = ModelManager::new_default()?;
//! let runtime = RuntimeConfig::default();
//!
//! let mut model = resolve("convnextv2tiny", &manager, &runtime)
//!     .await?
//!     .ok_or("unknown model")?;
//! model.load_weights("convnextv2tiny_fold3.json")?;
//! model.eval();
//!
//! let probabilities = predict(&model, "cells/sample_01.png")?;
//! for (name, p) in probabilities.labeled(&CLASS_NAMES) {
//!     println!("{}: {:.3}", name, p);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Device
//!
//! The compute device is part of [`RuntimeConfig`]. Probe it once at startup
//! and pass the config along:
//!
//! ```no_run
//! use morphview::{Device, RuntimeConfig};
//!
//! let runtime = RuntimeConfig::default().with_device(Device::probe());
//! ```

pub mod app;
pub mod classifier;
pub mod gallery;
pub mod model_manager;
pub mod models;
pub mod runtime;
pub mod session;

pub use classifier::{
    predict, predict_image, preprocess, resolve, ClassifierBuilder, ClassifierError, ClassifierInfo,
    ImageClassifier, Mode, ModelOutput, OnnxClassifier, ProbabilityVector, StateDict,
};
pub use gallery::{list_images, load_thumbnails, Thumbnail};
pub use model_manager::{ModelError, ModelManager};
pub use models::{
    identifier_from_path, lookup, Architecture, HeadPolicy, ModelSpec, CLASS_NAMES, MODEL_TABLE, NUM_LABELS,
};
pub use runtime::{create_session_builder, Device, RuntimeConfig};
pub use session::{fine_tuned_backbone, LoadOutcome, Prediction, ReviewSession};

/// Initializes `env_logger`, defaulting to the `info` level when `RUST_LOG`
/// is unset.
pub fn init_logger() {
    let env = env_logger::Env::default().default_filter_or("info");
    // a logger may already be installed (tests, embedding applications)
    let _ = env_logger::Builder::from_env(env).try_init();
}
