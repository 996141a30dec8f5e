use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::model_manager::ModelError;

/// Number of morphology classes every resolved model predicts.
pub const NUM_LABELS: usize = 18;

/// Class names in the order of the model's output vector.
pub const CLASS_NAMES: [&str; NUM_LABELS] = [
    "AmorfHead",
    "AsymmetricNeck",
    "CurlyTail",
    "DoubleHead",
    "DoubleTail",
    "LongTail",
    "NArrowAcrosome",
    "Normal",
    "PinHead",
    "PyriformHead",
    "RoundHead",
    "ShortTail",
    "TaperedHead",
    "ThickNeck",
    "ThinNeck",
    "TwistedNeck",
    "TwistedTail",
    "VacuolatedHead",
];

/// Backbone families the resolver knows how to attach a head to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    ConvNextV2,
    DeiT,
    Beit,
    Dinov2,
    Swinv2,
}

impl Architecture {
    /// Width of the pooled feature vector the classification head consumes.
    ///
    /// Returns `None` when the hub config lacks the fields this family needs.
    pub fn feature_width(&self, config: &HubConfig) -> Option<usize> {
        match self {
            Self::ConvNextV2 => config.hidden_sizes.last().copied(),
            Self::DeiT | Self::Beit => config.hidden_size,
            // CLS token and mean patch token are concatenated before the head
            Self::Dinov2 => config.hidden_size.map(|h| h * 2),
            Self::Swinv2 => config.hidden_size.or_else(|| {
                let stages = config.depths.len().checked_sub(1)?;
                config.embed_dim.map(|dim| dim << stages)
            }),
        }
    }

    /// Hub architecture name of this family's image-classification model.
    pub fn head_class(&self) -> &'static str {
        match self {
            Self::ConvNextV2 => "ConvNextV2ForImageClassification",
            Self::DeiT => "DeiTForImageClassification",
            Self::Beit => "BeitForImageClassification",
            Self::Dinov2 => "Dinov2ForImageClassification",
            Self::Swinv2 => "Swinv2ForImageClassification",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConvNextV2 => "ConvNeXtV2",
            Self::DeiT => "DeiT",
            Self::Beit => "BEiT",
            Self::Dinov2 => "DINOv2",
            Self::Swinv2 => "Swinv2",
        };
        f.write_str(name)
    }
}

/// What to do when the pretrained classification head does not have the
/// requested number of outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadPolicy {
    /// Replace the mismatched head with a freshly initialized one.
    Tolerant,
    /// Treat any head shape mismatch as an error.
    Strict,
}

/// One row of the model dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Token expected as the file-name prefix of fine-tuned weights
    pub identifier: &'static str,
    pub architecture: Architecture,
    /// Hub repository holding the pretrained backbone
    pub repository: &'static str,
    /// Output width of the classification head
    pub num_labels: usize,
    pub head_policy: HeadPolicy,
}

/// The closed set of models the viewer can resolve.
pub static MODEL_TABLE: [ModelSpec; 6] = [
    ModelSpec {
        identifier: "convnextv2tiny",
        architecture: Architecture::ConvNextV2,
        repository: "facebook/convnextv2-tiny-22k-224",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Tolerant,
    },
    ModelSpec {
        identifier: "deitbase",
        architecture: Architecture::DeiT,
        repository: "facebook/deit-base-distilled-patch16-224",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Strict,
    },
    ModelSpec {
        identifier: "beitbase",
        architecture: Architecture::Beit,
        repository: "microsoft/beit-base-patch16-224-pt22k",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Strict,
    },
    ModelSpec {
        identifier: "dinov2small",
        architecture: Architecture::Dinov2,
        repository: "facebook/dinov2-small",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Tolerant,
    },
    ModelSpec {
        identifier: "swinv2tiny",
        architecture: Architecture::Swinv2,
        repository: "microsoft/swinv2-tiny-patch4-window8-256",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Tolerant,
    },
    ModelSpec {
        identifier: "convnextv2large",
        architecture: Architecture::ConvNextV2,
        repository: "facebook/convnextv2-large-22k-224",
        num_labels: NUM_LABELS,
        head_policy: HeadPolicy::Tolerant,
    },
];

/// Looks up a model by exact identifier match.
pub fn lookup(identifier: &str) -> Option<&'static ModelSpec> {
    MODEL_TABLE.iter().find(|spec| spec.identifier == identifier)
}

/// Extracts the model identifier from a weights file name of the form
/// `<identifier>_<rest>`.
///
/// Only the file name is inspected; underscores in parent directories are
/// ignored.
///
/// # Example
/// ```
/// use morphview::models::identifier_from_path;
///
/// let id = identifier_from_path("/data/runs/deitbase_fold3.json").unwrap();
/// assert_eq!(id, "deitbase");
/// ```
pub fn identifier_from_path<P: AsRef<Path>>(path: P) -> Result<String, ModelError> {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let prefix = PREFIX.get_or_init(|| Regex::new(r"^([^_]+)_").expect("static regex is valid"));

    let path = path.as_ref();
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| prefix.captures(name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ModelError::UnrecognizedFileName(path.to_path_buf()))
}

/// The subset of a hub `config.json` needed to size the classification head.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub id2label: BTreeMap<String, String>,
    pub hidden_size: Option<usize>,
    #[serde(default)]
    pub hidden_sizes: Vec<usize>,
    pub embed_dim: Option<usize>,
    #[serde(default)]
    pub depths: Vec<usize>,
}

impl HubConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Whether the checkpoint carries the `classifier.*` head a model of
    /// `architecture` uses.
    ///
    /// Only the family's plain `...ForImageClassification` class stores that
    /// head. Distilled (`...WithTeacher`) and masked-image-modeling
    /// checkpoints keep other tensors, so they count as headless.
    pub fn has_classification_head(&self, architecture: Architecture) -> bool {
        let head_class = architecture.head_class();
        self.architectures.iter().any(|arch| arch == head_class)
    }

    /// Output width of the pretrained head, if the checkpoint has one a
    /// model of `architecture` can load.
    pub fn pretrained_num_labels(&self, architecture: Architecture) -> Option<usize> {
        self.has_classification_head(architecture)
            .then_some(self.id2label.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> HubConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lookup_known_identifiers() {
        for id in ["convnextv2tiny", "deitbase", "beitbase", "dinov2small", "swinv2tiny", "convnextv2large"] {
            let spec = lookup(id).unwrap();
            assert_eq!(spec.identifier, id);
            assert_eq!(spec.num_labels, 18);
        }
    }

    #[test]
    fn test_lookup_unknown_identifier() {
        assert!(lookup("unknown").is_none());
        assert!(lookup("").is_none());
        assert!(lookup("DeiTBase").is_none());
    }

    #[test]
    fn test_table_has_unique_identifiers() {
        for (i, a) in MODEL_TABLE.iter().enumerate() {
            for b in &MODEL_TABLE[i + 1..] {
                assert_ne!(a.identifier, b.identifier);
            }
        }
    }

    #[test]
    fn test_strict_policies() {
        let strict: Vec<_> = MODEL_TABLE
            .iter()
            .filter(|spec| spec.head_policy == HeadPolicy::Strict)
            .map(|spec| spec.identifier)
            .collect();
        assert_eq!(strict, vec!["deitbase", "beitbase"]);
    }

    #[test]
    fn test_identifier_from_file_name_only() {
        assert_eq!(identifier_from_path("/home/lab_user/models/swinv2tiny_best.json").unwrap(), "swinv2tiny");
        assert_eq!(identifier_from_path("convnextv2large_a_b_c.json").unwrap(), "convnextv2large");
    }

    #[test]
    fn test_identifier_requires_underscore_prefix() {
        assert!(matches!(
            identifier_from_path("/models/deitbase.json"),
            Err(ModelError::UnrecognizedFileName(_))
        ));
        assert!(identifier_from_path("/models/_deitbase.json").is_err());
        assert!(identifier_from_path("/").is_err());
    }

    #[test]
    fn test_feature_width_per_family() {
        let convnext = config(r#"{"hidden_sizes": [96, 192, 384, 768]}"#);
        assert_eq!(Architecture::ConvNextV2.feature_width(&convnext), Some(768));

        let vit = config(r#"{"hidden_size": 768}"#);
        assert_eq!(Architecture::DeiT.feature_width(&vit), Some(768));
        assert_eq!(Architecture::Beit.feature_width(&vit), Some(768));

        let dino = config(r#"{"hidden_size": 384}"#);
        assert_eq!(Architecture::Dinov2.feature_width(&dino), Some(768));

        let swin = config(r#"{"embed_dim": 96, "depths": [2, 2, 6, 2]}"#);
        assert_eq!(Architecture::Swinv2.feature_width(&swin), Some(768));

        assert_eq!(Architecture::ConvNextV2.feature_width(&HubConfig::default()), None);
        assert_eq!(Architecture::Swinv2.feature_width(&HubConfig::default()), None);
    }

    #[test]
    fn test_pretrained_head_detection() {
        let deit = config(
            r#"{"architectures": ["DeiTForImageClassification"],
                "id2label": {"0": "tench", "1": "goldfish", "2": "shark"}}"#,
        );
        assert_eq!(deit.pretrained_num_labels(Architecture::DeiT), Some(3));
        // a DeiT head is no use to another family
        assert_eq!(deit.pretrained_num_labels(Architecture::Beit), None);

        let beit = config(
            r#"{"architectures": ["BeitForMaskedImageModeling"],
                "id2label": {"0": "LABEL_0", "1": "LABEL_1"}}"#,
        );
        assert_eq!(beit.pretrained_num_labels(Architecture::Beit), None);
    }

    #[test]
    fn test_distilled_deit_has_no_usable_head() {
        // shape of facebook/deit-base-distilled-patch16-224: cls and
        // distillation heads over 1000 ImageNet classes, no `classifier.*`
        let id2label: BTreeMap<String, String> = (0..1000).map(|i| (i.to_string(), format!("class_{}", i))).collect();
        let deit = HubConfig {
            architectures: vec!["DeiTForImageClassificationWithTeacher".to_string()],
            id2label,
            hidden_size: Some(768),
            ..Default::default()
        };

        assert!(!deit.has_classification_head(Architecture::DeiT));
        assert_eq!(deit.pretrained_num_labels(Architecture::DeiT), None);
        assert_eq!(Architecture::DeiT.feature_width(&deit), Some(768));
    }
}
