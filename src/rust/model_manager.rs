use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use reqwest;
use sha2::{Sha256, Digest};
use dirs;
use log;

use crate::models::ModelSpec;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";
const HUB_REVISION: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Hub returned {status} for {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid model config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    #[error("File name {0:?} does not start with '<model>_'")]
    UnrecognizedFileName(PathBuf),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Files fetched from the hub for a pretrained checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubFile {
    /// `config.json` describing the architecture and pretrained labels
    Config,
    /// ONNX export of the backbone, emitting pooled features
    Backbone,
    /// Pretrained classification head as a JSON state dict
    Classifier,
}

impl HubFile {
    pub fn remote_path(&self) -> &'static str {
        match self {
            Self::Config => "config.json",
            Self::Backbone => "onnx/model.onnx",
            Self::Classifier => "classifier.json",
        }
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Config => "config.json",
            Self::Backbone => "model.onnx",
            Self::Classifier => "classifier.json",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Backbone => "backbone",
            Self::Classifier => "classifier",
        }
    }
}

/// Downloads pretrained checkpoints from the model hub and keeps them in a
/// local cache, one directory per model identifier.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    endpoint: String,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory and hub endpoint
    pub fn new_default() -> io::Result<Self> {
        Ok(Self::new(Self::get_default_models_dir())?.with_endpoint(Self::get_default_endpoint()))
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        Self::models_dir_from(env::var_os("MORPHVIEW_CACHE").map(PathBuf::from))
    }

    /// Models directory under `cache_override` when given, otherwise under
    /// the platform cache directory
    fn models_dir_from(cache_override: Option<PathBuf>) -> PathBuf {
        // 1. Explicit cache root
        if let Some(path) = cache_override {
            return path.join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("morphview").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("morphview").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("morphview").join("models")
    }

    /// Returns the hub endpoint, honoring `MORPHVIEW_HUB_ENDPOINT`
    pub fn get_default_endpoint() -> String {
        env::var("MORPHVIEW_HUB_ENDPOINT")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_HUB_ENDPOINT.to_string())
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn file_url(&self, spec: &ModelSpec, file: HubFile) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint,
            spec.repository,
            HUB_REVISION,
            file.remote_path()
        )
    }

    pub fn get_file_path(&self, spec: &ModelSpec, file: HubFile) -> PathBuf {
        self.models_dir.join(spec.identifier).join(file.local_name())
    }

    fn hash_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".sha256");
        PathBuf::from(name)
    }

    pub fn is_downloaded(&self, spec: &ModelSpec, file: HubFile) -> bool {
        let path = self.get_file_path(spec, file);
        let exists = path.exists() && Self::hash_path(&path).exists();
        log::debug!("{} file {:?} cached: {}", file.label(), path, exists);
        exists
    }

    pub fn is_model_downloaded(&self, spec: &ModelSpec) -> bool {
        self.is_downloaded(spec, HubFile::Config) && self.is_downloaded(spec, HubFile::Backbone)
    }

    fn compute_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    fn verify_file(&self, path: &Path) -> Result<bool, ModelError> {
        log::info!("Verifying file: {:?}", path);
        let hash_path = Self::hash_path(path);
        if !path.exists() || !hash_path.exists() {
            return Ok(false);
        }
        let expected = fs::read_to_string(&hash_path)?;
        let bytes = fs::read(path)?;
        let hash = Self::compute_hash(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected.trim());
        Ok(hash == expected.trim())
    }

    /// Checks every cached file of the checkpoint against its recorded hash.
    pub fn verify_model(&self, spec: &ModelSpec) -> Result<bool, ModelError> {
        let config_ok = self.verify_file(&self.get_file_path(spec, HubFile::Config))?;
        let backbone_ok = self.verify_file(&self.get_file_path(spec, HubFile::Backbone))?;
        log::info!("Verification results for {}: config {}, backbone {}", spec.identifier, config_ok, backbone_ok);
        Ok(config_ok && backbone_ok)
    }

    async fn download_file(&self, url: &str, path: &Path, file_type: &str) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?;
        log::info!("Download response status: {}", response.status());
        if !response.status().is_success() {
            return Err(ModelError::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());
        let hash = Self::compute_hash(&bytes);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, &bytes)?;
        fs::write(Self::hash_path(path), &hash)?;

        // Verify after writing
        if !self.verify_file(path)? {
            let actual = Self::compute_hash(&fs::read(path)?);
            return Err(ModelError::HashMismatch {
                file_type: file_type.to_string(),
                expected: hash,
                actual,
            });
        }

        log::info!("{} file downloaded and verified successfully", file_type);
        Ok(())
    }

    /// Returns the local path of a checkpoint file, downloading it if it is
    /// missing or fails verification.
    pub async fn fetch(&self, spec: &ModelSpec, file: HubFile) -> Result<PathBuf, ModelError> {
        let _lock = self.download_lock.lock().await;
        let path = self.get_file_path(spec, file);

        if self.verify_file(&path)? {
            log::info!("Existing {} file verified successfully", file.label());
            return Ok(path);
        }
        if path.exists() {
            log::warn!("{} file verification failed, redownloading", file.label());
        }

        let url = self.file_url(spec, file);
        if let Err(e) = self.download_file(&url, &path, file.label()).await {
            log::error!("Failed to fetch {} file for {}: {}", file.label(), spec.identifier, e);
            let _ = fs::remove_file(&path);
            let _ = fs::remove_file(Self::hash_path(&path));
            return Err(e);
        }
        Ok(path)
    }

    /// Ensures the config and backbone of a checkpoint are cached and verified.
    pub async fn ensure_model_downloaded(&self, spec: &ModelSpec) -> Result<(), ModelError> {
        log::info!("Checking if model {} is downloaded...", spec.identifier);
        self.fetch(spec, HubFile::Config).await?;
        self.fetch(spec, HubFile::Backbone).await?;
        Ok(())
    }

    /// Places `contents` in the cache as if it had been downloaded.
    #[cfg(test)]
    pub(crate) fn seed_cache(&self, spec: &ModelSpec, file: HubFile, contents: &[u8]) -> Result<PathBuf, ModelError> {
        let path = self.get_file_path(spec, file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        fs::write(Self::hash_path(&path), Self::compute_hash(contents))?;
        Ok(path)
    }

    pub fn remove_download(&self, spec: &ModelSpec) -> Result<(), ModelError> {
        for file in [HubFile::Config, HubFile::Backbone, HubFile::Classifier] {
            let path = self.get_file_path(spec, file);
            if path.exists() {
                fs::remove_file(&path)?;
            }
            let hash_path = Self::hash_path(&path);
            if hash_path.exists() {
                fs::remove_file(&hash_path)?;
            }
        }
        Ok(())
    }
}
