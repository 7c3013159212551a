//! Pipeline configuration storage
//!
//! A single `config.json` in the data directory. Missing sections fall back
//! to their defaults, so older files keep loading as fields are added.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{defaults, limits, paths};

/// Model server connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. `http://127.0.0.1:11434`
    pub base_url: String,
    /// API key for hosted providers
    pub api_key: Option<String>,
    /// Default chat model; a request's model id overrides it
    pub chat_model: String,
    pub embedding_model: String,
    /// Add E5 `passage: ` / `query: ` prefixes and normalize vectors
    #[serde(default = "default_true")]
    pub e5_prefixes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            api_key: None,
            chat_model: defaults::CHAT_MODEL.to_string(),
            embedding_model: defaults::EMBEDDING_MODEL.to_string(),
            e5_prefixes: true,
        }
    }
}

/// Chunking and ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks per embedding request
    pub batch_size: usize,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let chunking = retrieval::ChunkConfig::default();
        Self {
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            batch_size: 10,
            top_k: limits::RETRIEVAL_TOP_K,
        }
    }
}

/// Chart rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter that runs chart scripts
    pub interpreter: String,
    pub timeout_secs: u64,
    /// Rows sampled for planning and revalidation
    pub max_sample_rows: usize,
    /// Points drawn per chart
    pub max_points: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        use chart_sandbox::defaults as sandbox;
        Self {
            interpreter: sandbox::INTERPRETER.to_string(),
            timeout_secs: sandbox::SCRIPT_TIMEOUT_SECS,
            max_sample_rows: sandbox::MAX_SAMPLE_ROWS,
            max_points: sandbox::MAX_POINTS,
        }
    }
}

/// Preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Rows read and written when a plan is applied; longer files are cut
    pub max_rows: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_rows: limits::PREPROCESS_MAX_ROWS,
        }
    }
}

/// Storage locations; relative paths resolve against the data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub index_dir: Option<PathBuf>,
    pub preprocessed_dir: Option<PathBuf>,
    pub dataset_manifest: Option<PathBuf>,
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Load configuration from disk, or defaults when no file exists yet
    pub async fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = data_dir.join(paths::CONFIG_FILE);

        if !fs::try_exists(&config_path).await? {
            log::debug!("No configuration at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).await?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(data_dir).await?;

        let config_path = data_dir.join(paths::CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(&config_path, contents).await?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn index_dir(&self, data_dir: &Path) -> PathBuf {
        resolve(data_dir, self.storage.index_dir.as_deref(), paths::INDEX_DIR)
    }

    pub fn preprocessed_dir(&self, data_dir: &Path) -> PathBuf {
        resolve(
            data_dir,
            self.storage.preprocessed_dir.as_deref(),
            paths::PREPROCESSED_DIR,
        )
    }

    pub fn dataset_manifest(&self, data_dir: &Path) -> PathBuf {
        resolve(
            data_dir,
            self.storage.dataset_manifest.as_deref(),
            paths::DATASET_MANIFEST,
        )
    }
}

fn resolve(data_dir: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => data_dir.join(path),
        None => data_dir.join(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}
