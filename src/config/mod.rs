/// Configuration system for semdex
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, SemdexError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// File eligibility rules
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// On-disk locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Indexing worker tuning
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Filesystem watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider backend: "ollama" or "fastembed"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "nomic-embed-text", "all-MiniLM-L6-v2")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Ollama server URL
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// File eligibility configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Extensions (with leading dot) that are eligible for indexing
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns matched against any part of a path
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// LanceDB data directory path
    #[serde(default = "default_lancedb_path")]
    pub lancedb_path: PathBuf,

    /// Directory registry file
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Active embedding space metadata file
    #[serde(default = "default_space_path")]
    pub space_path: PathBuf,

    /// Single-writer lock file
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
}

/// Indexing worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long the drain loop idles when the queue is empty
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// How often the daemon re-reads the directory registry
    #[serde(default = "default_registry_sync_secs")]
    pub registry_sync_secs: u64,
}

/// Filesystem watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_watcher_enabled")]
    pub enabled: bool,

    /// Debounce window for filesystem events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default minimum similarity score (0.0 to 1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,
}

// Default value functions
fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model_name() -> String {
    "nomic-embed-text".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_extensions() -> Vec<String> {
    vec![".md".to_string(), ".txt".to_string()]
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        ".git".to_string(),
        "*.min.js".to_string(),
        "*.min.css".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    102_400 // 100 KB
}

fn default_lancedb_path() -> PathBuf {
    crate::paths::PlatformPaths::default_lancedb_path()
}

fn default_registry_path() -> PathBuf {
    crate::paths::PlatformPaths::default_registry_path()
}

fn default_space_path() -> PathBuf {
    crate::paths::PlatformPaths::default_space_path()
}

fn default_lock_path() -> PathBuf {
    crate::paths::PlatformPaths::default_lock_path()
}

fn default_idle_poll_ms() -> u64 {
    1000
}

fn default_registry_sync_secs() -> u64 {
    5
}

fn default_watcher_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_min_score() -> f32 {
    0.0
}

fn default_result_limit() -> usize {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            ollama_host: default_ollama_host(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lancedb_path: default_lancedb_path(),
            registry_path: default_registry_path(),
            space_path: default_space_path(),
            lock_path: default_lock_path(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            registry_sync_secs: default_registry_sync_secs(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_watcher_enabled(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            limit: default_result_limit(),
        }
    }
}

impl StorageConfig {
    /// Put every store file under one directory (tests and `--data-dir`)
    pub fn under(dir: &Path) -> Self {
        Self {
            lancedb_path: dir.join("lancedb"),
            registry_path: dir.join("directories.json"),
            space_path: dir.join("embedding_space.json"),
            lock_path: dir.join("writer.lock"),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, SemdexError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, SemdexError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), SemdexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SemdexError> {
        if self.embedding.provider != "ollama" && self.embedding.provider != "fastembed" {
            return Err(invalid(
                "embedding.provider",
                format!(
                    "must be 'ollama' or 'fastembed', got '{}'",
                    self.embedding.provider
                ),
            ));
        }

        if self.embedding.model_name.trim().is_empty() {
            return Err(invalid("embedding.model_name", "must not be empty"));
        }

        if self.embedding.timeout_secs == 0 {
            return Err(invalid("embedding.timeout_secs", "must be greater than 0"));
        }

        if self.indexing.extensions.is_empty() {
            return Err(invalid("indexing.extensions", "must list at least one extension"));
        }

        if let Some(ext) = self
            .indexing
            .extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(invalid(
                "indexing.extensions",
                format!("'{}' must start with a dot, e.g. '.md'", ext),
            ));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if self.worker.idle_poll_ms == 0 {
            return Err(invalid("worker.idle_poll_ms", "must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(invalid(
                "search.min_score",
                format!("must be between 0.0 and 1.0, got {}", self.search.min_score),
            ));
        }

        if self.search.limit == 0 {
            return Err(invalid("search.limit", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("SEMDEX_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("SEMDEX_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(host) = std::env::var("SEMDEX_OLLAMA_HOST") {
            self.embedding.ollama_host = host;
        }

        if let Ok(dir) = std::env::var("SEMDEX_DATA_DIR") {
            self.storage = StorageConfig::under(Path::new(&dir));
        }

        if let Ok(size) = std::env::var("SEMDEX_MAX_FILE_SIZE")
            && let Ok(size) = size.parse()
        {
            self.indexing.max_file_size = size;
        }

        if let Ok(min_score) = std::env::var("SEMDEX_MIN_SCORE")
            && let Ok(score) = min_score.parse()
        {
            self.search.min_score = score;
        }
    }

    /// Create a new Config from the given file (or the default location) plus env overrides
    pub fn new(path: Option<&Path>) -> Result<Self, SemdexError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> SemdexError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}
