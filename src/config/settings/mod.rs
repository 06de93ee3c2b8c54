
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Session collections older than this are removed by the cleanup sweep.
    pub cleanup_hours: u64,
}

impl Default for SessionConfig {
    #[inline]
    fn default() -> Self {
        Self { cleanup_hours: 24 }
    }
}

impl SessionConfig {
    #[inline]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cleanup_hours as i64)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid target chunk size: {0} (must be between 100 and 2048)")]
    InvalidTargetTokens(usize),
    #[error("Invalid max chunk size: {0} (must be between 200 and 4096)")]
    InvalidMaxTokens(usize),
    #[error("Invalid min chunk size: {0} (must be between 50 and 1024)")]
    InvalidMinTokens(usize),
    #[error("Invalid overlap size: {0} (must be between 0 and 512)")]
    InvalidOverlapTokens(usize),
    #[error("Max chunk size ({0}) must be greater than target chunk size ({1})")]
    MaxTokensTooSmall(usize, usize),
    #[error("Target chunk size ({0}) must be greater than min chunk size ({1})")]
    TargetTokensTooSmall(usize, usize),
    #[error("Overlap size ({0}) must be smaller than target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid session cleanup hours: {0} (must be between 1 and 8760)")]
    InvalidCleanupHours(u64),
    #[error("Invalid value for {0}: {1}")]
    InvalidEnvVar(&'static str, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration from `<base_dir>/config.toml` (falling back to
    /// defaults when the file is absent), apply environment overrides,
    /// and validate.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let config_path = base_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };
        config.base_dir = base_dir.as_ref().to_path_buf();

        config.apply_env_overrides()?;
        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Apply the environment variables the service recognizes:
    /// CHUNK_TARGET_TOKENS, CHUNK_MIN_TOKENS, CHUNK_MAX_TOKENS,
    /// CHUNK_OVERLAP_TOKENS, EMBEDDING_MODEL_NAME, SESSION_CLEANUP_HOURS.
    #[inline]
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_usize("CHUNK_TARGET_TOKENS")? {
            self.chunking.target_tokens = value;
        }
        if let Some(value) = env_usize("CHUNK_MIN_TOKENS")? {
            self.chunking.min_tokens = value;
        }
        if let Some(value) = env_usize("CHUNK_MAX_TOKENS")? {
            self.chunking.max_tokens = value;
        }
        if let Some(value) = env_usize("CHUNK_OVERLAP_TOKENS")? {
            self.chunking.overlap_tokens = value;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL_NAME")
            && !model.trim().is_empty()
        {
            self.ollama.model = model;
        }
        if let Ok(raw) = std::env::var("SESSION_CLEANUP_HOURS") {
            self.session.cleanup_hours = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("SESSION_CLEANUP_HOURS", raw))?;
        }
        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking()?;

        if self.session.cleanup_hours == 0 || self.session.cleanup_hours > 8760 {
            return Err(ConfigError::InvalidCleanupHours(self.session.cleanup_hours));
        }

        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if !(100..=2048).contains(&chunking.target_tokens) {
            return Err(ConfigError::InvalidTargetTokens(chunking.target_tokens));
        }
        if !(200..=4096).contains(&chunking.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(chunking.max_tokens));
        }
        if !(50..=1024).contains(&chunking.min_tokens) {
            return Err(ConfigError::InvalidMinTokens(chunking.min_tokens));
        }
        if chunking.overlap_tokens > 512 {
            return Err(ConfigError::InvalidOverlapTokens(chunking.overlap_tokens));
        }

        if chunking.max_tokens <= chunking.target_tokens {
            return Err(ConfigError::MaxTokensTooSmall(
                chunking.max_tokens,
                chunking.target_tokens,
            ));
        }
        if chunking.target_tokens <= chunking.min_tokens {
            return Err(ConfigError::TargetTokensTooSmall(
                chunking.target_tokens,
                chunking.min_tokens,
            ));
        }
        if chunking.overlap_tokens >= chunking.target_tokens {
            return Err(ConfigError::OverlapTooLarge(
                chunking.overlap_tokens,
                chunking.target_tokens,
            ));
        }

        Ok(())
    }

    /// Get the base directory for application data
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path for the SQLite session registry
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("sessions.db")
    }

    /// Path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            session: SessionConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

fn env_usize(name: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar(name, raw)),
        Err(_) => Ok(None),
    }
}
