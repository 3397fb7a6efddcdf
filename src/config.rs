//! Configuration management for AgregLLM
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AgregError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for AgregLLM
///
/// Every section is optional in the YAML file; missing fields take their
/// documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local store locations and write behavior
    #[serde(default)]
    pub storage: StorageConfig,
    /// Capture normalization settings
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Remote backup store settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file backing the add-on store (capture side)
    #[serde(default)]
    pub source_db: Option<PathBuf>,

    /// SQLite file backing the web-app store
    #[serde(default)]
    pub target_db: Option<PathBuf>,

    /// Compare-and-swap attempts before a write gives up
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: usize,
}

fn default_max_write_attempts() -> usize {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_db: None,
            target_db: None,
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

impl StorageConfig {
    /// Path of the add-on store, falling back to the platform data dir
    pub fn source_path(&self) -> Result<PathBuf> {
        match &self.source_db {
            Some(path) => Ok(path.clone()),
            None => Ok(default_data_dir()?.join("addon.db")),
        }
    }

    /// Path of the web-app store, falling back to the platform data dir
    pub fn target_path(&self) -> Result<PathBuf> {
        match &self.target_db {
            Some(path) => Ok(path.clone()),
            None => Ok(default_data_dir()?.join("webapp.db")),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "agregllm", "agregllm")
        .ok_or_else(|| AgregError::Storage("Could not determine data directory".into()))?;
    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)
        .context("Failed to create data directory")
        .map_err(|e| AgregError::Storage(e.to_string()))?;
    Ok(data_dir)
}

/// How much of a captured page is persisted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Store title, summary and explicit tags only; messages are dropped
    #[default]
    MetadataOnly,
    /// Convert, sort and deduplicate messages; suggest tags when none given
    Full,
}

impl std::str::FromStr for CaptureMode {
    type Err = AgregError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metadata_only" | "metadata" => Ok(CaptureMode::MetadataOnly),
            "full" => Ok(CaptureMode::Full),
            other => Err(AgregError::Config(format!("Invalid capture mode: {}", other))),
        }
    }
}

/// Capture normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub mode: CaptureMode,

    /// Character budget for summaries before truncation
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Summary used when the page provided none
    #[serde(default = "default_no_preview_text")]
    pub no_preview_text: String,

    /// Leading word of generated fallback titles
    #[serde(default = "default_title_kind")]
    pub title_kind: String,

    /// Shortest word accepted as a suggested tag
    #[serde(default = "default_tag_min_chars")]
    pub tag_min_chars: usize,

    /// Maximum number of suggested tags
    #[serde(default = "default_max_suggested_tags")]
    pub max_suggested_tags: usize,
}

fn default_summary_max_chars() -> usize {
    200
}

fn default_no_preview_text() -> String {
    "No preview available.".to_string()
}

fn default_title_kind() -> String {
    "Discussion".to_string()
}

fn default_tag_min_chars() -> usize {
    5
}

fn default_max_suggested_tags() -> usize {
    3
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::default(),
            summary_max_chars: default_summary_max_chars(),
            no_preview_text: default_no_preview_text(),
            title_kind: default_title_kind(),
            tag_min_chars: default_tag_min_chars(),
            max_suggested_tags: default_max_suggested_tags(),
        }
    }
}

/// Remote backup store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API base URL (overridable to point tests at a mock server)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the backup file inside the app-private folder
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Per-request timeout
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,

    /// Delay before the single retry of a transient failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_file_name() -> String {
    "agregllm_backup.json".to_string()
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            file_name: default_file_name(),
            timeout_seconds: default_remote_timeout(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents).map_err(AgregError::from)?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(path) = std::env::var("AGREGLLM_SOURCE_DB") {
            self.storage.source_db = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("AGREGLLM_TARGET_DB") {
            self.storage.target_db = Some(PathBuf::from(path));
        }

        if let Ok(mode) = std::env::var("AGREGLLM_CAPTURE_MODE") {
            match mode.parse() {
                Ok(value) => self.capture.mode = value,
                Err(_) => tracing::warn!("Invalid capture mode: {}, using default", mode),
            }
        }

        if let Ok(api_base) = std::env::var("AGREGLLM_REMOTE_API_BASE") {
            self.remote.api_base = api_base;
        }

        if let Ok(timeout) = std::env::var("AGREGLLM_REMOTE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.remote.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AGREGLLM_REMOTE_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.source_db {
            self.storage.source_db = Some(path.clone());
        }
        if let Some(path) = &cli.target_db {
            self.storage.target_db = Some(path.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `AgregError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_write_attempts == 0 {
            return Err(AgregError::Config(
                "storage.max_write_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.capture.summary_max_chars == 0 {
            return Err(AgregError::Config(
                "capture.summary_max_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.capture.max_suggested_tags > crate::model::MAX_TAGS {
            return Err(AgregError::Config(format!(
                "capture.max_suggested_tags must be at most {}",
                crate::model::MAX_TAGS
            ))
            .into());
        }

        if self.remote.timeout_seconds == 0 {
            return Err(AgregError::Config(
                "remote.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if url::Url::parse(&self.remote.api_base).is_err() {
            return Err(AgregError::Config(format!(
                "remote.api_base is not a valid URL: {}",
                self.remote.api_base
            ))
            .into());
        }

        if self.remote.file_name.trim().is_empty() {
            return Err(
                AgregError::Config("remote.file_name cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}
