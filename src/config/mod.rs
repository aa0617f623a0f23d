//! Configuration management for vidscribe
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use vidscribe::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `VIDSCRIBE__<section>__<key>`
//!
//! Examples:
//! - `VIDSCRIBE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `VIDSCRIBE__LIMITS__MAX_VIDEO_SIZE=200MB`
//! - `VIDSCRIBE__WORKER__WORKERS=8`
//!
//! Secrets are read only from the environment: `DASHSCOPE_API_KEY`,
//! `OSS_ACCESS_KEY_ID` / `OSS_ACCESS_KEY_SECRET` (or the AWS equivalents).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/vidscribe.toml`.
//! This can be overridden using the `VIDSCRIBE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, FetcherConfig, ProbeConfig, RetentionConfig, ServerConfig, StorageConfig,
    StorageProvider, TranscriptionConfig, VideoLimits, WorkerPoolConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`Config::load`], with an explicit file taking precedence over
    /// `VIDSCRIBE_CONFIG`.
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, skipping `.env` and secrets
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
