//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use neurostudy_core::{AccessRole, SyncPolicy};
use tracing::Level;

/// Binary sources above this size go through the resumable upload protocol.
pub const DEFAULT_INLINE_UPLOAD_LIMIT: usize = 15 * 1024 * 1024;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Directory backing the local key/value store.
    pub data_dir: PathBuf,
    /// Enables the remote table when present.
    pub database_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub access_role: AccessRole,
    pub sync_policy: SyncPolicy,
    pub inline_upload_limit: usize,
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: Level::INFO,
            data_dir: PathBuf::from("./data"),
            database_url: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            access_role: AccessRole::Standard,
            sync_policy: SyncPolicy::RemoteWins,
            inline_upload_limit: DEFAULT_INLINE_UPLOAD_LIMIT,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

fn parse_access_role(raw: &str) -> Result<AccessRole, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "standard" => Ok(AccessRole::Standard),
        "privileged" | "pro" => Ok(AccessRole::Privileged),
        other => Err(ConfigError::InvalidValue(
            "ACCESS_ROLE".to_string(),
            format!("'{}' is not 'standard' or 'privileged'", other),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Config::default();

        // --- Load Server Settings ---
        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            Err(_) => defaults.bind_address,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        // --- Load Storage Settings ---
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let access_role = match std::env::var("ACCESS_ROLE") {
            Ok(raw) => parse_access_role(&raw)?,
            Err(_) => defaults.access_role,
        };
        let sync_policy = match std::env::var("SYNC_POLICY") {
            Ok(raw) => raw
                .parse::<SyncPolicy>()
                .map_err(|e| ConfigError::InvalidValue("SYNC_POLICY".to_string(), e))?,
            Err(_) => defaults.sync_policy,
        };

        // --- Load Generation Provider Settings ---
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok().filter(|v| !v.trim().is_empty());
        let gemini_model = std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model);
        let gemini_base_url = std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url);

        let inline_upload_limit = match std::env::var("INLINE_UPLOAD_LIMIT_BYTES") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("INLINE_UPLOAD_LIMIT_BYTES".to_string(), e.to_string())
            })?,
            Err(_) => defaults.inline_upload_limit,
        };

        Ok(Self {
            bind_address,
            log_level,
            data_dir,
            database_url,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            access_role,
            sync_policy,
            inline_upload_limit,
            cors_origin,
        })
    }
}
