//! Configuration management for the pdfmerge bot.
//!
//! Configuration lives in a single JSON file at `~/.pdfmerge/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (PDFMERGE_* prefix)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PDFMERGE_BOT_TOKEN` (fallback: `TELEGRAM_BOT_TOKEN`) → telegram.bot_token
//! - `PDFMERGE_HEALTH_PORT` → health.port
//! - `PDFMERGE_LOG_LEVEL` → observability.log_level
//! - `PDFMERGE_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pdfmerge"),
        |dirs| dirs.home_dir().join(".pdfmerge"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Usernames or numeric user IDs allowed to talk to the bot.
    /// `"*"` allows everyone.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout passed to getUpdates, in seconds
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}

fn default_poll_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Merge Configuration
// ============================================================================

/// Limits and paths for the merge workflow.
///
/// The limits are configuration, not contracts: deployments may raise or
/// lower them without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum number of documents per session
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum declared size per document, in bytes
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Maximum cumulative declared size per merge, in bytes
    #[serde(default = "default_max_total_size_bytes")]
    pub max_total_size_bytes: u64,

    /// Scratch directory for per-merge artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Canonical output file name (suffixed on collision)
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size_bytes(),
            max_total_size_bytes: default_max_total_size_bytes(),
            work_dir: default_work_dir(),
            output_name: default_output_name(),
        }
    }
}

fn default_max_files() -> usize {
    5
}

fn default_max_file_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_total_size_bytes() -> u64 {
    15 * 1024 * 1024
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("merged_pdfs")
}

fn default_output_name() -> String {
    "merged.pdf".into()
}

// ============================================================================
// Health Server Configuration
// ============================================================================

/// Keep-alive HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Whether to serve the health endpoint at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_health_host")]
    pub host: String,

    /// Port for the health endpoint
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_health_host(),
            port: default_health_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_health_host() -> String {
    "127.0.0.1".into()
}

fn default_health_port() -> u16 {
    8190
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Top-level Configuration
// ============================================================================

/// Unified configuration for the pdfmerge bot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::info!("Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("PDFMERGE_BOT_TOKEN") {
            self.telegram.bot_token = token;
        } else if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }

        if let Ok(port) = std::env::var("PDFMERGE_HEALTH_PORT") {
            if let Ok(p) = port.parse() {
                self.health.port = p;
            }
        }

        if let Ok(level) = std::env::var("PDFMERGE_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(format) = std::env::var("PDFMERGE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Validate the configuration before starting the bot.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.telegram.bot_token.is_empty() {
            return Err(crate::error::Error::Config(
                "telegram.bot_token is empty; set it in the config file or PDFMERGE_BOT_TOKEN"
                    .into(),
            ));
        }
        if self.merge.max_files == 0 {
            return Err(crate::error::Error::Config(
                "merge.max_files must be at least 1".into(),
            ));
        }
        if self.merge.max_file_size_bytes == 0 || self.merge.max_total_size_bytes == 0 {
            return Err(crate::error::Error::Config(
                "merge size limits must be non-zero".into(),
            ));
        }
        if self.merge.max_file_size_bytes > self.merge.max_total_size_bytes {
            return Err(crate::error::Error::Config(
                "merge.max_file_size_bytes exceeds merge.max_total_size_bytes".into(),
            ));
        }
        Ok(())
    }
}
