//! Configuration management.
//!
//! Configuration is loaded in layers: built-in defaults, an optional
//! `config/memoria-api.{yaml,toml}` file, then `MEMORIA__`-prefixed
//! environment variables (`.env` is honored via dotenvy). Use
//! [`ConfigValidator`] to check combinations before startup:
//!
//! ```rust,ignore
//! use memoria_api::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load()?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduler limits.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Memory subsystem configuration.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files.
    ///
    /// After loading, the configuration is validated. Use
    /// [`Self::load_unchecked`] to skip validation.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{}", e))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("memory.retrieval_default_limit", 10)?
            .add_source(config::File::with_name("config/memoria-api").required(false))
            .add_source(
                config::Environment::with_prefix("MEMORIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize().unwrap_or_default();

        // Convenience overrides outside the prefixed scheme
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            app_config.database.path = Some(path);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            app_config.logging.level = level;
        }

        Ok(app_config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path. Absent means an in-memory store.
    pub path: Option<String>,
}

/// Scheduler limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How many due intents a single pending query returns at most.
    #[serde(default = "default_pending_batch")]
    pub pending_batch_size: usize,
}

fn default_pending_batch() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pending_batch_size: default_pending_batch(),
        }
    }
}

/// Memory subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Default page size for retrieval.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_default_limit: usize,
    /// Maximum page size for retrieval.
    #[serde(default = "default_retrieval_max_limit")]
    pub retrieval_max_limit: usize,
}

fn default_retrieval_limit() -> usize {
    10
}

fn default_retrieval_max_limit() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retrieval_default_limit: default_retrieval_limit(),
            retrieval_max_limit: default_retrieval_max_limit(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
