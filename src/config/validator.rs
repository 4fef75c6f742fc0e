//! Configuration validation.
//!
//! All problems are collected into one report so a bad config file is fixed
//! in a single pass instead of one restart per mistake.

use super::error::{ConfigResult, ConfigurationError};
use super::AppConfig;

/// Validates configuration combinations at startup.
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    ///
    /// Returns `Ok(())` if valid, or a `ConfigurationError` with all issues.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if config.server.port == 0 {
            errors.push(ConfigurationError::invalid(
                "server.port is 0",
                "Set MEMORIA__SERVER__PORT to the port the API should listen on",
            ));
        }
        if config.server.timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "server.timeout_secs is 0",
                "Set MEMORIA__SERVER__TIMEOUT_SECS to a positive number of seconds",
            ));
        }

        if let Some(path) = &config.database.path {
            if path.trim().is_empty() {
                errors.push(ConfigurationError::invalid(
                    "database.path is set but empty",
                    "Set MEMORIA__DATABASE__PATH to a file path, or unset it to use \
                     the in-memory store",
                ));
            }
        }

        if config.scheduler.pending_batch_size == 0 {
            errors.push(ConfigurationError::invalid(
                "scheduler.pending_batch_size is 0",
                "Set MEMORIA__SCHEDULER__PENDING_BATCH_SIZE to at least 1",
            ));
        }

        if config.memory.retrieval_default_limit == 0
            || config.memory.retrieval_default_limit > config.memory.retrieval_max_limit
        {
            errors.push(ConfigurationError::invalid(
                format!(
                    "memory.retrieval_default_limit ({}) must be between 1 and \
                     memory.retrieval_max_limit ({})",
                    config.memory.retrieval_default_limit, config.memory.retrieval_max_limit
                ),
                "Adjust MEMORIA__MEMORY__RETRIEVAL_DEFAULT_LIMIT or \
                 MEMORIA__MEMORY__RETRIEVAL_MAX_LIMIT",
            ));
        }

        let level = config.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str())
            && level.parse::<tracing_subscriber::filter::EnvFilter>().is_err()
        {
            errors.push(ConfigurationError::invalid(
                format!("logging.level '{}' is not a valid filter", config.logging.level),
                "Use trace, debug, info, warn, error, or an EnvFilter directive",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ConfigurationError::multiple(errors))
        }
    }
}
