use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.batch.size == 0 {
        return Err(ConfigError::Validation {
            message: "batch.size must be at least 1".to_string(),
        });
    }

    if config.upload.max_file_size == 0 {
        return Err(ConfigError::Validation {
            message: "upload.max_file_size must be at least 1".to_string(),
        });
    }

    if config.progress.ttl_secs == 0 {
        return Err(ConfigError::Validation {
            message: "progress.ttl_secs must be at least 1".to_string(),
        });
    }

    if let Some(remote) = &config.parser.remote {
        let url = reqwest::Url::parse(&remote.url).map_err(|e| ConfigError::Validation {
            message: format!("Invalid parser.remote.url '{}': {}", remote.url, e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation {
                message: format!(
                    "parser.remote.url must use http or https, got '{}'",
                    url.scheme()
                ),
            });
        }
        if remote.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "parser.remote.max_attempts must be at least 1".to_string(),
            });
        }
        if remote.timeout_secs == 0 || remote.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "parser.remote timeouts must be at least 1 second".to_string(),
            });
        }
    }

    if config
        .logging
        .level
        .parse::<tracing::level_filters::LevelFilter>()
        .is_err()
    {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level: {}", config.logging.level),
        });
    }

    Ok(())
}
