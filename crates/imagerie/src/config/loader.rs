use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: EngineConfig = serde_json::from_value(json_value)?;

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

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.scan.image_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "scan.image_extensions must not be empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for ext in &config.scan.image_extensions {
        let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Invalid image extension: {:?}", ext),
            });
        }
        if !seen.insert(normalized) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate image extension: {}", ext),
            });
        }
    }

    let jobs = &config.jobs;
    if jobs.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.sweep_interval_secs must be positive".to_string(),
        });
    }
    if jobs.timeout_after_secs < jobs.stuck_after_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "jobs.timeout_after_secs ({}) must not be shorter than jobs.stuck_after_secs ({})",
                jobs.timeout_after_secs, jobs.stuck_after_secs
            ),
        });
    }

    Ok(())
}
