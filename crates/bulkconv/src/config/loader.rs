use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

pub const ENV_UPLOAD_DIR: &str = "BULKCONV_UPLOAD_DIR";
pub const ENV_OUTPUT_DIR: &str = "BULKCONV_OUTPUT_DIR";
pub const ENV_ARCHIVE_DIR: &str = "BULKCONV_ARCHIVE_DIR";
pub const ENV_DATABASE_PATH: &str = "BULKCONV_DATABASE_PATH";
pub const ENV_LOG_LEVEL: &str = "BULKCONV_LOG_LEVEL";

/// Loads a config file, applies environment overrides and validates it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = serde_json::from_str(content)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn default_config() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

fn env_value(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
        }),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(raw)) => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.to_string_lossy().to_string(),
        }),
    }
}

pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(dir) = env_value(ENV_UPLOAD_DIR)? {
        config.storage.upload_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env_value(ENV_OUTPUT_DIR)? {
        config.storage.output_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env_value(ENV_ARCHIVE_DIR)? {
        config.storage.archive_dir = PathBuf::from(dir);
    }
    if let Some(path) = env_value(ENV_DATABASE_PATH)? {
        config.database.path = PathBuf::from(path);
    }
    if let Some(level) = env_value(ENV_LOG_LEVEL)? {
        config.logging.level = level;
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |message: &str| {
        Err(ConfigError::Validation {
            message: message.to_string(),
        })
    };

    if config.converter.program.trim().is_empty() {
        return fail("converter.program must not be empty");
    }
    if config.converter.target_format.trim().is_empty() {
        return fail("converter.target_format must not be empty");
    }
    if config.converter.timeout_secs == 0 {
        return fail("converter.timeout_secs must be greater than zero");
    }
    if config.limits.max_files_per_job == 0 {
        return fail("limits.max_files_per_job must be greater than zero");
    }
    if config.limits.max_file_size == 0 {
        return fail("limits.max_file_size must be greater than zero");
    }
    if config.limits.allowed_extensions.is_empty() {
        return fail("limits.allowed_extensions must list at least one extension");
    }
    if config.workers.worker_count == 0 {
        return fail("workers.worker_count must be greater than zero");
    }
    if config.workers.file_concurrency == 0 {
        return fail("workers.file_concurrency must be greater than zero");
    }
    if config.workers.queue_capacity == 0 {
        return fail("workers.queue_capacity must be greater than zero");
    }

    Ok(())
}
