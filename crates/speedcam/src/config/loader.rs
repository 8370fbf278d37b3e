use std::path::{Path, PathBuf};

use crate::config::schema::ClientConfig;
use crate::error::ConfigError;
use crate::models::calibration::validate_reference_distance;

pub const ENV_API_URL: &str = "SPEEDCAM_API_URL";
pub const ENV_LOG_LEVEL: &str = "SPEEDCAM_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "SPEEDCAM_LOG_JSON";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// `<config dir>/speedcam/config.json`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("speedcam").join("config.json"))
}

/// Loads `path` (or the default location) when it exists, falling back to
/// defaults otherwise, then applies environment overrides and validates.
pub fn load_or_default(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let candidate = path.map(Path::to_path_buf).or_else(default_config_path);

    let mut config = match candidate {
        Some(ref p) if p.exists() => {
            log::debug!("Loading client config from {:?}", p);
            load_config(p)?
        }
        Some(ref p) if path.is_some() => {
            return Err(ConfigError::ReadFile {
                path: p.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            });
        }
        _ => ClientConfig::default(),
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut ClientConfig) {
    if let Ok(url) = std::env::var(ENV_API_URL) {
        if !url.trim().is_empty() {
            config.api.base_url = url.trim().to_string();
        }
    }
    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        if !level.trim().is_empty() {
            config.logging.level = level.trim().to_string();
        }
    }
    if let Ok(json) = std::env::var(ENV_LOG_JSON) {
        config.logging.json = matches!(json.trim(), "1" | "true" | "yes");
    }
}

pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let base_url = config.api.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(format!(
            "api.base_url must be an http(s) URL, got '{}'",
            config.api.base_url
        )));
    }

    if config.api.request_timeout_secs == 0 || config.api.connect_timeout_secs == 0 {
        return Err(invalid("api timeouts must be greater than zero"));
    }

    if config.polling.fast_interval_ms == 0 || config.polling.idle_interval_ms == 0 {
        return Err(invalid("polling intervals must be greater than zero"));
    }

    if config.polling.event_capacity == 0 {
        return Err(invalid("polling.event_capacity must be greater than zero"));
    }

    if config.upload.allowed_extensions.is_empty() {
        return Err(invalid("upload.allowed_extensions must not be empty"));
    }

    if config.upload.max_file_size == 0 || config.upload.chunk_size == 0 {
        return Err(invalid(
            "upload.max_file_size and upload.chunk_size must be greater than zero",
        ));
    }

    validate_reference_distance(config.calibration.default_reference_distance)
        .map_err(|e| invalid(format!("calibration.default_reference_distance: {}", e)))?;

    config
        .processing
        .validate()
        .map_err(|e| invalid(format!("processing: {}", e)))?;

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
