pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, default_config_path, load_config, load_config_from_str, load_or_default,
    validate_config,
};
pub use schema::{
    ApiConfig, CalibrationConfig, ClientConfig, LoggingConfig, PollingConfig, UploadConfig,
};
