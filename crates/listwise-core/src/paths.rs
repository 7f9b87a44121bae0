//! Centralized path utilities

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".listwise";

/// Get the listwise config directory (~/.listwise)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.listwise/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the logs directory (~/.listwise/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Default database location (~/.listwise/listwise.db)
pub fn default_db_path() -> PathBuf {
    config_dir().join("listwise.db")
}
