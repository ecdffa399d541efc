use anyhow::{Context, Result};
use shipdeck_common::CliConfig;
use std::path::PathBuf;
use tracing::debug;

use crate::api_client::session::SessionStore;

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shipdeck")
        .join("config.toml")
}

/// Load configuration from file or return defaults
pub fn load_config(path: &Option<PathBuf>) -> Result<CliConfig> {
    let config_path = path.clone().unwrap_or_else(default_config_path);

    if config_path.exists() {
        debug!("Loading config from {:?}", config_path);
        let content = std::fs::read_to_string(&config_path)
            .context("Failed to read config file")?;
        let config: CliConfig = toml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(config)
    } else {
        debug!("Config file not found, using defaults");
        Ok(CliConfig::default())
    }
}

/// Save configuration to file
pub fn save_config(config: &CliConfig, path: &Option<PathBuf>) -> Result<()> {
    let config_path = path.clone().unwrap_or_else(default_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;
    }

    let content = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;

    std::fs::write(&config_path, content)
        .context("Failed to write config file")?;

    Ok(())
}

/// Session store for the configured (or default) session file
pub fn session_store(config: &CliConfig) -> SessionStore {
    SessionStore::new(
        config
            .session
            .file
            .clone()
            .unwrap_or_else(SessionStore::default_path),
    )
}

/// Generate default config content for `config init`
pub fn generate_default_config() -> String {
    r#"# shipdeck configuration

[server]
# Deployment platform backend
base_url = "http://localhost:5000"

# Timeout for regular API calls in seconds
timeout_secs = 30

# Timeout for deploy streams, uploads and detection in seconds
stream_timeout_secs = 1800

[deploy]
# Branch used for repository deploys without --branch
default_branch = "main"

health_check_path = "/"
auto_restart = true
persistent_storage = false

# Ask the server to detect project settings before deploying
auto_detect = true

[session]
# Where the login session is kept (defaults next to this file)
# file = "/home/user/.config/shipdeck/session"
"#.to_string()
}
