use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Platform server connection
    #[serde(default)]
    pub server: ServerConfig,
    /// Defaults applied to new deployments
    #[serde(default)]
    pub deploy: DeployDefaults,
    /// Session persistence
    #[serde(default)]
    pub session: SessionConfig,
}

/// Platform server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL all API paths are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for regular API calls in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Timeout for deploy streams and uploads in seconds. Deploys can take minutes.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            stream_timeout_secs: default_stream_timeout(),
        }
    }
}

/// Values used when a deploy doesn't specify them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployDefaults {
    /// Branch used for `--repo` deploys without `--branch`
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    #[serde(default)]
    pub persistent_storage: bool,
    /// Ask the server to detect project settings before deploying
    #[serde(default = "default_true")]
    pub auto_detect: bool,
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            health_check_path: default_health_check_path(),
            auto_restart: true,
            persistent_storage: false,
            auto_detect: true,
        }
    }
}

/// Where the login session cookie is kept between invocations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session file path (defaults next to the config file)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_stream_timeout() -> u64 {
    1800
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_health_check_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}
