use serde::{Deserialize, Serialize};

/// Health check response from the platform backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(default)]
    pub docker: Option<String>,
    #[serde(default)]
    pub redis: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// The only snake_case key the backend sends
    #[serde(default, rename = "queue_length", alias = "queueLength")]
    pub queue_length: u32,
}

/// Backend health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}
