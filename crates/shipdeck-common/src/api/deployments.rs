use serde::{Deserialize, Serialize};

use super::deploy::EnvVar;
use super::events::lenient_port;

/// Stored deployment record as returned by the management endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub deployment_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    /// "github" or "local"
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub environment_variables: Vec<EnvVar>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub health_check_path: Option<String>,
    #[serde(default)]
    pub auto_restart: Option<bool>,
    #[serde(default)]
    pub volume_path: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<CustomDomain>,
    /// Only present on the single-deployment endpoint
    #[serde(default)]
    pub versions: Vec<DeploymentVersion>,
}

impl Deployment {
    /// Best URL to reach the deployment
    pub fn public_url(&self) -> Option<&str> {
        self.direct_url.as_deref().or(self.url.as_deref())
    }
}

/// A custom domain attached to a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDomain {
    pub domain: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A retained previous version that can be rolled back to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentVersion {
    pub version: u32,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
}

/// Response from the logs endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: String,
}

/// One stored metrics sample
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub timestamp: String,
    #[serde(default)]
    pub cpu: f64,
    /// MiB
    #[serde(default)]
    pub memory: f64,
    /// MiB
    #[serde(default)]
    pub network_rx: f64,
    /// MiB
    #[serde(default)]
    pub network_tx: f64,
}

/// Response from the metrics endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub metrics: Vec<MetricPoint>,
}

/// Raw container stats snapshot (Docker stats JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerStats(pub serde_json::Value);

/// Figures derived from a [`ContainerStats`] snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSummary {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub network_rx_mb: f64,
    pub network_tx_mb: f64,
}

impl ContainerStats {
    pub fn summary(&self) -> StatsSummary {
        const MIB: f64 = 1024.0 * 1024.0;
        let num = |ptr: &str| self.0.pointer(ptr).and_then(|v| v.as_f64()).unwrap_or(0.0);

        let total_usage = num("/cpu_stats/cpu_usage/total_usage");
        let system_cpu = self
            .0
            .pointer("/cpu_stats/system_cpu_usage")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        let cpu_percent = if system_cpu > 0.0 {
            total_usage / system_cpu * 100.0
        } else {
            0.0
        };

        StatsSummary {
            cpu_percent,
            memory_mb: num("/memory_stats/usage") / MIB,
            network_rx_mb: num("/networks/eth0/rx_bytes") / MIB,
            network_tx_mb: num("/networks/eth0/tx_bytes") / MIB,
        }
    }
}

/// Generic `{message, deployment?}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deployment: Option<Deployment>,
}

/// Request to roll back; `None` means the most recent previous version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Request to attach a Cloudflare-managed custom domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDomainRequest {
    pub domain: String,
    pub cloudflare_api_key: String,
    pub cloudflare_zone_id: String,
}

/// Request to replace a deployment's environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvRequest {
    pub environment_variables: Vec<EnvVar>,
}
