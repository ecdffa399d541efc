use anyhow::Result;
use shipdeck_common::HealthStatus;

use crate::api_client::ApiClient;
use crate::tui::{StatusColor, Styles};

pub async fn run(client: &ApiClient) -> Result<()> {
    let health = client.health().await?;

    Styles::header(&format!("Server {}", client.base_url()));
    match health.status {
        HealthStatus::Healthy => Styles::status("Status", "healthy", StatusColor::Green),
        HealthStatus::Unhealthy => Styles::status("Status", "unhealthy", StatusColor::Red),
    }

    for (label, value) in [
        ("Docker", &health.docker),
        ("Redis", &health.redis),
        ("Database", &health.database),
    ] {
        if let Some(value) = value {
            Styles::status(label, value, Styles::status_color(value));
        }
    }
    Styles::kv("Queue length", &health.queue_length.to_string());
    if let Some(timestamp) = &health.timestamp {
        Styles::dimmed(timestamp);
    }

    if health.status == HealthStatus::Unhealthy {
        anyhow::bail!("Server is unhealthy");
    }

    Ok(())
}
