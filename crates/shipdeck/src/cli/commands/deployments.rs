use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use shipdeck_common::{
    AttemptFailure, CustomDomainRequest, Deployment, DoneEvent, EnvVars, ProgressEvent,
};

use crate::api_client::ApiClient;
use crate::cli::DeploymentCommands;
use crate::stream::EventConsumer;
use crate::tui::{spinner, spinner_error, spinner_success, Styles};

/// Run deployment management commands
pub async fn run(command: DeploymentCommands, client: &ApiClient) -> Result<()> {
    match command {
        DeploymentCommands::List => list(client).await,
        DeploymentCommands::Show { id } => show(client, &id).await,
        DeploymentCommands::Logs { id, tail } => {
            let response = client.logs(&id, tail).await?;
            print!("{}", response.logs);
            Ok(())
        }
        DeploymentCommands::Metrics { id, hours } => metrics(client, &id, hours).await,
        DeploymentCommands::Stats { id } => stats(client, &id).await,
        DeploymentCommands::Restart { id } => {
            let pb = spinner(&format!("Restarting {}...", id));
            match client.restart(&id).await {
                Ok(response) => spinner_success(&pb, &response.message),
                Err(e) => {
                    spinner_error(&pb, "Restart failed");
                    return Err(e);
                }
            }
            Ok(())
        }
        DeploymentCommands::Delete { id, yes } => delete(client, &id, yes).await,
        DeploymentCommands::Rollback { id, version } => {
            let target = version
                .map(|v| format!("version {}", v))
                .unwrap_or_else(|| "the previous version".to_string());
            let pb = spinner(&format!("Rolling back {} to {}...", id, target));
            match client.rollback(&id, version).await {
                Ok(response) => spinner_success(&pb, &response.message),
                Err(e) => {
                    spinner_error(&pb, "Rollback failed");
                    return Err(e);
                }
            }
            Ok(())
        }
        DeploymentCommands::Domain {
            id,
            domain,
            cloudflare_api_key,
            cloudflare_zone_id,
        } => {
            let request = CustomDomainRequest {
                domain,
                cloudflare_api_key,
                cloudflare_zone_id,
            };
            let response = client.add_domain(&id, &request).await?;
            Styles::success(&response.message);
            Ok(())
        }
        DeploymentCommands::Env {
            id,
            set,
            secret,
            unset,
        } => env(client, &id, set, secret, unset).await,
        DeploymentCommands::Watch { id } => watch(client, &id).await,
    }
}

/// Make a server-relative URL absolute
pub fn absolute_url(base_url: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), url)
    } else {
        url.to_string()
    }
}

async fn list(client: &ApiClient) -> Result<()> {
    let deployments = client.list_deployments().await?;

    if deployments.is_empty() {
        Styles::info("No deployments yet. Run 'shipdeck deploy' to create one.");
        return Ok(());
    }

    Styles::header(&format!("Deployments ({})", deployments.len()));
    for deployment in &deployments {
        let status = deployment.status.as_deref().unwrap_or("unknown");
        let colored_status = match Styles::status_color(status) {
            crate::tui::StatusColor::Green => status.bright_green(),
            crate::tui::StatusColor::Yellow => status.bright_yellow(),
            crate::tui::StatusColor::Red => status.bright_red(),
            crate::tui::StatusColor::White => status.normal(),
        };
        println!(
            "   {:<10} {:<24} {:<10} {:<8} {}",
            deployment.id.dimmed(),
            deployment.project_name.as_deref().unwrap_or("-"),
            colored_status,
            deployment.deployment_type.as_deref().unwrap_or("-"),
            deployment
                .public_url()
                .map(|u| absolute_url(client.base_url(), u))
                .unwrap_or_default()
        );
    }

    Ok(())
}

async fn show(client: &ApiClient, id: &str) -> Result<()> {
    let deployment = client.get_deployment(id).await?;
    print_deployment(&deployment, client.base_url());
    Ok(())
}

fn print_deployment(deployment: &Deployment, base_url: &str) {
    Styles::header(deployment.project_name.as_deref().unwrap_or(&deployment.id));
    Styles::kv("ID", &deployment.id);

    if let Some(status) = &deployment.status {
        Styles::status("Status", status, Styles::status_color(status));
    }
    let optional = [
        ("Type", &deployment.deployment_type),
        ("Source", &deployment.source),
        ("Repository", &deployment.repo),
        ("Branch", &deployment.branch),
        ("Archive", &deployment.filename),
        ("Container", &deployment.container_id),
        ("Health check", &deployment.health_check_path),
        ("Volume", &deployment.volume_path),
        ("Created", &deployment.timestamp),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            Styles::kv(label, value);
        }
    }
    if let Some(url) = deployment.public_url() {
        Styles::kv("URL", &absolute_url(base_url, url));
    }
    if let Some(port) = deployment.port {
        Styles::kv("Port", &port.to_string());
    }
    if let Some(version) = deployment.version {
        Styles::kv("Version", &version.to_string());
    }
    if let Some(domain) = &deployment.custom_domain {
        let status = domain.status.as_deref().unwrap_or("pending");
        Styles::kv("Domain", &format!("{} ({})", domain.domain, status));
    }

    if !deployment.environment_variables.is_empty() {
        Styles::header("Environment");
        for var in &deployment.environment_variables {
            Styles::kv(&var.key, var.display_value());
        }
    }

    if !deployment.versions.is_empty() {
        Styles::header("Versions");
        for version in &deployment.versions {
            println!(
                "   v{:<4} {:<20} {}",
                version.version,
                version.timestamp.as_deref().unwrap_or("-"),
                version.status.as_deref().unwrap_or("").dimmed()
            );
        }
    }
}

async fn metrics(client: &ApiClient, id: &str, hours: u32) -> Result<()> {
    let response = client.metrics(id, hours).await?;

    if response.metrics.is_empty() {
        Styles::info(&format!("No metrics recorded in the last {} hours", hours));
        return Ok(());
    }

    Styles::header(&format!("Metrics, last {} hours", hours));
    println!(
        "   {:<26} {:>8} {:>12} {:>10} {:>10}",
        "time".dimmed(),
        "cpu %".dimmed(),
        "memory MiB".dimmed(),
        "rx MiB".dimmed(),
        "tx MiB".dimmed()
    );
    for point in &response.metrics {
        println!(
            "   {:<26} {:>8.2} {:>12.1} {:>10.2} {:>10.2}",
            point.timestamp, point.cpu, point.memory, point.network_rx, point.network_tx
        );
    }

    Ok(())
}

async fn stats(client: &ApiClient, id: &str) -> Result<()> {
    let summary = client.stats(id).await?.summary();

    Styles::header(&format!("Container stats for {}", id));
    Styles::kv("CPU", &format!("{:.2}%", summary.cpu_percent));
    Styles::kv("Memory", &format!("{:.1} MiB", summary.memory_mb));
    Styles::kv("Network in", &format!("{:.2} MiB", summary.network_rx_mb));
    Styles::kv("Network out", &format!("{:.2} MiB", summary.network_tx_mb));

    Ok(())
}

async fn delete(client: &ApiClient, id: &str, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete deployment {} and its container?", id))
            .default(false)
            .interact()?;
        if !confirmed {
            Styles::info("Cancelled");
            return Ok(());
        }
    }

    let response = client.delete(id).await?;
    Styles::success(&response.message);
    Ok(())
}

async fn env(
    client: &ApiClient,
    id: &str,
    set: Vec<String>,
    secret: Vec<String>,
    unset: Vec<String>,
) -> Result<()> {
    let deployment = client.get_deployment(id).await?;
    let mut vars = EnvVars::from(deployment.environment_variables);

    if set.is_empty() && secret.is_empty() && unset.is_empty() {
        Styles::header(&format!("Environment of {}", id));
        if vars.is_empty() {
            Styles::dimmed("(none)");
        }
        for var in &vars {
            Styles::kv(&var.key, var.display_value());
        }
        return Ok(());
    }

    for (assignments, is_secret) in [(&set, false), (&secret, true)] {
        for assignment in assignments {
            let Some((key, value)) = EnvVars::parse_assignment(assignment) else {
                anyhow::bail!("Invalid variable '{}', expected KEY=VALUE", assignment);
            };
            vars.upsert(&key, value, is_secret);
        }
    }
    for key in &unset {
        if vars.remove(key).is_none() {
            Styles::warning(&format!("{} is not set", key.to_uppercase()));
        }
    }

    let pb = spinner("Updating environment and restarting...");
    match client.update_env(id, vars.into()).await {
        Ok(response) => spinner_success(&pb, &response.message),
        Err(e) => {
            spinner_error(&pb, "Update failed");
            return Err(e);
        }
    }
    Ok(())
}

/// Follow the event stream of a running deployment
async fn watch(client: &ApiClient, id: &str) -> Result<()> {
    let body = client.stream_deployment(id).await?;
    let mut consumer = EventConsumer::new(body);

    Styles::info(&format!("Following {} (Ctrl-C to stop)", id));
    println!();

    let follow = async {
        while let Some(event) = consumer.next_event().await {
            match event {
                ProgressEvent::Done(done) => return Some(done),
                event => Styles::event(Utc::now(), &event),
            }
        }
        None
    };

    let outcome = tokio::select! {
        done = follow => done,
        _ = tokio::signal::ctrl_c() => {
            println!();
            Styles::warning("Stopped following. The deployment continues on the server.");
            return Ok(());
        }
    };

    println!();
    match outcome {
        Some(DoneEvent::Succeeded { .. }) => {
            Styles::success("Deployment is live");
            Ok(())
        }
        Some(DoneEvent::Failed { error }) => {
            Styles::error(&format!("Deployment failed: {}", error));
            anyhow::bail!("Deployment failed");
        }
        None => {
            let failure = AttemptFailure::StreamTerminatedEarly;
            Styles::error(&failure.to_string());
            Err(failure.into())
        }
    }
}
