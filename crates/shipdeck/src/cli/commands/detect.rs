use anyhow::Result;
use shipdeck_common::{CliConfig, DeploymentKind, Detection, DetectionResponse};

use crate::api_client::ApiClient;
use crate::cli::commands::source;
use crate::cli::DetectArgs;
use crate::tui::{spinner, spinner_error, spinner_success, Styles};

pub async fn run(args: DetectArgs, client: &ApiClient, config: &CliConfig) -> Result<()> {
    let (source, _) = source::resolve(&args.source, args.branch.as_deref(), client, config).await?;

    let pb = spinner("Detecting project settings...");
    let response = match source::detect(client, &source).await {
        Ok(response) => response,
        Err(e) => {
            spinner_error(&pb, "Detection failed");
            return Err(e);
        }
    };
    spinner_success(&pb, &summary(&response.detection));

    print_detection(&response);
    Ok(())
}

/// One-line description of a detection
pub fn summary(detection: &Detection) -> String {
    let mut parts = vec![detection.kind.to_string()];
    if let Some(runtime) = &detection.runtime {
        parts.push(runtime.clone());
    }
    if let Some(framework) = &detection.framework {
        parts.push(framework.clone());
    }
    format!("Detected {}", parts.join(" / "))
}

pub fn print_detection(response: &DetectionResponse) {
    let detection = &response.detection;
    let config = &detection.config;

    Styles::header("Detected settings");
    Styles::kv("Type", &detection.kind.to_string());
    if let Some(runtime) = &detection.runtime {
        Styles::kv("Runtime", runtime);
    }
    if let Some(framework) = &detection.framework {
        Styles::kv("Framework", framework);
    }
    if let Some(tool) = &detection.build_tool {
        Styles::kv("Build tool", tool);
    }

    let fields = match detection.kind {
        DeploymentKind::Static => vec![
            ("Build command", &config.build_command),
            ("Publish dir", &config.publish_dir),
        ],
        DeploymentKind::Service => vec![
            ("Entry file", &config.entry_file),
            ("Port", &config.port),
            ("Build command", &config.build_command),
            ("Start command", &config.start_command),
        ],
    };
    for (label, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            Styles::kv(label, value);
        }
    }

    if detection.kind == DeploymentKind::Service && detection.supported_runtime().is_none() {
        Styles::warning("This runtime can't be deployed yet; python or nodejs will be used");
    }

    let suggestions = &response.suggestions;
    if !suggestions.recommendations.is_empty() {
        Styles::header("Recommendations");
        for recommendation in &suggestions.recommendations {
            Styles::info(recommendation);
        }
    }
    if let Some(message) = &response.message {
        Styles::dimmed(message);
    }
}
