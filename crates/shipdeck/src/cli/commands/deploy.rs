use anyhow::{Context, Result};
use indicatif::ProgressBar;
use shipdeck_common::{
    CliConfig, DeploymentConfig, DeploymentKind, DeploymentSpec, EnvVars, FinalizedDeployment,
};
use tracing::{debug, warn};

use crate::api_client::ApiClient;
use crate::cli::commands::{deployments, detect, source};
use crate::cli::DeployArgs;
use crate::orchestrator::{AttemptStatus, AttemptUpdate, SubmissionOrchestrator};
use crate::resolver::{ConfigResolver, DeploymentForm, DetectionOutcome};
use crate::tui::{spinner, spinner_error, spinner_success, Styles};

/// Run the deploy command
pub async fn run(args: DeployArgs, client: ApiClient, config: &CliConfig) -> Result<()> {
    Styles::header("Deploy");
    let (source, suggested_name) =
        source::resolve(&args.source, args.branch.as_deref(), &client, config).await?;
    let project_name = args.name.clone().unwrap_or(suggested_name);

    let mut resolver = ConfigResolver::new(DeploymentForm::from_defaults(&config.deploy));

    if config.deploy.auto_detect && !args.no_detect {
        let ticket = resolver.begin_detection();
        let pb = spinner("Detecting project settings...");
        match source::detect(&client, &source).await {
            Ok(response) => {
                spinner_success(&pb, &detect::summary(&response.detection));
                if resolver.apply_detection(ticket, &response.detection) == DetectionOutcome::Stale {
                    warn!("Detection result arrived after a newer request, ignored");
                }
                for recommendation in &response.suggestions.recommendations {
                    Styles::dimmed(recommendation);
                }
            }
            Err(e) => {
                spinner_error(&pb, "Detection failed, using defaults");
                warn!("{:#}", e);
            }
        }
    }

    // Flags go last so detection never overrides them
    apply_flags(&mut resolver, &args)?;

    let spec = resolver.resolve(&project_name, source)?;
    print_summary(&spec);

    let base_url = client.base_url().to_string();
    let mut orchestrator = SubmissionOrchestrator::new(client);

    let mut pb = Some(spinner(if spec.source.is_archive() {
        "Uploading archive..."
    } else {
        "Starting deployment..."
    }));
    let finished = tokio::select! {
        result = orchestrator.submit(&spec, progress_observer(&mut pb)) => Some(result?.clone()),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Some(pb) = pb.take() {
        pb.finish_and_clear();
    }

    let Some(attempt) = finished else {
        println!();
        Styles::warning("Stopped following the build. The deployment continues on the server.");
        if let Some(id) = orchestrator.attempt().deployment_id() {
            Styles::info(&format!("Resume with 'shipdeck deployments watch {}'", id));
        } else {
            Styles::info("Check progress with 'shipdeck deployments list'");
        }
        return Ok(());
    };

    println!();
    debug!(
        "Attempt {} ended {} after {} events",
        attempt.id(),
        attempt.status(),
        attempt.events().len()
    );

    if let Some(failure) = attempt.failure() {
        Styles::error(&format!("Deployment failed: {}", failure));
        anyhow::bail!("Deployment failed");
    }

    Styles::success(&format!("{} is live", spec.project_name));
    if let Some(deployment) = attempt.finalized() {
        report_live(deployment, orchestrator.transport(), &base_url, args.open).await;
    }
    Ok(())
}

/// Drives the spinner until the build stream opens, then prints each event
fn progress_observer(
    pb: &mut Option<ProgressBar>,
) -> impl FnMut(AttemptUpdate<'_>) + '_ {
    move |update| match update {
        AttemptUpdate::Uploaded(id) => {
            if let Some(pb) = pb.as_ref() {
                pb.set_message(format!("Uploaded as {}, attaching to build stream...", id));
            }
        }
        AttemptUpdate::Status(AttemptStatus::Streaming) => {
            if let Some(pb) = pb.take() {
                spinner_success(&pb, "Deployment started");
            }
            println!();
        }
        AttemptUpdate::Status(AttemptStatus::Failed) => {
            if let Some(pb) = pb.take() {
                spinner_error(&pb, "Deployment could not start");
            }
        }
        AttemptUpdate::Status(_) => {}
        AttemptUpdate::Event(recorded) => Styles::event(recorded.received_at, &recorded.event),
    }
}

/// Apply command-line settings on top of whatever detection produced
fn apply_flags(resolver: &mut ConfigResolver, args: &DeployArgs) -> Result<()> {
    if let Some(kind) = args.kind {
        resolver.set_kind(kind);
    }
    if let Some(runtime) = args.runtime {
        if runtime != resolver.form().service.runtime {
            resolver.set_runtime(runtime);
        }
    }

    let form = resolver.form_mut();

    if let Some(entry_file) = &args.entry_file {
        form.service.entry_file = entry_file.clone();
    }
    if let Some(port) = &args.port {
        form.service.port = port.clone();
    }
    if let Some(cmd) = &args.start_command {
        form.service.start_command = cmd.clone();
    }
    if args.dev_mode {
        form.service.use_dev_mode = true;
    }
    if let Some(dir) = &args.publish_dir {
        form.static_site.publish_dir = dir.clone();
    }
    if let Some(cmd) = &args.build_command {
        match form.kind {
            DeploymentKind::Static => form.static_site.build_command = cmd.clone(),
            DeploymentKind::Service => form.service.build_command = cmd.clone(),
        }
    }

    if let Some(path) = &args.env_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read env file: {:?}", path))?;
        let count = form.environment.merge_dotenv(&text, false);
        Styles::info(&format!("Loaded {} variables from {}", count, path.display()));
    }
    for (assignments, is_secret) in [(&args.env, false), (&args.secret, true)] {
        for assignment in assignments {
            let (key, value) = EnvVars::parse_assignment(assignment)
                .with_context(|| format!("Invalid variable '{}', expected KEY=VALUE", assignment))?;
            form.environment.upsert(&key, value, is_secret);
        }
    }

    if args.persistent_storage {
        form.persistent_storage = true;
    }
    if let Some(path) = &args.health_check_path {
        form.health_check_path = path.clone();
    }
    if args.no_auto_restart {
        form.auto_restart = false;
    }

    Ok(())
}

fn print_summary(spec: &DeploymentSpec) {
    Styles::header(&format!("Deploying {}", spec.project_name));
    Styles::kv("Source", &spec.source.describe());
    Styles::kv("Type", &spec.kind().to_string());

    match &spec.config {
        DeploymentConfig::Static(config) => {
            if !config.build_command.is_empty() {
                Styles::kv("Build command", &config.build_command);
            }
            Styles::kv("Publish dir", &config.publish_dir);
        }
        DeploymentConfig::Service(config) => {
            Styles::kv("Runtime", &config.runtime.to_string());
            Styles::kv("Entry file", &config.entry_file);
            Styles::kv("Port", &config.port);
            if !config.build_command.is_empty() {
                Styles::kv("Build command", &config.build_command);
            }
            if !config.start_command.is_empty() {
                Styles::kv("Start command", &config.start_command);
            }
            if config.use_dev_mode {
                Styles::kv("Mode", "development");
            }
        }
    }

    for var in &spec.environment {
        Styles::kv(&var.key, var.display_value());
    }
    if spec.persistent_storage {
        Styles::kv("Storage", "persistent");
    }
    Styles::kv("Health check", &spec.health_check_path);
    if !spec.auto_restart {
        Styles::kv("Auto restart", "off");
    }
    println!();
}

async fn report_live(
    deployment: &FinalizedDeployment,
    client: &ApiClient,
    base_url: &str,
    open_browser: bool,
) {
    Styles::kv("Deployment", &deployment.id);
    if let Some(port) = deployment.port {
        Styles::kv("Port", &port.to_string());
    }

    let url = match &deployment.direct_url {
        Some(url) => Some(url.clone()),
        None => match client.get_deployment(&deployment.id).await {
            Ok(record) => record
                .public_url()
                .map(|url| deployments::absolute_url(base_url, url)),
            Err(e) => {
                warn!("Could not fetch deployment record: {:#}", e);
                None
            }
        },
    };

    let Some(url) = url else { return };
    Styles::kv("URL", &url);

    if open_browser {
        if let Err(e) = open::that(&url) {
            Styles::warning(&format!("Could not open browser: {}", e));
        }
    }
}
