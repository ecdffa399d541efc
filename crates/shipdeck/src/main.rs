use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api_client;
mod archive;
mod cli;
mod config;
mod orchestrator;
mod resolver;
mod stream;
mod tui;

use api_client::session::SessionStore;
use cli::commands;
use cli::{Cli, Commands};
use shipdeck_common::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Config commands must work even when the config file is broken, so the
    // client is only built for commands that talk to the server
    match cli.command {
        Commands::Config { command } => commands::config::run(command, &cli.config).await?,
        Commands::Login { token } => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::auth::login(token, &remote.client, &remote.session).await?;
        }
        Commands::Logout => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::auth::logout(&remote.client, &remote.session).await?;
        }
        Commands::Whoami => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::auth::whoami(&remote.client).await?;
        }
        Commands::Repos => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::repos::run(&remote.client).await?;
        }
        Commands::Detect(args) => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::detect::run(args, &remote.client, &remote.config).await?;
        }
        Commands::Deploy(args) => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::deploy::run(args, remote.client, &remote.config).await?;
        }
        Commands::Deployments { command } => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::deployments::run(command, &remote.client).await?;
        }
        Commands::Health => {
            let remote = Remote::connect(&cli.config, cli.server)?;
            commands::health::run(&remote.client).await?;
        }
    }

    Ok(())
}

/// Loaded config plus a client with any saved session restored
struct Remote {
    config: CliConfig,
    client: api_client::ApiClient,
    session: SessionStore,
}

impl Remote {
    fn connect(config_path: &Option<PathBuf>, server: Option<String>) -> Result<Self> {
        let config = config::load_config(config_path)?;

        // Server URL (from CLI override or config)
        let server_url = server.unwrap_or_else(|| config.server.base_url.clone());

        let client = api_client::ApiClient::new(
            &server_url,
            config.server.timeout_secs,
            config.server.stream_timeout_secs,
        )?;

        let session = config::session_store(&config);
        if let Some(cookie) = session.load()? {
            client.restore_session(&cookie)?;
        }

        Ok(Self {
            config,
            client,
            session,
        })
    }
}
