pub mod commands;

use clap::{Parser, Subcommand};
use shipdeck_common::{DeploymentKind, Runtime};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shipdeck")]
#[command(about = "Deploy static sites and web services from git or a zip archive")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SHIPDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server URL (overrides config)
    #[arg(long, global = true, env = "SHIPDECK_SERVER")]
    pub server: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to GitHub with a personal access token
    Login {
        /// GitHub token (prompted for when omitted)
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Log out and forget the saved session
    Logout,

    /// Show who is logged in
    Whoami,

    /// List your GitHub repositories
    Repos,

    /// Detect project settings without deploying
    Detect(DetectArgs),

    /// Deploy a repository or zip archive and follow its progress
    Deploy(DeployArgs),

    /// Manage existing deployments
    Deployments {
        #[command(subcommand)]
        command: DeploymentCommands,
    },

    /// Check backend health
    Health,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Repository URL to deploy
    #[arg(long)]
    pub repo: Option<String>,

    /// Pick one of your repositories interactively
    #[arg(long)]
    pub select: bool,

    /// Zip archive to upload
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Branch to inspect
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(clap::Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Project name (defaults to the repository or archive name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Branch to deploy
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Deployment type (static or service)
    #[arg(short = 't', long = "type")]
    pub kind: Option<DeploymentKind>,

    /// Runtime for web services (python or nodejs)
    #[arg(short, long)]
    pub runtime: Option<Runtime>,

    /// Entry file for web services
    #[arg(long)]
    pub entry_file: Option<String>,

    /// Port the web service listens on
    #[arg(short, long)]
    pub port: Option<String>,

    /// Build command
    #[arg(long)]
    pub build_command: Option<String>,

    /// Start command for web services
    #[arg(long)]
    pub start_command: Option<String>,

    /// Output directory for static sites
    #[arg(long)]
    pub publish_dir: Option<String>,

    /// Run the web service in development mode
    #[arg(long)]
    pub dev_mode: bool,

    /// Environment variable (KEY=VALUE), repeatable
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Secret environment variable (KEY=VALUE), repeatable
    #[arg(long)]
    pub secret: Vec<String>,

    /// Load environment variables from a .env file
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Keep a persistent volume across redeploys
    #[arg(long)]
    pub persistent_storage: bool,

    /// Path the server polls for health
    #[arg(long)]
    pub health_check_path: Option<String>,

    /// Don't restart the container when it exits
    #[arg(long)]
    pub no_auto_restart: bool,

    /// Skip project detection
    #[arg(long)]
    pub no_detect: bool,

    /// Open the deployment in a browser when it goes live
    #[arg(long)]
    pub open: bool,
}

#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// List deployments
    List,

    /// Show one deployment
    Show { id: String },

    /// Print container logs
    Logs {
        id: String,

        /// Number of lines from the end
        #[arg(long, default_value = "100")]
        tail: u32,
    },

    /// Show stored metrics
    Metrics {
        id: String,

        /// How many hours back
        #[arg(long, default_value = "24")]
        hours: u32,
    },

    /// Show live container stats
    Stats { id: String },

    /// Restart the container
    Restart { id: String },

    /// Delete the deployment
    Delete {
        id: String,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Roll back to a previous version
    #[command(disable_version_flag = true)]
    Rollback {
        id: String,

        /// Version to restore (defaults to the previous one)
        #[arg(long)]
        version: Option<u32>,
    },

    /// Attach a custom domain through Cloudflare
    Domain {
        id: String,

        domain: String,

        #[arg(long, env = "CLOUDFLARE_API_KEY", hide_env_values = true)]
        cloudflare_api_key: String,

        #[arg(long, env = "CLOUDFLARE_ZONE_ID")]
        cloudflare_zone_id: String,
    },

    /// Show or change environment variables
    Env {
        id: String,

        /// Set a variable (KEY=VALUE), repeatable
        #[arg(long)]
        set: Vec<String>,

        /// Set a secret variable (KEY=VALUE), repeatable
        #[arg(long)]
        secret: Vec<String>,

        /// Remove a variable, repeatable
        #[arg(long)]
        unset: Vec<String>,
    },

    /// Follow the event stream of a deployment in progress
    Watch { id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., server.base_url, deploy.default_branch)
        key: String,
        /// Configuration value
        value: String,
    },
}
