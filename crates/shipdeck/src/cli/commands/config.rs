use anyhow::Result;
use shipdeck_common::CliConfig;
use std::path::{Path, PathBuf};

use crate::cli::ConfigCommands;
use crate::config::{default_config_path, generate_default_config, load_config, save_config};

/// Run config management commands
pub async fn run(command: ConfigCommands, path: &Option<PathBuf>) -> Result<()> {
    let config_path = path.clone().unwrap_or_else(default_config_path);

    match command {
        ConfigCommands::Init { force } => init_config(&config_path, force),
        ConfigCommands::Show => show_config(&config_path),
        ConfigCommands::Set { key, value } => {
            let path = Some(config_path);
            let mut config = load_config(&path)?;
            set_value(&mut config, &key, &value)?;
            save_config(&config, &path)?;
            println!("Set {} = {}", key, value);
            Ok(())
        }
    }
}

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!("Config file already exists at: {:?}", config_path);
        println!("Use --force to overwrite.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(config_path, generate_default_config())?;

    println!("Created config file: {:?}", config_path);
    println!("\nEdit this file to point shipdeck at your deployment server.");

    Ok(())
}

fn show_config(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        println!("No config file found at: {:?}", config_path);
        println!("Run 'shipdeck config init' to create one.");
        return Ok(());
    }

    println!("Config file: {:?}\n", config_path);

    let config = load_config(&Some(config_path.to_path_buf()))?;

    println!("[server]");
    println!("  base_url = {}", config.server.base_url);
    println!("  timeout_secs = {}", config.server.timeout_secs);
    println!("  stream_timeout_secs = {}", config.server.stream_timeout_secs);

    println!("\n[deploy]");
    println!("  default_branch = {}", config.deploy.default_branch);
    println!("  health_check_path = {}", config.deploy.health_check_path);
    println!("  auto_restart = {}", config.deploy.auto_restart);
    println!("  persistent_storage = {}", config.deploy.persistent_storage);
    println!("  auto_detect = {}", config.deploy.auto_detect);

    println!("\n[session]");
    println!("  file = {:?}", config.session.file);

    Ok(())
}

/// Set `section.key` to a value parsed from text
fn set_value(config: &mut CliConfig, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid key format. Use 'section.key' (e.g., 'server.base_url')");
    }

    match (parts[0], parts[1]) {
        ("server", "base_url") => {
            let url = value.trim_end_matches('/');
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("Server URL must start with http:// or https://");
            }
            config.server.base_url = url.to_string();
        }
        ("server", "timeout_secs") => config.server.timeout_secs = value.parse()?,
        ("server", "stream_timeout_secs") => config.server.stream_timeout_secs = value.parse()?,

        ("deploy", "default_branch") => config.deploy.default_branch = value.to_string(),
        ("deploy", "health_check_path") => config.deploy.health_check_path = value.to_string(),
        ("deploy", "auto_restart") => config.deploy.auto_restart = value.parse()?,
        ("deploy", "persistent_storage") => config.deploy.persistent_storage = value.parse()?,
        ("deploy", "auto_detect") => config.deploy.auto_detect = value.parse()?,

        ("session", "file") => {
            config.session.file = if value.is_empty() {
                None
            } else {
                Some(value.into())
            };
        }

        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    Ok(())
}
