use anyhow::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, FuzzySelect};
use indicatif::ProgressBar;
use shipdeck_common::Repository;

use crate::api_client::ApiClient;
use crate::cli::commands::auth;
use crate::tui::{spinner, spinner_error, spinner_success, Styles};

pub async fn run(client: &ApiClient) -> Result<()> {
    let repositories = fetch(client).await?;

    Styles::header(&format!("Repositories ({})", repositories.len()));
    for repo in &repositories {
        let visibility = if repo.private {
            "private".bright_yellow()
        } else {
            "public".dimmed()
        };
        println!(
            "   {:<40} {:<8} {}",
            repo.name.bright_white(),
            visibility,
            repo.default_branch.dimmed()
        );
    }

    Ok(())
}

async fn fetch(client: &ApiClient) -> Result<Vec<Repository>> {
    let username = auth::require_login(client).await?;

    let pb = spinner(&format!("Fetching repositories for {}...", username));
    list(client, &pb).await
}

async fn list(client: &ApiClient, pb: &ProgressBar) -> Result<Vec<Repository>> {
    match client.list_repositories().await {
        Ok(response) => {
            spinner_success(pb, &format!("{} repositories", response.repositories.len()));
            Ok(response.repositories)
        }
        Err(e) => {
            spinner_error(pb, "Could not list repositories");
            Err(e)
        }
    }
}

/// Let the user pick one of their repositories
pub async fn select_repository(client: &ApiClient) -> Result<Repository> {
    let mut repositories = fetch(client).await?;
    if repositories.is_empty() {
        anyhow::bail!("No repositories found for this GitHub account");
    }

    let names: Vec<&str> = repositories.iter().map(|r| r.name.as_str()).collect();
    let index = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Repository")
        .items(&names)
        .default(0)
        .interact()?;

    Ok(repositories.swap_remove(index))
}
