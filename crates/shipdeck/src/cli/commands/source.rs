use anyhow::Result;
use shipdeck_common::{CliConfig, DeploymentSource, DetectionResponse};

use crate::api_client::ApiClient;
use crate::archive;
use crate::cli::commands::repos;
use crate::cli::SourceArgs;
use crate::tui::Styles;

/// Turn the source flags into a deployment source and a suggested project name
pub async fn resolve(
    args: &SourceArgs,
    branch: Option<&str>,
    client: &ApiClient,
    config: &CliConfig,
) -> Result<(DeploymentSource, String)> {
    if let Some(path) = &args.archive {
        let name = archive::project_name_from(path);
        let loaded = archive::load_archive(path)?;
        Styles::kv("Archive", &format!(
            "{} ({})",
            loaded.filename,
            Styles::format_bytes(loaded.payload.len() as u64)
        ));
        return Ok((loaded.into_source(), name));
    }

    if args.select {
        let repo = repos::select_repository(client).await?;
        let branch = branch.map(str::to_string).unwrap_or(repo.default_branch);
        let name = repo_name(&repo.clone_url);
        return Ok((
            DeploymentSource::GitSelected {
                clone_url: repo.clone_url,
                branch,
            },
            name,
        ));
    }

    match &args.repo {
        Some(url) => Ok((
            DeploymentSource::GitUrl {
                url: url.trim().to_string(),
                branch: branch
                    .map(str::to_string)
                    .unwrap_or_else(|| config.deploy.default_branch.clone()),
            },
            repo_name(url),
        )),
        None => anyhow::bail!("Specify --repo, --select or --archive"),
    }
}

/// Ask the server to detect settings for a source
pub async fn detect(client: &ApiClient, source: &DeploymentSource) -> Result<DetectionResponse> {
    match source {
        DeploymentSource::GitUrl { url, branch } => client.detect_github(url, branch).await,
        DeploymentSource::GitSelected { clone_url, branch } => {
            client.detect_github(clone_url, branch).await
        }
        DeploymentSource::LocalArchive { payload, filename } => {
            client.detect_archive(payload.clone(), filename).await
        }
    }
}

/// Repository name from a clone URL, e.g. `https://github.com/octo/site.git` -> `site`
pub fn repo_name(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(|c: char| c == '/' || c == ':').next().unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "project".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_names_from_urls() {
        assert_eq!(repo_name("https://github.com/octo/site.git"), "site");
        assert_eq!(repo_name("https://github.com/octo/api/"), "api");
        assert_eq!(repo_name("git@github.com:octo/blog.git"), "blog");
        assert_eq!(repo_name(""), "project");
    }
}
