pub mod session;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use shipdeck_common::{
    ActionResponse, ApiError, ContainerStats, CustomDomainRequest, DeployStreamRequest,
    DeploymentSource, DeploymentSpec, DetectGithubRequest, DetectionResponse, Deployment, EnvVar,
    HealthResponse, ListRepositoriesResponse, LoginRequest, LoginResponse, LogsResponse,
    MetricsResponse, RollbackRequest, SessionStatus, UpdateEnvRequest, UploadResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::orchestrator::DeployTransport;
use crate::stream::ByteStream;

/// HTTP client for the deployment platform backend
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    cookies: Arc<Jar>,
    stream_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout_secs: u64, stream_timeout_secs: u64) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .cookie_provider(cookies.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookies,
            stream_timeout: Duration::from_secs(stream_timeout_secs),
        })
    }

    /// Get server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn origin(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Invalid server URL: {}", self.base_url))
    }

    /// Load a previously saved `Cookie` header into the jar
    pub fn restore_session(&self, cookie_header: &str) -> Result<()> {
        let origin = self.origin()?;
        for cookie in cookie_header.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            self.cookies.add_cookie_str(cookie, &origin);
        }
        Ok(())
    }

    /// Current cookies as a `Cookie` header value, for saving
    pub fn session_cookie(&self) -> Option<String> {
        let origin = self.origin().ok()?;
        let header = self.cookies.cookies(&origin)?;
        header.to_str().ok().map(str::to_string)
    }

    /// Check whether the session is logged in to GitHub
    pub async fn check_session(&self) -> Result<SessionStatus> {
        let url = format!("{}/api/check-github-session", self.base_url);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to server")?;

        if !response.status().is_success() {
            anyhow::bail!("Session check failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse session response")
    }

    /// Log in with a GitHub personal access token
    pub async fn login(&self, token: &str) -> Result<LoginResponse> {
        let url = format!("{}/api/login/github", self.base_url);
        debug!("POST {}", url);

        let request = LoginRequest {
            token: token.to_string(),
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to server")?;

        if !response.status().is_success() {
            anyhow::bail!("Login failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse login response")
    }

    pub async fn logout(&self) -> Result<()> {
        let url = format!("{}/api/logout/github", self.base_url);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .send()
            .await
            .context("Failed to connect to server")?;

        if !response.status().is_success() {
            anyhow::bail!("Logout failed: {}", api_error(response).await);
        }

        Ok(())
    }

    /// List the logged-in user's repositories
    pub async fn list_repositories(&self) -> Result<ListRepositoriesResponse> {
        let url = format!("{}/api/user/repos", self.base_url);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to list repositories")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list repositories: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse repositories response")
    }

    /// Detect project settings of a GitHub repository
    pub async fn detect_github(&self, repo: &str, branch: &str) -> Result<DetectionResponse> {
        let url = format!("{}/api/detect-github", self.base_url);
        debug!("POST {}", url);

        let request = DetectGithubRequest {
            github_repo: repo.to_string(),
            branch: branch.to_string(),
        };

        let response = self.client
            .post(&url)
            .timeout(self.stream_timeout)
            .json(&request)
            .send()
            .await
            .context("Failed to run detection")?;

        if !response.status().is_success() {
            anyhow::bail!("Detection failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse detection response")
    }

    /// Detect project settings of a zip archive
    pub async fn detect_archive(&self, payload: Vec<u8>, filename: &str) -> Result<DetectionResponse> {
        let url = format!("{}/api/detect-project", self.base_url);
        debug!("POST {} ({} bytes)", url, payload.len());

        let form = Form::new().part("file", zip_part(payload, filename)?);

        let response = self.client
            .post(&url)
            .timeout(self.stream_timeout)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload archive for detection")?;

        if !response.status().is_success() {
            anyhow::bail!("Detection failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse detection response")
    }

    /// Start a git deploy and return its event stream
    pub async fn deploy_stream(&self, request: &DeployStreamRequest) -> Result<ByteStream> {
        let url = format!("{}/api/deploy-stream", self.base_url);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .timeout(self.stream_timeout)
            .json(request)
            .send()
            .await
            .context("Failed to start deployment")?;

        if !response.status().is_success() {
            anyhow::bail!("Deploy failed: {}", api_error(response).await);
        }

        Ok(byte_stream(response))
    }

    /// Upload an archive deploy
    pub async fn deploy_local(&self, spec: &DeploymentSpec) -> Result<UploadResponse> {
        let url = format!("{}/api/deploy-local", self.base_url);

        let DeploymentSource::LocalArchive { payload, filename } = &spec.source else {
            anyhow::bail!("Deployment source is not an archive");
        };
        debug!("POST {} ({} bytes)", url, payload.len());

        let mut form = Form::new().part("file", zip_part(payload.clone(), filename)?);
        for (name, value) in spec.upload_fields()? {
            form = form.text(name, value);
        }

        let response = self.client
            .post(&url)
            .timeout(self.stream_timeout)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload archive")?;

        if !response.status().is_success() {
            anyhow::bail!("Upload failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse upload response")
    }

    /// Attach to the event stream of a deployment
    pub async fn stream_deployment(&self, id: &str) -> Result<ByteStream> {
        let url = format!("{}/api/deployments/{}/stream", self.base_url, id);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .timeout(self.stream_timeout)
            .send()
            .await
            .context("Failed to attach to deployment stream")?;

        if !response.status().is_success() {
            anyhow::bail!("Stream failed: {}", api_error(response).await);
        }

        Ok(byte_stream(response))
    }

    pub async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let url = format!("{}/api/deployments", self.base_url);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to list deployments")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list deployments: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse deployments response")
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        let url = format!("{}/api/deployments/{}", self.base_url, id);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to get deployment")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get deployment: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse deployment")
    }

    /// Container logs, last `tail` lines
    pub async fn logs(&self, id: &str, tail: u32) -> Result<LogsResponse> {
        let url = format!("{}/api/deployments/{}/logs?tail={}", self.base_url, id, tail);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to get logs")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get logs: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse logs response")
    }

    /// Stored metrics for the last `hours`
    pub async fn metrics(&self, id: &str, hours: u32) -> Result<MetricsResponse> {
        let url = format!("{}/api/deployments/{}/metrics?hours={}", self.base_url, id, hours);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to get metrics")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get metrics: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse metrics response")
    }

    /// Live container stats snapshot
    pub async fn stats(&self, id: &str) -> Result<ContainerStats> {
        let url = format!("{}/api/deployments/{}/stats", self.base_url, id);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to get stats")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get stats: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse stats response")
    }

    pub async fn restart(&self, id: &str) -> Result<ActionResponse> {
        let url = format!("{}/api/deployments/{}/restart", self.base_url, id);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .send()
            .await
            .context("Failed to restart deployment")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to restart deployment: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse restart response")
    }

    pub async fn delete(&self, id: &str) -> Result<ActionResponse> {
        let url = format!("{}/api/deployments/{}", self.base_url, id);
        debug!("DELETE {}", url);

        let response = self.client
            .delete(&url)
            .send()
            .await
            .context("Failed to delete deployment")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to delete deployment: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse delete response")
    }

    /// Roll back to `version`, or to the previous version when `None`
    pub async fn rollback(&self, id: &str, version: Option<u32>) -> Result<ActionResponse> {
        let url = format!("{}/api/deployments/{}/rollback", self.base_url, id);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .timeout(self.stream_timeout)
            .json(&RollbackRequest { version })
            .send()
            .await
            .context("Failed to roll back deployment")?;

        if !response.status().is_success() {
            anyhow::bail!("Rollback failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse rollback response")
    }

    pub async fn add_domain(&self, id: &str, request: &CustomDomainRequest) -> Result<ActionResponse> {
        let url = format!("{}/api/deployments/{}/domain", self.base_url, id);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to add custom domain")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to add custom domain: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse domain response")
    }

    /// Replace environment variables; the server restarts the container
    pub async fn update_env(&self, id: &str, vars: Vec<EnvVar>) -> Result<ActionResponse> {
        let url = format!("{}/api/deployments/{}/env", self.base_url, id);
        debug!("PUT {}", url);

        let request = UpdateEnvRequest {
            environment_variables: vars,
        };

        let response = self.client
            .put(&url)
            .timeout(self.stream_timeout)
            .json(&request)
            .send()
            .await
            .context("Failed to update environment")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to update environment: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse environment response")
    }

    /// Backend health. A 503 still carries a health body.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/health", self.base_url);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to server")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("Health check failed: {}", api_error(response).await);
        }

        response.json().await.context("Failed to parse health response")
    }
}

/// Error text from a non-2xx response
async fn api_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    response
        .json::<ApiError>()
        .await
        .unwrap_or_else(|_| ApiError::from_status(status))
}

fn zip_part(payload: Vec<u8>, filename: &str) -> Result<Part> {
    Part::bytes(payload)
        .file_name(filename.to_string())
        .mime_str("application/zip")
        .context("Invalid archive content type")
}

fn byte_stream(response: Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other)))
}

#[async_trait]
impl DeployTransport for ApiClient {
    async fn open_deploy_stream(&self, request: &DeployStreamRequest) -> Result<ByteStream> {
        self.deploy_stream(request).await
    }

    async fn upload_archive(&self, spec: &DeploymentSpec) -> Result<String> {
        Ok(self.deploy_local(spec).await?.id)
    }

    async fn attach_stream(&self, deployment_id: &str) -> Result<ByteStream> {
        self.stream_deployment(deployment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{AttemptStatus, SubmissionOrchestrator};
    use axum::body::Body;
    use axum::extract::{Multipart, Path};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use bytes::Bytes;
    use serde_json::json;
    use shipdeck_common::{
        AttemptFailure, DeploymentConfig, EnvVars, HealthStatus, StaticSiteConfig,
    };

    const EVENTS: &str = concat!(
        "data: {\"type\":\"info\",\"message\":\"Queued\"}\n\n",
        "data: {\"type\":\"log\",\"message\":\"Building\"}\n\n",
        "data: {\"type\": \"done\", \"success\": true, \"deployment\": {\"id\": \"d1\", \"containerId\": \"9f8e7d6c5b4a\", \"port\": \"32768\", \"directUrl\": \"http://127.0.0.1:32768\", \"status\": \"active\"}}\n\n",
    );

    fn event_body(text: &'static str) -> impl IntoResponse {
        // Uneven chunks, like a real chunked response
        let chunks: Vec<Result<Bytes, std::io::Error>> = text
            .as_bytes()
            .chunks(11)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(futures_util::stream::iter(chunks)),
        )
    }

    async fn deploy_stream(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
        assert_eq!(body["githubRepo"], "https://github.com/octo/site.git");
        assert_eq!(body["deploymentType"], "static");
        assert_eq!(body["config"]["publishDir"], "dist");
        event_body(EVENTS)
    }

    async fn deploy_local(mut multipart: Multipart) -> impl IntoResponse {
        let mut file_name = None;
        let mut project_name = None;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                file_name = field.file_name().map(str::to_string);
            }
            let data = field.bytes().await.unwrap();
            if name == "projectName" {
                project_name = Some(String::from_utf8(data.to_vec()).unwrap());
            }
        }
        assert_eq!(file_name.as_deref(), Some("site.zip"));
        let id = match project_name.as_deref() {
            Some("missing-stream") => "d2",
            _ => "d3",
        };
        // The server answers with the whole queued record
        Json(json!({
            "id": id,
            "projectName": project_name,
            "deploymentType": "static",
            "status": "queued",
            "url": format!("/deploy/{}/", id),
            "directUrl": null,
            "timestamp": "2024-05-02T14:03:11.482913",
            "containerId": null,
            "port": null,
            "source": "local",
            "filename": file_name,
            "config": {"publishDir": "dist", "environmentVariables": [], "healthCheckPath": "/"},
            "environmentVariables": [],
            "version": 1,
            "healthCheckPath": "/",
            "volumePath": null,
            "customDomain": null
        }))
    }

    async fn deployment_stream(Path(id): Path<String>) -> axum::response::Response {
        if id == "d3" {
            event_body(EVENTS).into_response()
        } else {
            (StatusCode::NOT_FOUND, Json(json!({"error": "Deployment not found"}))).into_response()
        }
    }

    async fn login(Json(body): Json<serde_json::Value>) -> axum::response::Response {
        if body["token"] == "ghp_valid" {
            (
                [(header::SET_COOKIE, "connect.sid=abc123; Path=/; HttpOnly")],
                Json(json!({"message": "ok", "username": "octocat"})),
            )
                .into_response()
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid GitHub token"})))
                .into_response()
        }
    }

    async fn check_session(headers: HeaderMap) -> Json<serde_json::Value> {
        let logged_in = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|c| c.contains("connect.sid=abc123"));
        if logged_in {
            Json(json!({"authenticated": true, "username": "octocat"}))
        } else {
            Json(json!({"authenticated": false}))
        }
    }

    async fn health() -> impl IntoResponse {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "docker": "disconnected",
                "redis": "connected",
                "database": "sqlite",
                "timestamp": "2024-05-02T14:03:11.482913",
                "queue_length": 2
            })),
        )
    }

    async fn spawn_backend() -> String {
        let router = Router::new()
            .route("/api/deploy-stream", post(deploy_stream))
            .route("/api/deploy-local", post(deploy_local))
            .route("/api/deployments/{id}/stream", get(deployment_stream))
            .route("/api/login/github", post(login))
            .route("/api/check-github-session", get(check_session))
            .route("/api/health", get(health));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, 5, 30).unwrap()
    }

    fn spec(name: &str, source: DeploymentSource) -> DeploymentSpec {
        DeploymentSpec {
            project_name: name.to_string(),
            source,
            config: DeploymentConfig::Static(StaticSiteConfig::default()),
            environment: EnvVars::new(),
            persistent_storage: false,
            health_check_path: "/".into(),
            auto_restart: true,
        }
    }

    fn archive(name: &str) -> DeploymentSpec {
        spec(
            name,
            DeploymentSource::LocalArchive {
                payload: b"PK\x03\x04zipbytes".to_vec(),
                filename: "site.zip".into(),
            },
        )
    }

    #[tokio::test]
    async fn git_deploy_streams_to_success() {
        let base = spawn_backend().await;
        let mut orchestrator = SubmissionOrchestrator::new(client(&base));
        let git = spec(
            "site",
            DeploymentSource::GitUrl {
                url: "https://github.com/octo/site.git".into(),
                branch: "main".into(),
            },
        );

        let attempt = orchestrator.submit(&git, |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Succeeded);
        assert_eq!(attempt.events().len(), 2);
        assert_eq!(attempt.finalized().and_then(|d| d.port), Some(32768));
    }

    #[tokio::test]
    async fn archive_deploy_uploads_then_streams() {
        let base = spawn_backend().await;
        let mut orchestrator = SubmissionOrchestrator::new(client(&base));

        let attempt = orchestrator.submit(&archive("site"), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Succeeded);
        assert_eq!(attempt.events().len(), 2);
        let deployment = attempt.finalized().unwrap();
        assert_eq!(deployment.port, Some(32768));
        assert_eq!(deployment.direct_url.as_deref(), Some("http://127.0.0.1:32768"));
    }

    #[tokio::test]
    async fn archive_stream_404_is_transport_failure() {
        let base = spawn_backend().await;
        let mut orchestrator = SubmissionOrchestrator::new(client(&base));

        let attempt = orchestrator
            .submit(&archive("missing-stream"), |_| {})
            .await
            .unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Failed);
        assert_eq!(attempt.deployment_id(), Some("d2"));
        assert!(matches!(
            attempt.failure(),
            Some(AttemptFailure::Transport(msg)) if msg.contains("Deployment not found")
        ));
    }

    #[tokio::test]
    async fn login_cookie_is_kept_and_restorable() {
        let base = spawn_backend().await;
        let api = client(&base);

        assert!(!api.check_session().await.unwrap().authenticated);
        let login = api.login("ghp_valid").await.unwrap();
        assert_eq!(login.username, "octocat");
        assert!(api.check_session().await.unwrap().authenticated);

        let saved = api.session_cookie().unwrap();
        let fresh = client(&base);
        fresh.restore_session(&saved).unwrap();
        let status = fresh.check_session().await.unwrap();
        assert_eq!(status.username.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn failed_login_surfaces_server_error() {
        let base = spawn_backend().await;
        let err = client(&base).login("nope").await.unwrap_err();
        assert!(err.to_string().contains("Invalid GitHub token"));
    }

    #[tokio::test]
    async fn unhealthy_backend_is_not_an_error() {
        let base = spawn_backend().await;
        let health = client(&base).health().await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.queue_length, 2);
    }
}
