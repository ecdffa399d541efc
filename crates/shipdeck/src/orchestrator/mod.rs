//! Runs a deployment attempt from submission to a terminal state.
//!
//! An attempt moves `idle -> submitting -> streaming -> succeeded | failed`.
//! Events are recorded in arrival order. If the stream ends without a `done`
//! event the attempt is failed, so it can never be left in flight.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipdeck_common::{
    AttemptFailure, DeployStreamRequest, DeploymentSpec, DoneEvent, FinalizedDeployment,
    ProgressEvent, ValidationError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::resolver;
use crate::stream::{ByteStream, EventConsumer};

/// Server operations needed to run an attempt
#[async_trait]
pub trait DeployTransport: Send + Sync {
    /// Start a git deploy. Returns the event stream once the server accepted it.
    async fn open_deploy_stream(&self, request: &DeployStreamRequest) -> Result<ByteStream>;

    /// Upload an archive deploy. Returns the server-assigned deployment id.
    async fn upload_archive(&self, spec: &DeploymentSpec) -> Result<String>;

    /// Attach to the event stream of an uploaded deployment
    async fn attach_stream(&self, deployment_id: &str) -> Result<ByteStream>;
}

/// Lifecycle of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Idle,
    Submitting,
    Streaming,
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Succeeded | AttemptStatus::Failed)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptStatus::Idle => "idle",
            AttemptStatus::Submitting => "submitting",
            AttemptStatus::Streaming => "streaming",
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// An event as it was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub received_at: DateTime<Utc>,
    pub event: ProgressEvent,
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded(Option<FinalizedDeployment>),
    Failed(AttemptFailure),
}

/// One submission of a [`DeploymentSpec`]
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    id: Uuid,
    status: AttemptStatus,
    deployment_id: Option<String>,
    events: Vec<RecordedEvent>,
    outcome: Option<AttemptOutcome>,
}

impl Default for DeploymentAttempt {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AttemptStatus::Idle,
            deployment_id: None,
            events: Vec::new(),
            outcome: None,
        }
    }
}

impl DeploymentAttempt {
    /// Local identifier, unrelated to the server's deployment id
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Server deployment id, once known
    pub fn deployment_id(&self) -> Option<&str> {
        self.deployment_id.as_deref()
    }

    /// Non-terminal events in arrival order
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            Some(AttemptOutcome::Failed(failure)) => Some(failure),
            _ => None,
        }
    }

    pub fn finalized(&self) -> Option<&FinalizedDeployment> {
        match &self.outcome {
            Some(AttemptOutcome::Succeeded(deployment)) => deployment.as_ref(),
            _ => None,
        }
    }
}

/// Progress notifications handed to the observer while an attempt runs
#[derive(Debug, Clone, Copy)]
pub enum AttemptUpdate<'a> {
    Status(AttemptStatus),
    /// Archive accepted; the server assigned this deployment id
    Uploaded(&'a str),
    Event(&'a RecordedEvent),
}

/// Owns the current attempt. Taking `&mut self` to submit keeps a single
/// writer per attempt.
pub struct SubmissionOrchestrator<T> {
    transport: T,
    attempt: DeploymentAttempt,
}

impl<T: DeployTransport> SubmissionOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            attempt: DeploymentAttempt::default(),
        }
    }

    pub fn attempt(&self) -> &DeploymentAttempt {
        &self.attempt
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Validate and run one attempt to completion.
    ///
    /// A spec that fails validation is rejected without any network call and the
    /// current attempt is left as it was. Otherwise a fresh attempt replaces the
    /// previous one and always ends succeeded or failed.
    pub async fn submit<F>(
        &mut self,
        spec: &DeploymentSpec,
        mut observer: F,
    ) -> Result<&DeploymentAttempt, ValidationError>
    where
        F: FnMut(AttemptUpdate<'_>),
    {
        resolver::validate(spec)?;

        self.attempt = DeploymentAttempt::default();
        info!(
            "Attempt {} for '{}' from {}",
            self.attempt.id,
            spec.project_name,
            spec.source.describe()
        );
        self.transition(AttemptStatus::Submitting, &mut observer);

        let body = match self.open(spec, &mut observer).await {
            Ok(body) => body,
            Err(e) => {
                self.finish(
                    AttemptOutcome::Failed(AttemptFailure::Transport(format!("{:#}", e))),
                    &mut observer,
                );
                return Ok(&self.attempt);
            }
        };

        self.transition(AttemptStatus::Streaming, &mut observer);

        let mut consumer = EventConsumer::new(body);
        while let Some(event) = consumer.next_event().await {
            match event {
                ProgressEvent::Done(done) => {
                    let outcome = match done {
                        DoneEvent::Succeeded { deployment } => {
                            if let Some(d) = &deployment {
                                self.attempt.deployment_id = Some(d.id.clone());
                            }
                            AttemptOutcome::Succeeded(deployment)
                        }
                        DoneEvent::Failed { error } => {
                            AttemptOutcome::Failed(AttemptFailure::RemoteDeployFailure(error))
                        }
                    };
                    self.finish(outcome, &mut observer);
                    debug!("Closing event stream after terminal event");
                    break;
                }
                event => {
                    self.attempt.events.push(RecordedEvent {
                        received_at: Utc::now(),
                        event,
                    });
                    if let Some(recorded) = self.attempt.events.last() {
                        observer(AttemptUpdate::Event(recorded));
                    }
                }
            }
        }

        if consumer.dropped() > 0 {
            debug!("{} stream line(s) could not be decoded", consumer.dropped());
        }

        if !self.attempt.status.is_terminal() {
            warn!("Event stream ended without a terminal event");
            self.finish(
                AttemptOutcome::Failed(AttemptFailure::StreamTerminatedEarly),
                &mut observer,
            );
        }

        Ok(&self.attempt)
    }

    async fn open<F>(&mut self, spec: &DeploymentSpec, observer: &mut F) -> Result<ByteStream>
    where
        F: FnMut(AttemptUpdate<'_>),
    {
        if let Some(request) = spec.stream_request() {
            return self.transport.open_deploy_stream(&request).await;
        }

        let deployment_id = self.transport.upload_archive(spec).await?;
        info!("Archive uploaded as deployment {}", deployment_id);
        observer(AttemptUpdate::Uploaded(&deployment_id));
        self.attempt.deployment_id = Some(deployment_id.clone());

        self.transport.attach_stream(&deployment_id).await
    }

    fn transition<F>(&mut self, status: AttemptStatus, observer: &mut F)
    where
        F: FnMut(AttemptUpdate<'_>),
    {
        debug!("Attempt {}: {} -> {}", self.attempt.id, self.attempt.status, status);
        self.attempt.status = status;
        observer(AttemptUpdate::Status(status));
    }

    fn finish<F>(&mut self, outcome: AttemptOutcome, observer: &mut F)
    where
        F: FnMut(AttemptUpdate<'_>),
    {
        let status = match &outcome {
            AttemptOutcome::Succeeded(_) => AttemptStatus::Succeeded,
            AttemptOutcome::Failed(failure) => {
                warn!("Attempt {} failed: {}", self.attempt.id, failure);
                AttemptStatus::Failed
            }
        };
        self.attempt.outcome = Some(outcome);
        self.transition(status, observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use shipdeck_common::{DeploymentConfig, DeploymentSource, EnvVars, StaticSiteConfig};
    use std::sync::Mutex;

    /// Scripted transport that records every call
    #[derive(Default)]
    struct FakeTransport {
        git_body: Option<&'static str>,
        upload_id: Option<&'static str>,
        attach_body: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn body(text: &'static str) -> ByteStream {
        // Small chunks so events straddle chunk boundaries
        let chunks: Vec<Result<Bytes, std::io::Error>> = text
            .as_bytes()
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[async_trait]
    impl DeployTransport for FakeTransport {
        async fn open_deploy_stream(&self, request: &DeployStreamRequest) -> Result<ByteStream> {
            self.record(format!("stream {}", request.github_repo));
            match self.git_body {
                Some(text) => Ok(body(text)),
                None => anyhow::bail!("Deploy failed: HTTP 500"),
            }
        }

        async fn upload_archive(&self, spec: &DeploymentSpec) -> Result<String> {
            self.record(format!("upload {}", spec.project_name));
            match self.upload_id {
                Some(id) => Ok(id.to_string()),
                None => anyhow::bail!("Upload failed: HTTP 413"),
            }
        }

        async fn attach_stream(&self, deployment_id: &str) -> Result<ByteStream> {
            self.record(format!("attach {}", deployment_id));
            match self.attach_body {
                Some(text) => Ok(body(text)),
                None => anyhow::bail!("Stream failed: HTTP 404"),
            }
        }
    }

    fn git_spec(name: &str) -> DeploymentSpec {
        DeploymentSpec {
            project_name: name.to_string(),
            source: DeploymentSource::GitUrl {
                url: "https://github.com/octo/site.git".into(),
                branch: "main".into(),
            },
            config: DeploymentConfig::Static(StaticSiteConfig::default()),
            environment: EnvVars::new(),
            persistent_storage: false,
            health_check_path: "/".into(),
            auto_restart: true,
        }
    }

    fn archive_spec() -> DeploymentSpec {
        DeploymentSpec {
            source: DeploymentSource::LocalArchive {
                payload: b"PK\x03\x04".to_vec(),
                filename: "site.zip".into(),
            },
            ..git_spec("upload")
        }
    }

    const SUCCESS: &str = concat!(
        "data: {\"type\":\"log\",\"message\":\"Cloning repository\"}\n\n",
        "data: {\"type\":\"done\",\"success\":true,\"deployment\":{\"id\":\"d1\"}}\n\n",
    );

    #[tokio::test]
    async fn empty_project_name_is_rejected_without_network() {
        let mut orchestrator = SubmissionOrchestrator::new(FakeTransport::default());

        let err = orchestrator.submit(&git_spec(""), |_| {}).await.unwrap_err();

        assert_eq!(err, ValidationError::MissingProjectName);
        assert_eq!(orchestrator.attempt().status(), AttemptStatus::Idle);
        assert!(orchestrator.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn git_deploy_succeeds_with_recorded_events() {
        let transport = FakeTransport {
            git_body: Some(SUCCESS),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Succeeded);
        assert_eq!(attempt.finalized().map(|d| d.id.as_str()), Some("d1"));
        assert_eq!(attempt.deployment_id(), Some("d1"));
        assert_eq!(attempt.events().len(), 1);
        assert_eq!(
            attempt.events()[0].event,
            ProgressEvent::Log {
                message: "Cloning repository".into()
            }
        );
    }

    #[tokio::test]
    async fn observer_sees_every_transition_in_order() {
        let transport = FakeTransport {
            git_body: Some(SUCCESS),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let mut seen = Vec::new();
        orchestrator
            .submit(&git_spec("site"), |update| match update {
                AttemptUpdate::Status(status) => seen.push(status.to_string()),
                AttemptUpdate::Event(_) => seen.push("event".to_string()),
                AttemptUpdate::Uploaded(id) => seen.push(format!("uploaded {}", id)),
            })
            .await
            .unwrap();

        assert_eq!(seen, ["submitting", "streaming", "event", "succeeded"]);
    }

    #[tokio::test]
    async fn archive_stream_not_found_is_transport_failure() {
        let transport = FakeTransport {
            upload_id: Some("d2"),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&archive_spec(), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Failed);
        assert_eq!(attempt.deployment_id(), Some("d2"));
        assert!(matches!(attempt.failure(), Some(AttemptFailure::Transport(msg)) if msg.contains("404")));
        assert_eq!(orchestrator.transport().calls(), ["upload upload", "attach d2"]);
    }

    #[tokio::test]
    async fn archive_deploy_streams_after_upload() {
        let transport = FakeTransport {
            upload_id: Some("d3"),
            attach_body: Some(
                "data: {\"type\": \"done\", \"success\": true, \"deployment\": {\"id\": \"d3\", \"containerId\": \"0c1d2e3f\", \"port\": \"32768\", \"directUrl\": \"http://203.0.113.7:32768\", \"status\": \"active\"}}\n\n",
            ),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&archive_spec(), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Succeeded);
        assert_eq!(attempt.finalized().and_then(|d| d.port), Some(32768));
        assert!(attempt.events().is_empty());
    }

    #[tokio::test]
    async fn rejected_git_request_never_streams() {
        let mut orchestrator = SubmissionOrchestrator::new(FakeTransport::default());

        let mut statuses = Vec::new();
        let attempt = orchestrator
            .submit(&git_spec("site"), |update| {
                if let AttemptUpdate::Status(s) = update {
                    statuses.push(s);
                }
            })
            .await
            .unwrap();

        assert!(matches!(attempt.failure(), Some(AttemptFailure::Transport(_))));
        assert_eq!(statuses, [AttemptStatus::Submitting, AttemptStatus::Failed]);
    }

    #[tokio::test]
    async fn stream_closing_without_done_fails() {
        let transport = FakeTransport {
            git_body: Some(concat!(
                "data: {\"type\":\"log\",\"message\":\"one\"}\n\n",
                "data: {\"type\":\"log\",\"message\":\"two\"}\n\n",
            )),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Failed);
        assert_eq!(attempt.failure(), Some(&AttemptFailure::StreamTerminatedEarly));
        assert_eq!(attempt.events().len(), 2);
    }

    #[tokio::test]
    async fn remote_failure_keeps_server_text() {
        let transport = FakeTransport {
            git_body: Some(concat!(
                "data: {\"type\":\"error\",\"message\":\"npm ERR! missing script: build\"}\n\n",
                "data: {\"type\":\"done\",\"success\":false,\"error\":\"Build exited with code 1\"}\n\n",
            )),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();

        assert_eq!(
            attempt.failure(),
            Some(&AttemptFailure::RemoteDeployFailure(
                "Build exited with code 1".into()
            ))
        );
        assert_eq!(attempt.events().len(), 1);
    }

    #[tokio::test]
    async fn events_after_done_are_ignored() {
        let transport = FakeTransport {
            git_body: Some(concat!(
                "data: {\"type\":\"done\",\"success\":true}\n\n",
                "data: {\"type\":\"log\",\"message\":\"late\"}\n\n",
                "data: {\"type\":\"done\",\"success\":false,\"error\":\"late\"}\n\n",
            )),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let attempt = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();

        assert_eq!(attempt.status(), AttemptStatus::Succeeded);
        assert!(attempt.events().is_empty());
    }

    #[tokio::test]
    async fn resubmission_starts_a_fresh_attempt() {
        let transport = FakeTransport {
            git_body: Some(SUCCESS),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        let first_id = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap().id();
        let second = orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();

        assert_ne!(second.id(), first_id);
        assert_eq!(second.events().len(), 1);
    }

    #[tokio::test]
    async fn invalid_resubmission_keeps_previous_result() {
        let transport = FakeTransport {
            git_body: Some(SUCCESS),
            ..Default::default()
        };
        let mut orchestrator = SubmissionOrchestrator::new(transport);

        orchestrator.submit(&git_spec("site"), |_| {}).await.unwrap();
        let previous = orchestrator.attempt().id();
        assert!(orchestrator.submit(&git_spec(" "), |_| {}).await.is_err());

        assert_eq!(orchestrator.attempt().id(), previous);
        assert_eq!(orchestrator.attempt().status(), AttemptStatus::Succeeded);
    }
}
