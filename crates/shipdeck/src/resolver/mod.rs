//! Turns form state, detection results and manual edits into a [`DeploymentSpec`].

use shipdeck_common::{
    DeployDefaults, DeploymentConfig, DeploymentKind, DeploymentSource, DeploymentSpec, Detection,
    EnvVars, Runtime, StaticSiteConfig, ValidationError, WebServiceConfig,
};
use tracing::{debug, warn};

/// Editable deployment settings, before a source and name are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentForm {
    pub kind: DeploymentKind,
    pub static_site: StaticSiteConfig,
    pub service: WebServiceConfig,
    pub environment: EnvVars,
    pub persistent_storage: bool,
    pub health_check_path: String,
    pub auto_restart: bool,
}

impl Default for DeploymentForm {
    fn default() -> Self {
        Self::from_defaults(&DeployDefaults::default())
    }
}

impl DeploymentForm {
    pub fn from_defaults(defaults: &DeployDefaults) -> Self {
        Self {
            kind: DeploymentKind::default(),
            static_site: StaticSiteConfig::default(),
            service: WebServiceConfig::default(),
            environment: EnvVars::new(),
            persistent_storage: defaults.persistent_storage,
            health_check_path: defaults.health_check_path.clone(),
            auto_restart: defaults.auto_restart,
        }
    }

    /// Config for the selected kind, with empty required fields defaulted
    pub fn config(&self) -> DeploymentConfig {
        match self.kind {
            DeploymentKind::Static => {
                let fallback = StaticSiteConfig::default();
                let mut config = self.static_site.clone();
                if config.publish_dir.trim().is_empty() {
                    config.publish_dir = fallback.publish_dir;
                }
                if config.entry_file.trim().is_empty() {
                    config.entry_file = fallback.entry_file;
                }
                DeploymentConfig::Static(config)
            }
            DeploymentKind::Service => {
                let mut config = self.service.clone();
                if config.entry_file.trim().is_empty() {
                    config.entry_file = config.runtime.default_entry_file().to_string();
                }
                if config.port.trim().is_empty() {
                    config.port = config.runtime.default_port().to_string();
                }
                DeploymentConfig::Service(config)
            }
        }
    }

    pub fn to_spec(&self, project_name: &str, source: DeploymentSource) -> DeploymentSpec {
        let health_check_path = if self.health_check_path.trim().is_empty() {
            "/".to_string()
        } else {
            self.health_check_path.clone()
        };

        DeploymentSpec {
            project_name: project_name.trim().to_string(),
            source,
            config: self.config(),
            environment: self.environment.clone(),
            persistent_storage: self.persistent_storage,
            health_check_path,
            auto_restart: self.auto_restart,
        }
    }
}

/// Switch runtime, resetting entry file and port to the new runtime's defaults.
/// Every other field is kept.
pub fn apply_runtime_change(config: &WebServiceConfig, runtime: Runtime) -> WebServiceConfig {
    WebServiceConfig {
        runtime,
        entry_file: runtime.default_entry_file().to_string(),
        port: runtime.default_port().to_string(),
        ..config.clone()
    }
}

/// Seed the form from a detection. Fields the detection provides win over
/// whatever the form held.
pub fn apply_detection(form: &mut DeploymentForm, detection: &Detection) {
    let suggested = &detection.config;

    match detection.kind {
        DeploymentKind::Static => {
            form.kind = DeploymentKind::Static;
            if let Some(cmd) = non_empty(&suggested.build_command) {
                form.static_site.build_command = cmd.to_string();
            }
            if let Some(dir) = non_empty(&suggested.publish_dir) {
                form.static_site.publish_dir = dir.to_string();
            }
        }
        DeploymentKind::Service => {
            form.kind = DeploymentKind::Service;

            let runtime = detection
                .supported_runtime()
                .or_else(|| suggested.runtime.as_deref().and_then(|r| r.parse().ok()));
            match runtime {
                Some(runtime) if runtime != form.service.runtime => {
                    form.service = apply_runtime_change(&form.service, runtime);
                }
                Some(_) => {}
                None => warn!(
                    "Detected runtime {:?} is not supported, keeping {}",
                    detection.runtime, form.service.runtime
                ),
            }

            if let Some(entry) = non_empty(&suggested.entry_file) {
                form.service.entry_file = entry.to_string();
            }
            if let Some(port) = non_empty(&suggested.port) {
                form.service.port = port.to_string();
            }
            if let Some(cmd) = non_empty(&suggested.start_command) {
                form.service.start_command = cmd.to_string();
            }
            form.service.build_command = suggested.build_command.clone().unwrap_or_default();
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Check a spec before anything is sent
pub fn validate(spec: &DeploymentSpec) -> Result<(), ValidationError> {
    if spec.project_name.trim().is_empty() {
        return Err(ValidationError::MissingProjectName);
    }

    match &spec.source {
        DeploymentSource::GitUrl { url, .. } if url.trim().is_empty() => {
            return Err(ValidationError::MissingRepositoryUrl);
        }
        DeploymentSource::GitSelected { clone_url, .. } if clone_url.trim().is_empty() => {
            return Err(ValidationError::MissingSelectedRepository);
        }
        DeploymentSource::LocalArchive { payload, filename }
            if payload.is_empty() || filename.trim().is_empty() =>
        {
            return Err(ValidationError::MissingArchive);
        }
        _ => {}
    }

    match &spec.config {
        DeploymentConfig::Static(config) => {
            if config.publish_dir.trim().is_empty() {
                return Err(ValidationError::MissingPublishDir);
            }
        }
        DeploymentConfig::Service(config) => {
            if config.entry_file.trim().is_empty() {
                return Err(ValidationError::MissingEntryFile);
            }
            let port = config.port.trim();
            if port.is_empty() {
                return Err(ValidationError::MissingPort);
            }
            match port.parse::<u16>() {
                Ok(p) if p > 0 => {}
                _ => return Err(ValidationError::InvalidPort(port.to_string())),
            }
        }
    }

    if spec.environment.iter().any(|v| v.key.is_empty()) {
        return Err(ValidationError::EmptyEnvKey);
    }

    Ok(())
}

/// Identifies one detection request. Later tickets supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DetectionTicket(u64);

/// Whether a detection result was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    Applied,
    /// A newer detection was requested after this one
    Stale,
}

/// Owns the form state and fences out-of-order detection results
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    form: DeploymentForm,
    latest_ticket: u64,
}

impl ConfigResolver {
    pub fn new(form: DeploymentForm) -> Self {
        Self {
            form,
            latest_ticket: 0,
        }
    }

    pub fn form(&self) -> &DeploymentForm {
        &self.form
    }

    /// Manual edits go through here
    pub fn form_mut(&mut self) -> &mut DeploymentForm {
        &mut self.form
    }

    pub fn set_kind(&mut self, kind: DeploymentKind) {
        self.form.kind = kind;
    }

    pub fn set_runtime(&mut self, runtime: Runtime) {
        self.form.service = apply_runtime_change(&self.form.service, runtime);
    }

    /// Call when a source or file is selected, before sending the detection request
    pub fn begin_detection(&mut self) -> DetectionTicket {
        self.latest_ticket += 1;
        DetectionTicket(self.latest_ticket)
    }

    /// Apply a detection result unless a newer detection has been requested since
    pub fn apply_detection(&mut self, ticket: DetectionTicket, detection: &Detection) -> DetectionOutcome {
        if ticket.0 < self.latest_ticket {
            warn!(
                "Ignoring stale detection #{} (latest is #{})",
                ticket.0, self.latest_ticket
            );
            return DetectionOutcome::Stale;
        }

        apply_detection(&mut self.form, detection);
        debug!("Applied detection #{}: {}", ticket.0, self.form.kind);
        DetectionOutcome::Applied
    }

    /// Build and validate the spec for submission
    pub fn resolve(
        &self,
        project_name: &str,
        source: DeploymentSource,
    ) -> Result<DeploymentSpec, ValidationError> {
        let spec = self.form.to_spec(project_name, source);
        validate(&spec)?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipdeck_common::DetectedConfig;

    fn git_source() -> DeploymentSource {
        DeploymentSource::GitUrl {
            url: "https://github.com/octo/app.git".into(),
            branch: "main".into(),
        }
    }

    fn service_detection(runtime: &str, config: DetectedConfig) -> Detection {
        Detection {
            kind: DeploymentKind::Service,
            runtime: Some(runtime.into()),
            framework: None,
            build_tool: None,
            config,
        }
    }

    fn static_detection(config: DetectedConfig) -> Detection {
        Detection {
            kind: DeploymentKind::Static,
            runtime: Some("nodejs".into()),
            framework: Some("react-vite".into()),
            build_tool: None,
            config,
        }
    }

    #[test]
    fn runtime_change_resets_entry_and_port_only() {
        let mut config = WebServiceConfig::for_runtime(Runtime::Python);
        config.port = "8080".into();
        config.build_command = "pip install -r requirements.txt".into();
        config.start_command = "gunicorn app:app".into();

        let switched = apply_runtime_change(&config, Runtime::Nodejs);
        assert_eq!(switched.runtime, Runtime::Nodejs);
        assert_eq!(switched.port, "3000");
        assert_eq!(switched.entry_file, "index.js");
        assert_eq!(switched.build_command, "pip install -r requirements.txt");
        assert_eq!(switched.start_command, "gunicorn app:app");
    }

    #[test]
    fn runtime_change_is_idempotent() {
        let base = WebServiceConfig::for_runtime(Runtime::Python);
        for runtime in Runtime::ALL {
            let once = apply_runtime_change(&base, runtime);
            let twice = apply_runtime_change(&once, runtime);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn static_detection_only_overwrites_provided_fields() {
        let mut form = DeploymentForm::default();
        form.static_site.build_command = "make site".into();
        form.static_site.publish_dir = "public".into();

        apply_detection(
            &mut form,
            &static_detection(DetectedConfig {
                build_command: Some(String::new()),
                publish_dir: Some("out".into()),
                ..Default::default()
            }),
        );

        assert_eq!(form.kind, DeploymentKind::Static);
        assert_eq!(form.static_site.build_command, "make site");
        assert_eq!(form.static_site.publish_dir, "out");
    }

    #[test]
    fn service_detection_overwrites_and_clears_build_command() {
        let mut form = DeploymentForm::default();
        form.service.port = "9999".into();
        form.service.build_command = "custom build".into();

        apply_detection(
            &mut form,
            &service_detection(
                "nodejs",
                DetectedConfig {
                    entry_file: Some("server.js".into()),
                    port: Some("3000".into()),
                    start_command: Some("npm start".into()),
                    ..Default::default()
                },
            ),
        );

        assert_eq!(form.kind, DeploymentKind::Service);
        assert_eq!(form.service.runtime, Runtime::Nodejs);
        assert_eq!(form.service.entry_file, "server.js");
        assert_eq!(form.service.port, "3000");
        assert_eq!(form.service.start_command, "npm start");
        assert_eq!(form.service.build_command, "");
    }

    #[test]
    fn unsupported_runtime_keeps_current_runtime() {
        let mut form = DeploymentForm::default();
        apply_detection(&mut form, &service_detection("java", DetectedConfig::default()));

        assert_eq!(form.kind, DeploymentKind::Service);
        assert_eq!(form.service.runtime, Runtime::Python);
        assert_eq!(form.service.port, "5000");
    }

    #[test]
    fn detection_then_validate_never_fails() {
        let detections = [
            service_detection(
                "python",
                DetectedConfig {
                    runtime: Some("python".into()),
                    entry_file: Some("manage.py".into()),
                    port: Some("8000".into()),
                    start_command: Some("python manage.py runserver 0.0.0.0:8000".into()),
                    ..Default::default()
                },
            ),
            static_detection(DetectedConfig {
                build_command: Some("npm install && npm run build".into()),
                publish_dir: Some("dist".into()),
                ..Default::default()
            }),
        ];

        for detection in &detections {
            let mut resolver = ConfigResolver::default();
            let ticket = resolver.begin_detection();
            assert_eq!(resolver.apply_detection(ticket, detection), DetectionOutcome::Applied);
            assert!(resolver.resolve("my-app", git_source()).is_ok());
        }
    }

    #[test]
    fn stale_detection_is_ignored() {
        let mut resolver = ConfigResolver::default();
        let first = resolver.begin_detection();
        let second = resolver.begin_detection();

        let newer = service_detection(
            "nodejs",
            DetectedConfig {
                port: Some("3000".into()),
                ..Default::default()
            },
        );
        let older = static_detection(DetectedConfig::default());

        assert_eq!(resolver.apply_detection(second, &newer), DetectionOutcome::Applied);
        let before = resolver.form().clone();
        assert_eq!(resolver.apply_detection(first, &older), DetectionOutcome::Stale);
        assert_eq!(resolver.form(), &before);
        assert_eq!(resolver.form().kind, DeploymentKind::Service);
    }

    #[test]
    fn older_response_is_stale_even_if_it_arrives_first() {
        let mut resolver = ConfigResolver::default();
        let first = resolver.begin_detection();
        let _second = resolver.begin_detection();

        let outcome = resolver.apply_detection(first, &static_detection(DetectedConfig::default()));
        assert_eq!(outcome, DetectionOutcome::Stale);
    }

    #[test]
    fn edits_after_detection_survive() {
        let mut resolver = ConfigResolver::default();
        let ticket = resolver.begin_detection();
        resolver.apply_detection(
            ticket,
            &service_detection(
                "python",
                DetectedConfig {
                    port: Some("5000".into()),
                    ..Default::default()
                },
            ),
        );
        resolver.form_mut().service.port = "8080".into();

        let spec = resolver.resolve("api", git_source()).unwrap();
        let DeploymentConfig::Service(config) = spec.config else {
            panic!("expected service config");
        };
        assert_eq!(config.port, "8080");
    }

    #[test]
    fn switching_runtime_after_manual_port_resets_it() {
        let mut resolver = ConfigResolver::default();
        resolver.set_kind(DeploymentKind::Service);
        resolver.form_mut().service.port = "8080".into();
        resolver.set_runtime(Runtime::Nodejs);
        assert_eq!(resolver.form().service.port, "3000");
    }

    #[test]
    fn empty_project_name_fails_validation() {
        let resolver = ConfigResolver::default();
        assert_eq!(
            resolver.resolve("   ", git_source()).unwrap_err(),
            ValidationError::MissingProjectName
        );
    }

    #[test]
    fn incomplete_sources_fail_validation() {
        let resolver = ConfigResolver::default();

        let err = resolver
            .resolve(
                "app",
                DeploymentSource::GitUrl {
                    url: String::new(),
                    branch: "main".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingRepositoryUrl);

        let err = resolver
            .resolve(
                "app",
                DeploymentSource::LocalArchive {
                    payload: Vec::new(),
                    filename: "app.zip".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingArchive);
    }

    #[test]
    fn empty_service_fields_are_defaulted_before_validation() {
        let mut resolver = ConfigResolver::default();
        resolver.set_kind(DeploymentKind::Service);
        resolver.form_mut().service.entry_file.clear();
        resolver.form_mut().service.port.clear();

        let spec = resolver.resolve("api", git_source()).unwrap();
        let DeploymentConfig::Service(config) = spec.config else {
            panic!("expected service config");
        };
        assert_eq!(config.entry_file, "app.py");
        assert_eq!(config.port, "5000");
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut resolver = ConfigResolver::default();
        resolver.set_kind(DeploymentKind::Service);
        resolver.form_mut().service.port = "http".into();
        assert_eq!(
            resolver.resolve("api", git_source()).unwrap_err(),
            ValidationError::InvalidPort("http".into())
        );
    }
}
