use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of deployment the platform builds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    /// Built (optionally) and served as static files
    #[default]
    Static,
    /// Long-running process listening on a port
    Service,
}

impl std::fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentKind::Static => write!(f, "static"),
            DeploymentKind::Service => write!(f, "service"),
        }
    }
}

impl FromStr for DeploymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" | "static-site" | "site" => Ok(DeploymentKind::Static),
            "service" | "web-service" | "web" => Ok(DeploymentKind::Service),
            other => Err(format!("unknown deployment type '{}'", other)),
        }
    }
}

/// Language runtime for web services
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    #[default]
    Python,
    Nodejs,
}

impl Runtime {
    pub const ALL: [Runtime; 2] = [Runtime::Python, Runtime::Nodejs];

    /// Canonical entry file for this runtime
    pub fn default_entry_file(&self) -> &'static str {
        match self {
            Runtime::Python => "app.py",
            Runtime::Nodejs => "index.js",
        }
    }

    /// Canonical listening port for this runtime
    pub fn default_port(&self) -> &'static str {
        match self {
            Runtime::Python => "5000",
            Runtime::Nodejs => "3000",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Runtime::Python => write!(f, "python"),
            Runtime::Nodejs => write!(f, "nodejs"),
        }
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Runtime::Python),
            "nodejs" | "node" | "node.js" => Ok(Runtime::Nodejs),
            other => Err(format!("unsupported runtime '{}'", other)),
        }
    }
}

/// Settings for a static site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticSiteConfig {
    /// Empty means "no build step"
    #[serde(default)]
    pub build_command: String,
    #[serde(default = "default_publish_dir")]
    pub publish_dir: String,
    #[serde(default = "default_static_entry")]
    pub entry_file: String,
}

impl Default for StaticSiteConfig {
    fn default() -> Self {
        Self {
            build_command: String::new(),
            publish_dir: default_publish_dir(),
            entry_file: default_static_entry(),
        }
    }
}

fn default_publish_dir() -> String {
    "dist".to_string()
}

fn default_static_entry() -> String {
    "index.html".to_string()
}

/// Settings for a web service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebServiceConfig {
    pub runtime: Runtime,
    #[serde(default)]
    pub entry_file: String,
    #[serde(default)]
    pub build_command: String,
    /// Empty means "use the runtime default"
    #[serde(default)]
    pub start_command: String,
    /// String-encoded port number
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub use_dev_mode: bool,
}

impl WebServiceConfig {
    /// Fresh config carrying the runtime's canonical defaults
    pub fn for_runtime(runtime: Runtime) -> Self {
        Self {
            runtime,
            entry_file: runtime.default_entry_file().to_string(),
            build_command: String::new(),
            start_command: String::new(),
            port: runtime.default_port().to_string(),
            use_dev_mode: false,
        }
    }
}

impl Default for WebServiceConfig {
    fn default() -> Self {
        Self::for_runtime(Runtime::default())
    }
}

/// Kind-specific configuration. The deployment kind is derived from the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeploymentConfig {
    // Service first: it is the only shape with a required field.
    Service(WebServiceConfig),
    Static(StaticSiteConfig),
}

impl DeploymentConfig {
    pub fn kind(&self) -> DeploymentKind {
        match self {
            DeploymentConfig::Static(_) => DeploymentKind::Static,
            DeploymentConfig::Service(_) => DeploymentKind::Service,
        }
    }
}

/// Where the code for a deployment comes from
#[derive(Clone, PartialEq, Eq)]
pub enum DeploymentSource {
    /// A repository URL typed in by the user
    GitUrl { url: String, branch: String },
    /// A repository picked from the logged-in user's list
    GitSelected { clone_url: String, branch: String },
    /// A zip archive uploaded from disk
    LocalArchive { payload: Vec<u8>, filename: String },
}

impl DeploymentSource {
    pub fn is_archive(&self) -> bool {
        matches!(self, DeploymentSource::LocalArchive { .. })
    }

    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            DeploymentSource::GitUrl { url, branch } => format!("{} ({})", url, branch),
            DeploymentSource::GitSelected { clone_url, branch } => {
                format!("{} ({})", clone_url, branch)
            }
            DeploymentSource::LocalArchive { payload, filename } => {
                format!("{} ({} bytes)", filename, payload.len())
            }
        }
    }
}

impl std::fmt::Debug for DeploymentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentSource::GitUrl { url, branch } => f
                .debug_struct("GitUrl")
                .field("url", url)
                .field("branch", branch)
                .finish(),
            DeploymentSource::GitSelected { clone_url, branch } => f
                .debug_struct("GitSelected")
                .field("clone_url", clone_url)
                .field("branch", branch)
                .finish(),
            DeploymentSource::LocalArchive { payload, filename } => f
                .debug_struct("LocalArchive")
                .field("filename", filename)
                .field("payload_len", &payload.len())
                .finish(),
        }
    }
}

/// One environment variable passed to the deployed container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub is_secret: bool,
}

impl EnvVar {
    /// Value safe to print
    pub fn display_value(&self) -> &str {
        if self.is_secret {
            "••••••"
        } else {
            &self.value
        }
    }
}

/// Ordered environment variables with unique, upper-cased keys
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EnvVars(Vec<EnvVar>);

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable. Replacement keeps the original position.
    pub fn upsert(&mut self, key: &str, value: impl Into<String>, is_secret: bool) {
        let key = key.trim().to_uppercase();
        let value = value.into();
        match self.0.iter_mut().find(|v| v.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.is_secret = is_secret;
            }
            None => self.0.push(EnvVar {
                key,
                value,
                is_secret,
            }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<EnvVar> {
        let key = key.trim().to_uppercase();
        let idx = self.0.iter().position(|v| v.key == key)?;
        Some(self.0.remove(idx))
    }

    pub fn get(&self, key: &str) -> Option<&EnvVar> {
        let key = key.trim().to_uppercase();
        self.0.iter().find(|v| v.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvVar> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split a `KEY=VALUE` assignment
    pub fn parse_assignment(input: &str) -> Option<(String, String)> {
        let (key, value) = input.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    }

    /// Merge the contents of a `.env` file. Returns the number of variables read.
    pub fn merge_dotenv(&mut self, text: &str, is_secret: bool) -> usize {
        let mut count = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = Self::parse_assignment(line) {
                self.upsert(&key, unquote(value.trim()), is_secret);
                count += 1;
            }
        }
        count
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

impl From<Vec<EnvVar>> for EnvVars {
    fn from(vars: Vec<EnvVar>) -> Self {
        let mut env = EnvVars::new();
        for var in vars {
            env.upsert(&var.key, var.value, var.is_secret);
        }
        env
    }
}

impl From<EnvVars> for Vec<EnvVar> {
    fn from(env: EnvVars) -> Self {
        env.0
    }
}

impl<'a> IntoIterator for &'a EnvVars {
    type Item = &'a EnvVar;
    type IntoIter = std::slice::Iter<'a, EnvVar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Fully resolved description of one deployment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    pub project_name: String,
    pub source: DeploymentSource,
    pub config: DeploymentConfig,
    pub environment: EnvVars,
    pub persistent_storage: bool,
    pub health_check_path: String,
    pub auto_restart: bool,
}

impl DeploymentSpec {
    pub fn kind(&self) -> DeploymentKind {
        self.config.kind()
    }

    /// JSON body for the git streaming deploy. `None` for archive sources.
    pub fn stream_request(&self) -> Option<DeployStreamRequest> {
        let (repo, branch) = match &self.source {
            DeploymentSource::GitUrl { url, branch } => (url, branch),
            DeploymentSource::GitSelected { clone_url, branch } => (clone_url, branch),
            DeploymentSource::LocalArchive { .. } => return None,
        };

        Some(DeployStreamRequest {
            project_name: self.project_name.clone(),
            github_repo: repo.clone(),
            branch: branch.clone(),
            deployment_type: self.kind(),
            config: self.config.clone(),
            environment_variables: self.environment.clone(),
            persistent_storage: self.persistent_storage,
            health_check_path: self.health_check_path.clone(),
            auto_restart: self.auto_restart,
        })
    }

    /// Text fields of the archive upload form, in submission order
    pub fn upload_fields(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        Ok(vec![
            ("projectName", self.project_name.clone()),
            ("deploymentType", self.kind().to_string()),
            ("config", serde_json::to_string(&self.config)?),
            (
                "environmentVariables",
                serde_json::to_string(&self.environment)?,
            ),
            ("persistentStorage", self.persistent_storage.to_string()),
            ("healthCheckPath", self.health_check_path.clone()),
            ("autoRestart", self.auto_restart.to_string()),
        ])
    }
}

/// Body of `POST /api/deploy-stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployStreamRequest {
    pub project_name: String,
    pub github_repo: String,
    pub branch: String,
    pub deployment_type: DeploymentKind,
    pub config: DeploymentConfig,
    pub environment_variables: EnvVars,
    pub persistent_storage: bool,
    pub health_check_path: String,
    pub auto_restart: bool,
}

/// Response to an archive upload; the id is used to attach to the event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}
