use serde::{Deserialize, Serialize};

/// Request to log in with a GitHub personal access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub token: String,
}

/// Response to a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub username: String,
}

/// Response from the session check endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// Explicit GitHub login state, refreshed at startup and after login/logout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticated { username: String },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { username } => Some(username),
            AuthState::Anonymous => None,
        }
    }
}

impl From<SessionStatus> for AuthState {
    fn from(status: SessionStatus) -> Self {
        match (status.authenticated, status.username) {
            (true, Some(username)) if !username.is_empty() => AuthState::Authenticated { username },
            _ => AuthState::Anonymous,
        }
    }
}

/// A repository visible to the logged-in GitHub user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Full name, e.g. "octocat/hello-world"
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Response from the repository listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRepositoriesResponse {
    #[serde(default)]
    pub repositories: Vec<Repository>,
}
