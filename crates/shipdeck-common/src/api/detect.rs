use serde::{Deserialize, Serialize};

use super::deploy::{DeploymentKind, Runtime};

/// Request to run detection against a GitHub repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectGithubRequest {
    pub github_repo: String,
    pub branch: String,
}

/// Response from either detection endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub success: bool,
    pub detection: Detection,
    #[serde(default)]
    pub suggestions: Suggestions,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server-side analysis of a project's source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    #[serde(rename = "type")]
    pub kind: DeploymentKind,
    /// Raw runtime name; may be one we can't deploy (e.g. "java", "static")
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub build_tool: Option<String>,
    #[serde(default)]
    pub config: DetectedConfig,
}

impl Detection {
    /// Runtime parsed into one we support
    pub fn supported_runtime(&self) -> Option<Runtime> {
        self.runtime.as_deref().and_then(|r| r.parse().ok())
    }
}

/// Suggested kind-specific fields. Absent and empty both mean "no suggestion".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedConfig {
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub publish_dir: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub entry_file: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
}

/// Human-readable summary of a detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    #[serde(default)]
    pub detected: String,
    #[serde(default)]
    pub deployment_type: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_detection() {
        let body = r#"{
            "success": true,
            "detection": {
                "type": "service",
                "runtime": "python",
                "framework": "flask",
                "config": {"runtime": "python", "entryFile": "app.py", "port": "5000", "startCommand": "gunicorn app:app --bind 0.0.0.0:5000"}
            },
            "suggestions": {"detected": "flask application", "deploymentType": "Web Service", "runtime": "Python", "recommendations": ["Start: gunicorn app:app --bind 0.0.0.0:5000", "Port: 5000"]},
            "message": "Detected flask application"
        }"#;
        let response: DetectionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.detection.kind, DeploymentKind::Service);
        assert_eq!(response.detection.supported_runtime(), Some(Runtime::Python));
        assert_eq!(response.suggestions.recommendations.len(), 2);
    }

    #[test]
    fn java_detection_has_no_supported_runtime() {
        let body = r#"{"success":true,"detection":{"type":"service","runtime":"java","buildTool":"maven","config":{}}}"#;
        let response: DetectionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.detection.supported_runtime(), None);
        assert_eq!(response.detection.build_tool.as_deref(), Some("maven"));
    }
}
