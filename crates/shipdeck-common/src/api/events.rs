use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StreamError;

/// Progress event decoded from a deployment event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Build/runtime output (`log` and `info` on the wire)
    Log { message: String },
    /// A step finished well
    Success { message: String },
    /// A step reported a problem; the attempt may still continue
    Error { message: String },
    /// Terminal event
    Done(DoneEvent),
}

/// Outcome carried by the terminal `done` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoneEvent {
    Succeeded { deployment: Option<FinalizedDeployment> },
    Failed { error: String },
}

impl ProgressEvent {
    /// Map a JSON payload (the text after the event prefix) to an event
    pub fn from_json(payload: &str) -> Result<Self, StreamError> {
        let raw: WireEvent = serde_json::from_str(payload).map_err(|e| StreamError::Malformed {
            line: payload.to_string(),
            reason: e.to_string(),
        })?;
        raw.try_into()
    }
}

/// Deployment record handed back on success
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedDeployment {
    pub id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    /// Host port; the server sends it as a string
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Port given as a number, a numeric string or null. Anything else reads as
/// `None` so a single odd field can't discard the record it sits in.
pub(crate) fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Untyped shape of a stream payload, validated into [`ProgressEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub deployment: Option<FinalizedDeployment>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireEvent {
    fn into_event(self) -> Result<ProgressEvent, StreamError> {
        let message = self.message.unwrap_or_default();
        match self.kind.as_str() {
            "log" | "info" => Ok(ProgressEvent::Log { message }),
            "success" => Ok(ProgressEvent::Success { message }),
            "error" => Ok(ProgressEvent::Error { message }),
            "done" => {
                if self.success.unwrap_or(false) {
                    Ok(ProgressEvent::Done(DoneEvent::Succeeded {
                        deployment: self.deployment,
                    }))
                } else {
                    let error = self
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| "Deployment failed".to_string());
                    Ok(ProgressEvent::Done(DoneEvent::Failed { error }))
                }
            }
            other => Err(StreamError::UnknownType(other.to_string())),
        }
    }
}

impl TryFrom<WireEvent> for ProgressEvent {
    type Error = StreamError;

    fn try_from(raw: WireEvent) -> Result<Self, StreamError> {
        raw.into_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_maps_to_log() {
        let event = ProgressEvent::from_json(r#"{"type":"info","message":"Queuing"}"#).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Log {
                message: "Queuing".into()
            }
        );
    }

    #[test]
    fn done_success_carries_deployment() {
        let event = ProgressEvent::from_json(
            r#"{"type":"done","success":true,"deployment":{"id":"d1","port":32768,"directUrl":"http://host:32768","status":"active"}}"#,
        )
        .unwrap();
        let ProgressEvent::Done(DoneEvent::Succeeded { deployment: Some(dep) }) = event else {
            panic!("expected successful done event");
        };
        assert_eq!(dep.id, "d1");
        assert_eq!(dep.port, Some(32768));
        assert_eq!(dep.direct_url.as_deref(), Some("http://host:32768"));
    }

    #[test]
    fn done_payload_from_worker_parses_string_port() {
        let event = ProgressEvent::from_json(
            r#"{"type": "done", "success": true, "deployment": {"id": "a1b2c3d4", "containerId": "9f8e7d6c5b4a", "port": "32768", "directUrl": "http://203.0.113.7:32768", "status": "active"}}"#,
        )
        .unwrap();
        let ProgressEvent::Done(DoneEvent::Succeeded { deployment: Some(dep) }) = event else {
            panic!("expected successful done event");
        };
        assert_eq!(dep.port, Some(32768));
        assert_eq!(dep.container_id.as_deref(), Some("9f8e7d6c5b4a"));
        assert_eq!(dep.direct_url.as_deref(), Some("http://203.0.113.7:32768"));
    }

    #[test]
    fn unreadable_port_does_not_drop_done_event() {
        let event = ProgressEvent::from_json(
            r#"{"type":"done","success":true,"deployment":{"id":"d1","port":"auto","directUrl":null}}"#,
        )
        .unwrap();
        let ProgressEvent::Done(DoneEvent::Succeeded { deployment: Some(dep) }) = event else {
            panic!("expected successful done event");
        };
        assert_eq!(dep.port, None);
        assert_eq!(dep.direct_url, None);
    }

    #[test]
    fn done_failure_carries_error_text() {
        let event =
            ProgressEvent::from_json(r#"{"type":"done","success":false,"error":"clone failed"}"#)
                .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Done(DoneEvent::Failed {
                error: "clone failed".into()
            })
        );
    }

    #[test]
    fn unknown_type_is_a_stream_error() {
        let err = ProgressEvent::from_json(r#"{"type":"progress","message":"50%"}"#).unwrap_err();
        assert_eq!(err, StreamError::UnknownType("progress".into()));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = ProgressEvent::from_json("{not json").unwrap_err();
        assert!(matches!(err, StreamError::Malformed { .. }));
    }
}
