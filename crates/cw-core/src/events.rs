use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const AUTHENTICATION_EVENT: &str = "authentication";
pub const AUTHENTICATED_EVENT: &str = "authenticated";
pub const UNAUTHORIZED_EVENT: &str = "unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("failed to decode {kind} payload: {message}")]
    Decode { kind: EventKind, message: String },
}

/// Project lifecycle events pushed by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProjectCreated,
    ProjectChanged,
    ProjectStatusChanged,
    ProjectClosed,
    ProjectDeletion,
    ProjectRestartResult,
    ProjectValidated,
    ProjectSettingChanged,
    LoadRunnerStatus,
    LogUpdate,
    LogsListChanged,
    RegistryPushStatus,
    MissingLocalDir,
    ProjectLink,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::ProjectCreated,
        EventKind::ProjectChanged,
        EventKind::ProjectStatusChanged,
        EventKind::ProjectClosed,
        EventKind::ProjectDeletion,
        EventKind::ProjectRestartResult,
        EventKind::ProjectValidated,
        EventKind::ProjectSettingChanged,
        EventKind::LoadRunnerStatus,
        EventKind::LogUpdate,
        EventKind::LogsListChanged,
        EventKind::RegistryPushStatus,
        EventKind::MissingLocalDir,
        EventKind::ProjectLink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProjectCreated => "project-created",
            EventKind::ProjectChanged => "project-changed",
            EventKind::ProjectStatusChanged => "project-statusChanged",
            EventKind::ProjectClosed => "project-closed",
            EventKind::ProjectDeletion => "project-deletion",
            EventKind::ProjectRestartResult => "project-restartResult",
            EventKind::ProjectValidated => "project-validated",
            EventKind::ProjectSettingChanged => "project-settingChanged",
            EventKind::LoadRunnerStatus => "ProjectLoadRunner-status",
            EventKind::LogUpdate => "projectLogs-update",
            EventKind::LogsListChanged => "projectLogs-listChanged",
            EventKind::RegistryPushStatus => "imagePushRegistryStatus",
            EventKind::MissingLocalDir => "missing-local-dir",
            EventKind::ProjectLink => "project-link",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == input)
            .ok_or_else(|| EventError::UnknownEvent(input.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_on_disk: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionResult {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartResult {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quickfix: Option<Value>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEvent {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<Vec<ValidationResult>>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChanged {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRunnerStatus {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUpdate {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub reset: bool,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogInfo {
    pub log_name: String,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsListChanged {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default)]
    pub build: Vec<LogInfo>,
    #[serde(default)]
    pub app: Vec<LogInfo>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPushStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default)]
    pub image_push_registry_test: bool,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissingLocalDir {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectLink {
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectLink {
    /// Link errors arrive either as a plain string or as an error object.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) => Some(message.clone()),
            Value::Object(object) => Some(
                object
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(object.clone()).to_string()),
            ),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ProjectCreated(ProjectInfo),
    ProjectChanged(ProjectInfo),
    ProjectStatusChanged(ProjectInfo),
    ProjectClosed(ProjectInfo),
    ProjectDeletion(DeletionResult),
    ProjectRestartResult(RestartResult),
    ProjectValidated(ValidationEvent),
    ProjectSettingChanged(SettingsChanged),
    LoadRunnerStatus(LoadRunnerStatus),
    LogUpdate(LogUpdate),
    LogsListChanged(LogsListChanged),
    RegistryPushStatus(RegistryPushStatus),
    MissingLocalDir(MissingLocalDir),
    ProjectLink(ProjectLink),
}

impl InboundEvent {
    pub fn decode(kind: EventKind, data: Value) -> Result<Self, EventError> {
        let event = match kind {
            EventKind::ProjectCreated => InboundEvent::ProjectCreated(parse(kind, data)?),
            EventKind::ProjectChanged => InboundEvent::ProjectChanged(parse(kind, data)?),
            EventKind::ProjectStatusChanged => {
                InboundEvent::ProjectStatusChanged(parse(kind, data)?)
            }
            EventKind::ProjectClosed => InboundEvent::ProjectClosed(parse(kind, data)?),
            EventKind::ProjectDeletion => InboundEvent::ProjectDeletion(parse(kind, data)?),
            EventKind::ProjectRestartResult => {
                InboundEvent::ProjectRestartResult(parse(kind, data)?)
            }
            EventKind::ProjectValidated => InboundEvent::ProjectValidated(parse(kind, data)?),
            EventKind::ProjectSettingChanged => {
                InboundEvent::ProjectSettingChanged(parse(kind, data)?)
            }
            EventKind::LoadRunnerStatus => InboundEvent::LoadRunnerStatus(parse(kind, data)?),
            EventKind::LogUpdate => InboundEvent::LogUpdate(parse(kind, data)?),
            EventKind::LogsListChanged => InboundEvent::LogsListChanged(parse(kind, data)?),
            EventKind::RegistryPushStatus => {
                InboundEvent::RegistryPushStatus(parse(kind, data)?)
            }
            EventKind::MissingLocalDir => InboundEvent::MissingLocalDir(parse(kind, data)?),
            EventKind::ProjectLink => InboundEvent::ProjectLink(parse(kind, data)?),
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::ProjectCreated(_) => EventKind::ProjectCreated,
            InboundEvent::ProjectChanged(_) => EventKind::ProjectChanged,
            InboundEvent::ProjectStatusChanged(_) => EventKind::ProjectStatusChanged,
            InboundEvent::ProjectClosed(_) => EventKind::ProjectClosed,
            InboundEvent::ProjectDeletion(_) => EventKind::ProjectDeletion,
            InboundEvent::ProjectRestartResult(_) => EventKind::ProjectRestartResult,
            InboundEvent::ProjectValidated(_) => EventKind::ProjectValidated,
            InboundEvent::ProjectSettingChanged(_) => EventKind::ProjectSettingChanged,
            InboundEvent::LoadRunnerStatus(_) => EventKind::LoadRunnerStatus,
            InboundEvent::LogUpdate(_) => EventKind::LogUpdate,
            InboundEvent::LogsListChanged(_) => EventKind::LogsListChanged,
            InboundEvent::RegistryPushStatus(_) => EventKind::RegistryPushStatus,
            InboundEvent::MissingLocalDir(_) => EventKind::MissingLocalDir,
            InboundEvent::ProjectLink(_) => EventKind::ProjectLink,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        let id = match self {
            InboundEvent::ProjectCreated(p)
            | InboundEvent::ProjectChanged(p)
            | InboundEvent::ProjectStatusChanged(p)
            | InboundEvent::ProjectClosed(p) => &p.project_id,
            InboundEvent::ProjectDeletion(p) => &p.project_id,
            InboundEvent::ProjectRestartResult(p) => &p.project_id,
            InboundEvent::ProjectValidated(p) => &p.project_id,
            InboundEvent::ProjectSettingChanged(p) => &p.project_id,
            InboundEvent::LoadRunnerStatus(p) => &p.project_id,
            InboundEvent::LogUpdate(p) => &p.project_id,
            InboundEvent::LogsListChanged(p) => &p.project_id,
            InboundEvent::RegistryPushStatus(_) => return None,
            InboundEvent::MissingLocalDir(p) => &p.project_id,
            InboundEvent::ProjectLink(p) => &p.project_id,
        };
        id.as_deref()
    }
}

/// Everything the control plane can send on the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Event(InboundEvent),
    Authenticated,
    Unauthorized { message: String },
}

impl ServerMessage {
    /// Returns `Ok(None)` for event names this client does not handle.
    pub fn from_named(name: &str, data: Value) -> Result<Option<Self>, EventError> {
        match name {
            AUTHENTICATED_EVENT => Ok(Some(ServerMessage::Authenticated)),
            UNAUTHORIZED_EVENT => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| data.as_str().map(str::to_string))
                    .unwrap_or_else(|| "unauthorized".to_string());
                Ok(Some(ServerMessage::Unauthorized { message }))
            }
            other => match other.parse::<EventKind>() {
                Ok(kind) => {
                    InboundEvent::decode(kind, data).map(|event| Some(ServerMessage::Event(event)))
                }
                Err(_) => Ok(None),
            },
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Authentication { token: String },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Authentication { .. } => AUTHENTICATION_EVENT,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientMessage::Authentication { token } => json!({ "token": token }),
        }
    }
}

impl fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Authentication { .. } => f
                .debug_struct("Authentication")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

fn parse<T: DeserializeOwned>(kind: EventKind, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|err| EventError::Decode {
        kind,
        message: err.to_string(),
    })
}

/// Project ids are strings on the wire, but older servers emit numbers.
fn deserialize_project_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Option::<Value>::deserialize(deserializer)?;
    match val {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom(
            "expected string or number for projectID",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names_match_wire_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "projectLogs-listChanged".parse::<EventKind>(),
            Ok(EventKind::LogsListChanged)
        );
        assert!(matches!(
            "project-bound".parse::<EventKind>(),
            Err(EventError::UnknownEvent(name)) if name == "project-bound"
        ));
    }

    #[test]
    fn project_changed_keeps_unknown_fields() {
        let event = InboundEvent::decode(
            EventKind::ProjectChanged,
            json!({
                "projectID": "p1",
                "name": "node-app",
                "appStatus": "started",
                "ports": {"exposedPort": "32768"}
            }),
        )
        .expect("decode");

        let InboundEvent::ProjectChanged(info) = &event else {
            panic!("unexpected variant: {event:?}");
        };
        assert_eq!(event.project_id(), Some("p1"));
        assert_eq!(info.app_status.as_deref(), Some("started"));
        assert_eq!(info.extra["ports"]["exposedPort"], "32768");
    }

    #[test]
    fn missing_project_id_still_decodes() {
        let event = InboundEvent::decode(EventKind::ProjectDeletion, json!({"status": "success"}))
            .expect("decode");
        assert_eq!(event.project_id(), None);
    }

    #[test]
    fn numeric_project_id_is_stringified() {
        let event = InboundEvent::decode(EventKind::MissingLocalDir, json!({"projectID": 42}))
            .expect("decode");
        assert_eq!(event.project_id(), Some("42"));
    }

    #[test]
    fn malformed_project_id_is_a_decode_error() {
        let err = InboundEvent::decode(EventKind::ProjectChanged, json!({"projectID": [1]}))
            .expect_err("array id");
        assert!(matches!(err, EventError::Decode { kind: EventKind::ProjectChanged, .. }));
    }

    #[test]
    fn validation_without_results_decodes_as_none() {
        let event = InboundEvent::decode(EventKind::ProjectValidated, json!({"projectID": "p1"}))
            .expect("decode");
        let InboundEvent::ProjectValidated(payload) = event else {
            panic!("unexpected variant");
        };
        assert!(payload.validation_results.is_none());
    }

    #[test]
    fn registry_status_has_no_project() {
        let message = ServerMessage::from_named(
            "imagePushRegistryStatus",
            json!({"msg": "ok", "imagePushRegistryTest": true}),
        )
        .expect("decode")
        .expect("known");
        let ServerMessage::Event(event) = message else {
            panic!("expected event");
        };
        assert_eq!(event.kind(), EventKind::RegistryPushStatus);
        assert_eq!(event.project_id(), None);
        let InboundEvent::RegistryPushStatus(status) = event else {
            panic!("unexpected variant");
        };
        assert!(status.image_push_registry_test);
        assert_eq!(status.msg.as_deref(), Some("ok"));
    }

    #[test]
    fn auth_acks_and_unknown_names() {
        assert_eq!(
            ServerMessage::from_named("authenticated", Value::Null).expect("ok"),
            Some(ServerMessage::Authenticated)
        );
        assert_eq!(
            ServerMessage::from_named("unauthorized", json!({"message": "jwt expired"}))
                .expect("ok"),
            Some(ServerMessage::Unauthorized {
                message: "jwt expired".to_string()
            })
        );
        assert_eq!(
            ServerMessage::from_named("runloadStatusChanged", json!({})).expect("ok"),
            None
        );
    }

    #[test]
    fn link_error_message_from_string_or_object() {
        let mut link = ProjectLink {
            project_id: Some("p1".to_string()),
            name: "frontend".to_string(),
            status: "error".to_string(),
            error: Some(json!("target not found")),
            ..ProjectLink::default()
        };
        assert_eq!(link.error_message().as_deref(), Some("target not found"));

        link.error = Some(json!({"message": "bad env", "code": 400}));
        assert_eq!(link.error_message().as_deref(), Some("bad env"));

        link.error = Some(Value::Null);
        assert_eq!(link.error_message(), None);
    }

    #[test]
    fn authentication_payload_carries_token_but_debug_redacts_it() {
        let message = ClientMessage::Authentication {
            token: "secret-token".to_string(),
        };
        assert_eq!(message.name(), "authentication");
        assert_eq!(message.payload(), json!({"token": "secret-token"}));
        assert!(!format!("{message:?}").contains("secret-token"));
    }
}
