//! Text framing for the control plane's realtime socket.
//!
//! The server speaks Socket.IO v2 packets carried inside Engine.IO v3
//! websocket frames. Only the text encoding is supported; binary events are
//! rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;
pub const ROOT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type: {0}")]
    UnknownType(char),
    #[error("malformed packet json: {0}")]
    MalformedJson(String),
    #[error("event packet is missing an event name")]
    MissingEventName,
    #[error("unsupported packet: {0}")]
    Unsupported(String),
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(probe) => format!("2{}", probe.as_deref().unwrap_or_default()),
            EnginePacket::Pong(probe) => format!("3{}", probe.as_deref().unwrap_or_default()),
            EnginePacket::Message(body) => format!("4{body}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    pub fn decode(text: &str, max_frame_bytes: usize) -> Result<Self, FrameError> {
        check_size(text, max_frame_bytes)?;
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();
        let probe = || (!rest.is_empty()).then(|| rest.to_string());
        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(|err| FrameError::MalformedJson(err.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(probe())),
            '3' => Ok(EnginePacket::Pong(probe())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    Error {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        SocketPacket::Event {
            namespace: namespace.to_string(),
            id: None,
            name: name.to_string(),
            args: vec![payload],
        }
    }

    /// Socket.IO handlers receive the first argument as the event payload.
    pub fn first_arg(&self) -> Value {
        match self {
            SocketPacket::Event { args, .. } | SocketPacket::Ack { args, .. } => {
                args.first().cloned().unwrap_or(Value::Null)
            }
            SocketPacket::Error { data, .. } => data.clone(),
            SocketPacket::Connect { .. } | SocketPacket::Disconnect { .. } => Value::Null,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::Error { namespace, .. } => namespace,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        let (kind, namespace) = match self {
            SocketPacket::Connect { namespace } => ('0', namespace),
            SocketPacket::Disconnect { namespace } => ('1', namespace),
            SocketPacket::Event { namespace, .. } => ('2', namespace),
            SocketPacket::Ack { namespace, .. } => ('3', namespace),
            SocketPacket::Error { namespace, .. } => ('4', namespace),
        };
        out.push(kind);
        if !namespace.is_empty() && namespace != ROOT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        match self {
            SocketPacket::Event { id, name, args, .. } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut body = Vec::with_capacity(args.len() + 1);
                body.push(Value::String(name.clone()));
                body.extend(args.iter().cloned());
                out.push_str(&Value::Array(body).to_string());
            }
            SocketPacket::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
            SocketPacket::Error { data, .. } => out.push_str(&data.to_string()),
            SocketPacket::Connect { .. } | SocketPacket::Disconnect { .. } => {}
        }
        out
    }

    pub fn decode(text: &str, max_frame_bytes: usize) -> Result<Self, FrameError> {
        check_size(text, max_frame_bytes)?;
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(FrameError::Unsupported("binary packets".to_string()));
        }
        if !matches!(kind, '0'..='4') {
            return Err(FrameError::UnknownType(kind));
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let namespace = rest[..idx].to_string();
                    rest = &rest[idx + 1..];
                    namespace
                }
                None => {
                    let namespace = rest.to_string();
                    rest = "";
                    namespace
                }
            }
        } else {
            ROOT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        rest = &rest[digits..];

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = parse_array(rest)?;
                if args.is_empty() {
                    return Err(FrameError::MissingEventName);
                }
                let Value::String(name) = args.remove(0) else {
                    return Err(FrameError::MissingEventName);
                };
                Ok(SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    args,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| FrameError::MalformedJson("ack without id".to_string()))?;
                Ok(SocketPacket::Ack {
                    namespace,
                    id,
                    args: parse_array(rest)?,
                })
            }
            _ => {
                let data = serde_json::from_str(rest)
                    .unwrap_or_else(|_| Value::String(rest.to_string()));
                Ok(SocketPacket::Error { namespace, data })
            }
        }
    }
}

fn parse_array(raw: &str) -> Result<Vec<Value>, FrameError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(other) => Err(FrameError::MalformedJson(format!("expected array, got {other}"))),
        Err(err) => Err(FrameError::MalformedJson(err.to_string())),
    }
}

fn check_size(text: &str, max_frame_bytes: usize) -> Result<(), FrameError> {
    if text.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: text.len(),
            max: max_frame_bytes,
        });
    }
    Ok(())
}
