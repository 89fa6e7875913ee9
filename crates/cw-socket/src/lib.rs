//! Realtime event channel between a control-plane connection and the
//! client's view of its projects.

pub mod channel;
pub mod collaborators;
mod dispatch;
pub mod onboarding;
pub mod prefs;
pub mod resolver;
pub mod transport;

use thiserror::Error;

pub use channel::{channel_uri, EventChannel};
pub use collaborators::{Connection, Host, HostError, LogManager, LogsAction, Project, ProjectError};
pub use onboarding::Onboarding;
pub use prefs::{
    FilePreferenceStore, MemoryPreferenceStore, OnboardingSettings, PreferenceStore, Preferences,
    PrefsError, Setting,
};
pub use resolver::{ProjectResolver, ResolvedProject};
pub use transport::{SocketIoTransport, Transport, TransportEvent, TransportOptions};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("namespace must not start with '/': {0}")]
    InvalidNamespace(String),
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("transport is closed")]
    TransportClosed,
    #[error("{0}")]
    Unauthorized(String),
    #[error("event channel disconnected during authentication")]
    Disconnected,
    #[error("event channel was disposed")]
    Disposed,
}
