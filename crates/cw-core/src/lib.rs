pub mod events;
pub mod socket_frame;

pub use events::{
    ClientMessage, DeletionResult, EventError, EventKind, InboundEvent, LoadRunnerStatus,
    LogInfo, LogUpdate, LogsListChanged, MissingLocalDir, ProjectInfo, ProjectLink,
    RegistryPushStatus, RestartResult, ServerMessage, SettingsChanged, ValidationEvent,
    ValidationResult,
};
pub use socket_frame::{EnginePacket, FrameError, OpenHandshake, SocketPacket};
