//! Interfaces the event channel consumes. Implementations live with the
//! host (editor integration, CLI agent, tests).

use async_trait::async_trait;
use cw_core::{
    DeletionResult, LoadRunnerStatus, LogUpdate, LogsListChanged, ProjectInfo, RestartResult,
    SettingsChanged, ValidationResult,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::prefs::Setting;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProjectError(pub String);

impl ProjectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A configured control-plane endpoint and its project directory.
#[async_trait]
pub trait Connection: Send + Sync {
    fn url(&self) -> &Url;

    fn label(&self) -> &str;

    /// Remote endpoints require a token handshake before the channel is usable.
    fn is_remote(&self) -> bool;

    /// Directory lookup. Must not have side effects.
    fn project_by_id(&self, project_id: &str) -> Option<Arc<dyn Project>>;

    /// Refetch the full project list and replace the directory contents.
    async fn update_projects(&self) -> Result<(), ProjectError>;

    fn on_connect(&self);

    fn on_disconnect(&self);
}

#[async_trait]
pub trait Project: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn local_path(&self) -> &Path;

    fn is_in_workspace(&self) -> bool;

    fn log_manager(&self) -> &dyn LogManager;

    fn update(&self, info: &ProjectInfo);

    async fn on_deletion_event(&self, event: &DeletionResult) -> Result<(), ProjectError>;

    fn on_restart_event(&self, event: &RestartResult);

    fn validate(&self, results: &[ValidationResult]);

    async fn on_settings_changed_event(&self, event: &SettingsChanged)
        -> Result<(), ProjectError>;

    async fn on_load_runner_update(&self, event: &LoadRunnerStatus) -> Result<(), ProjectError>;

    /// Unbind from the connection, removing the local directory only when asked.
    async fn delete_from_connection(&self, delete_dir: bool) -> Result<(), ProjectError>;
}

#[async_trait]
pub trait LogManager: Send + Sync {
    async fn on_logs_list_changed(&self, event: &LogsListChanged) -> Result<(), ProjectError>;

    fn on_new_logs(&self, event: &LogUpdate);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogsAction {
    ShowFromCreation,
}

impl LogsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogsAction::ShowFromCreation => "show-from-creation",
        }
    }
}

/// User-facing surface: messages, prompts and panel/workspace actions.
#[async_trait]
pub trait Host: Send + Sync {
    fn show_info(&self, message: &str);

    fn show_warning(&self, message: &str);

    fn show_error(&self, message: &str);

    /// Resolves to the chosen action, or `None` when dismissed.
    async fn prompt_info(&self, message: &str, actions: &[&str]) -> Option<String>;

    async fn open_overview(&self, project: Arc<dyn Project>) -> Result<(), HostError>;

    async fn manage_logs(
        &self,
        project: Arc<dyn Project>,
        action: LogsAction,
    ) -> Result<(), HostError>;

    async fn add_to_workspace(&self, project: Arc<dyn Project>) -> Result<(), HostError>;

    fn open_setting(&self, setting: Setting);
}
