use async_trait::async_trait;
use cw_socket::{Host, HostError, LogsAction, Project, Setting};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Non-interactive host: everything is rendered through the log output and
/// prompts resolve to no action.
#[derive(Debug, Default)]
pub struct ConsoleHost;

#[async_trait]
impl Host for ConsoleHost {
    fn show_info(&self, message: &str) {
        info!("{message}");
    }

    fn show_warning(&self, message: &str) {
        warn!("{message}");
    }

    fn show_error(&self, message: &str) {
        error!("{message}");
    }

    async fn prompt_info(&self, message: &str, actions: &[&str]) -> Option<String> {
        info!("{message} [{}]", actions.join(" | "));
        None
    }

    async fn open_overview(&self, project: Arc<dyn Project>) -> Result<(), HostError> {
        info!(
            "project {} ({}) at {}",
            project.name(),
            project.id(),
            project.local_path().display()
        );
        Ok(())
    }

    async fn manage_logs(
        &self,
        project: Arc<dyn Project>,
        action: LogsAction,
    ) -> Result<(), HostError> {
        info!("logs for {}: {}", project.name(), action.as_str());
        Ok(())
    }

    async fn add_to_workspace(&self, project: Arc<dyn Project>) -> Result<(), HostError> {
        Err(HostError::new(format!(
            "cannot add {} to the workspace from the agent; open {} in your editor",
            project.name(),
            project.local_path().display()
        )))
    }

    fn open_setting(&self, setting: Setting) {
        info!("set {} in the agent config to change this behaviour", setting.key());
    }
}
