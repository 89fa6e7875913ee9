use std::sync::Arc;
use tracing::{error, info, warn};

use crate::collaborators::{Host, HostError, LogsAction, Project};
use crate::prefs::{Preferences, Setting};

pub const NEW_PROJECT_LOGS_MESSAGE: &str =
    "Build and application logs for the new project will be shown as they become available.";
pub const CONFIGURE_ACTION: &str = "Configure";
pub const DONT_SHOW_AGAIN_ACTION: &str = "Don't show again";

/// First-sighting actions for a project that just appeared on a connection.
#[derive(Clone)]
pub struct Onboarding {
    host: Arc<dyn Host>,
    prefs: Preferences,
}

impl Onboarding {
    pub fn new(host: Arc<dyn Host>, prefs: Preferences) -> Self {
        Self { host, prefs }
    }

    /// Each step fails on its own; a failed step is reported and the rest still run.
    pub async fn run(&self, project: Arc<dyn Project>) {
        info!("project {} has been created", project.name());

        if self.prefs.is_enabled(Setting::OverviewOnCreation) {
            let result = self.host.open_overview(Arc::clone(&project)).await;
            self.report(project.as_ref(), result);
        }

        if self.prefs.is_enabled(Setting::LogsOnCreation) {
            if !self.prefs.logs_message_dismissed() {
                self.offer_logs_message();
            }
            let result = self
                .host
                .manage_logs(Arc::clone(&project), LogsAction::ShowFromCreation)
                .await;
            self.report(project.as_ref(), result);
        }

        if !project.is_in_workspace() {
            if self.prefs.is_enabled(Setting::AddNewProjectsToWorkspace) {
                let result = self.host.add_to_workspace(Arc::clone(&project)).await;
                self.report(project.as_ref(), result);
            } else {
                self.host.show_warning(&format!(
                    "{} is not in your workspace. Run the Add Project to Workspace command to add it.",
                    project.name()
                ));
            }
        }
    }

    fn offer_logs_message(&self) {
        let host = Arc::clone(&self.host);
        let prefs = self.prefs.clone();
        tokio::spawn(async move {
            let choice = host
                .prompt_info(
                    NEW_PROJECT_LOGS_MESSAGE,
                    &[CONFIGURE_ACTION, DONT_SHOW_AGAIN_ACTION],
                )
                .await;
            match choice.as_deref() {
                Some(CONFIGURE_ACTION) => host.open_setting(Setting::LogsOnCreation),
                Some(DONT_SHOW_AGAIN_ACTION) => {
                    if let Err(err) = prefs.dismiss_logs_message() {
                        warn!("failed to persist logs message dismissal: {err}");
                    }
                }
                _ => {}
            }
        });
    }

    fn report(&self, project: &dyn Project, result: Result<(), HostError>) {
        if let Err(err) = result {
            error!("error processing new project {}: {err}", project.name());
            self.host.show_error(&err.to_string());
        }
    }
}
