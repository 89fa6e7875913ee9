//! One handler per inbound event kind. Every handler is its own failure
//! domain: errors are logged (and surfaced where users can act on them)
//! but never escape to the channel.

use cw_core::{InboundEvent, ProjectInfo, ProjectLink, RegistryPushStatus};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::channel::EventChannel;
use crate::collaborators::Project;

impl EventChannel {
    pub async fn handle_event(&self, event: InboundEvent) {
        debug!("socket event {} for {:?}", event.kind(), event.project_id());
        match event {
            InboundEvent::ProjectCreated(info)
            | InboundEvent::ProjectChanged(info)
            | InboundEvent::ProjectStatusChanged(info)
            | InboundEvent::ProjectClosed(info) => self.on_project_changed(&info).await,
            InboundEvent::ProjectDeletion(result) => {
                let Some(project) = self.get_project(result.project_id.as_deref()).await else {
                    return;
                };
                if let Err(err) = project.on_deletion_event(&result).await {
                    error!("error processing deletion of {}: {err}", project.name());
                }
            }
            InboundEvent::ProjectRestartResult(result) => {
                if let Some(project) = self.get_project(result.project_id.as_deref()).await {
                    project.on_restart_event(&result);
                }
            }
            InboundEvent::LogsListChanged(event) => {
                let Some(project) = self.get_project(event.project_id.as_deref()).await else {
                    return;
                };
                if let Err(err) = project.log_manager().on_logs_list_changed(&event).await {
                    error!("error updating logs list for {}: {err}", project.name());
                }
            }
            InboundEvent::LogUpdate(update) => {
                if let Some(project) = self.get_project(update.project_id.as_deref()).await {
                    project.log_manager().on_new_logs(&update);
                }
            }
            InboundEvent::ProjectValidated(event) => {
                let Some(project) = self.get_project(event.project_id.as_deref()).await else {
                    return;
                };
                match event.validation_results.as_deref() {
                    Some(results) => project.validate(results),
                    None => error!("backend didn't send result with validation event"),
                }
            }
            InboundEvent::ProjectSettingChanged(event) => {
                let Some(project) = self.get_project(event.project_id.as_deref()).await else {
                    return;
                };
                if let Err(err) = project.on_settings_changed_event(&event).await {
                    error!("error processing settings change for {}: {err}", project.name());
                }
            }
            InboundEvent::LoadRunnerStatus(status) => {
                let Some(project) = self.get_project(status.project_id.as_deref()).await else {
                    return;
                };
                if let Err(err) = project.on_load_runner_update(&status).await {
                    let message = format!(
                        "Error processing load runner status for {}: {err}",
                        project.name()
                    );
                    error!("{message}");
                    self.host.show_error(&message);
                }
            }
            InboundEvent::RegistryPushStatus(status) => self.on_registry_push_status(&status),
            InboundEvent::MissingLocalDir(event) => {
                let Some(project) = self.get_project(event.project_id.as_deref()).await else {
                    return;
                };
                info!("local directory for {} is missing, removing it", project.name());
                if let Err(err) = project.delete_from_connection(false).await {
                    let message = format!("Error removing {}: {err}", project.name());
                    error!("{message}");
                    self.host.show_error(&message);
                }
            }
            InboundEvent::ProjectLink(link) => self.on_project_link(&link),
        }
    }

    async fn on_project_changed(&self, info: &ProjectInfo) {
        if let Some(project) = self.get_project(info.project_id.as_deref()).await {
            project.update(info);
        }
    }

    fn on_registry_push_status(&self, status: &RegistryPushStatus) {
        let Some(msg) = status.msg.as_deref().filter(|msg| !msg.is_empty()) else {
            debug!("image push registry status without a message");
            return;
        };
        if status.image_push_registry_test {
            self.host.show_info(msg);
        } else {
            self.host.show_error(msg);
        }
    }

    fn on_project_link(&self, link: &ProjectLink) {
        let Some(err) = link.error_message() else {
            return;
        };
        let name = if link.name.is_empty() {
            link.project_id.as_deref().unwrap_or("project")
        } else {
            link.name.as_str()
        };
        let message = format!("Error linking {name}: {err}");
        error!("{message}");
        self.host.show_error(&message);
    }

    /// Resolves the event's project and runs onboarding the first time it
    /// appears. Onboarding failures never hide the project from the caller.
    pub(crate) async fn get_project(&self, project_id: Option<&str>) -> Option<Arc<dyn Project>> {
        let resolved = self.resolver.resolve(project_id).await?;
        if resolved.first_sighting {
            self.onboarding.run(Arc::clone(&resolved.project)).await;
        }
        Some(resolved.project)
    }
}
