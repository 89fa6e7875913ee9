//! Project directory backed by the control plane's REST API.

use async_trait::async_trait;
use cw_core::{
    DeletionResult, LoadRunnerStatus, LogUpdate, LogsListChanged, ProjectInfo, RestartResult,
    SettingsChanged, ValidationResult,
};
use cw_socket::{Connection, LogManager, Project, ProjectError};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const PROJECTS_PATH: &str = "api/v1/projects";

/// Shared HTTP plumbing for the connection and its projects.
#[derive(Clone)]
struct ApiClient {
    base: Url,
    client: Client,
    token: Option<String>,
}

impl ApiClient {
    fn endpoint(&self, path: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{base}/{suffix}")
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProjectError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| ProjectError::new(format!("request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ProjectError::new(format!("response read failed: {err}")))?;
        if !status.is_success() {
            return Err(ProjectError::new(format!(
                "request failed with status {status}: {body}"
            )));
        }
        serde_json::from_str(&body)
            .map_err(|err| ProjectError::new(format!("response was malformed JSON: {err}")))
    }

    async fn request_status_only(&self, request: RequestBuilder) -> Result<(), ProjectError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| ProjectError::new(format!("request failed: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProjectError::new(format!(
            "request failed with status {status}: {body}"
        )))
    }
}

pub struct HttpConnection {
    url: Url,
    label: String,
    remote: bool,
    workspace: PathBuf,
    api: ApiClient,
    projects: RwLock<HashMap<String, Arc<AgentProject>>>,
}

impl HttpConnection {
    pub fn new(
        url: Url,
        label: impl Into<String>,
        remote: bool,
        token: Option<String>,
        workspace: PathBuf,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build HTTP client: {err}"))?;
        Ok(Self {
            api: ApiClient {
                base: url.clone(),
                client,
                token,
            },
            url,
            label: label.into(),
            remote,
            workspace,
            projects: RwLock::new(HashMap::new()),
        })
    }

    pub fn project_count(&self) -> usize {
        self.projects
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    /// Replaces the directory with `listing`. Projects that survive keep
    /// their identity and receive the new state.
    fn replace_projects(&self, listing: Vec<ProjectInfo>) {
        let mut projects = self.projects.write().unwrap_or_else(|err| err.into_inner());
        let mut next = HashMap::with_capacity(listing.len());
        for info in listing {
            let Some(id) = info.project_id.clone() else {
                warn!("project listing entry without a projectID");
                continue;
            };
            let project = match projects.remove(&id) {
                Some(existing) => {
                    existing.update(&info);
                    existing
                }
                None => Arc::new(AgentProject::new(
                    id.clone(),
                    &info,
                    &self.workspace,
                    self.api.clone(),
                )),
            };
            next.insert(id, project);
        }
        *projects = next;
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn url(&self) -> &Url {
        &self.url
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    fn project_by_id(&self, project_id: &str) -> Option<Arc<dyn Project>> {
        let projects = self.projects.read().unwrap_or_else(|err| err.into_inner());
        projects
            .get(project_id)
            .map(|project| Arc::clone(project) as Arc<dyn Project>)
    }

    async fn update_projects(&self) -> Result<(), ProjectError> {
        let request = self.api.client.get(self.api.endpoint(PROJECTS_PATH));
        let listing: Vec<ProjectInfo> = self.api.request_json(request).await?;
        debug!("fetched {} projects from {}", listing.len(), self.url);
        self.replace_projects(listing);
        Ok(())
    }

    fn on_connect(&self) {
        info!("connection {} is connected", self.label);
    }

    fn on_disconnect(&self) {
        warn!("connection {} lost its event channel", self.label);
    }
}

pub struct AgentProject {
    id: String,
    name: String,
    path: PathBuf,
    in_workspace: bool,
    state: Mutex<ProjectInfo>,
    logs: AgentLogs,
    api: ApiClient,
}

impl AgentProject {
    fn new(id: String, info: &ProjectInfo, workspace: &Path, api: ApiClient) -> Self {
        let name = info.name.clone().unwrap_or_else(|| id.clone());
        let path = info
            .location_on_disk
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace.join(&name));
        let in_workspace = path.starts_with(workspace);
        Self {
            logs: AgentLogs {
                project: name.clone(),
            },
            id,
            name,
            path,
            in_workspace,
            state: Mutex::new(info.clone()),
            api,
        }
    }
}

#[async_trait]
impl Project for AgentProject {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn local_path(&self) -> &Path {
        &self.path
    }

    fn is_in_workspace(&self) -> bool {
        self.in_workspace
    }

    fn log_manager(&self) -> &dyn LogManager {
        &self.logs
    }

    fn update(&self, info: &ProjectInfo) {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        let before = state.app_status.clone();
        *state = info.clone();
        if state.app_status != before {
            info!(
                "{} app status: {}",
                self.name,
                state.app_status.as_deref().unwrap_or("unknown")
            );
        }
    }

    async fn on_deletion_event(&self, event: &DeletionResult) -> Result<(), ProjectError> {
        info!(
            "{} was deleted ({})",
            self.name,
            event.status.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    fn on_restart_event(&self, event: &RestartResult) {
        match event.error_msg.as_deref() {
            Some(err) => warn!("{} failed to restart: {err}", self.name),
            None => info!(
                "{} restarted in {} mode",
                self.name,
                event.start_mode.as_deref().unwrap_or("run")
            ),
        }
    }

    fn validate(&self, results: &[ValidationResult]) {
        if results.is_empty() {
            debug!("{} passed validation", self.name);
        }
        for result in results {
            warn!(
                "{} validation {}: {}",
                self.name,
                result.severity,
                result
                    .label
                    .as_deref()
                    .or(result.details.as_deref())
                    .unwrap_or("")
            );
        }
    }

    async fn on_settings_changed_event(
        &self,
        event: &SettingsChanged,
    ) -> Result<(), ProjectError> {
        if let Some(err) = event.error.as_deref().filter(|err| !err.is_empty()) {
            return Err(ProjectError::new(err));
        }
        info!(
            "{} setting {} changed",
            self.name,
            event.name.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    async fn on_load_runner_update(&self, event: &LoadRunnerStatus) -> Result<(), ProjectError> {
        info!(
            "{} load runner: {}",
            self.name,
            event.status.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    async fn delete_from_connection(&self, delete_dir: bool) -> Result<(), ProjectError> {
        let request = self
            .api
            .client
            .post(self.api.endpoint(&format!("{PROJECTS_PATH}/{}/unbind", self.id)));
        self.api.request_status_only(request).await?;
        info!("{} removed from {}", self.name, self.api.base);
        if delete_dir {
            tokio::fs::remove_dir_all(&self.path)
                .await
                .map_err(|err| {
                    ProjectError::new(format!("failed to delete {}: {err}", self.path.display()))
                })?;
        }
        Ok(())
    }
}

struct AgentLogs {
    project: String,
}

#[async_trait]
impl LogManager for AgentLogs {
    async fn on_logs_list_changed(&self, event: &LogsListChanged) -> Result<(), ProjectError> {
        let names: Vec<&str> = event
            .build
            .iter()
            .chain(event.app.iter())
            .map(|log| log.log_name.as_str())
            .collect();
        info!("{} logs available: {}", self.project, names.join(", "));
        Ok(())
    }

    fn on_new_logs(&self, event: &LogUpdate) {
        let log = event.log_name.as_deref().unwrap_or("log");
        for line in event.logs.lines() {
            info!(target: "cw_agent::logs", "[{}/{log}] {line}", self.project);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection() -> HttpConnection {
        HttpConnection::new(
            Url::parse("http://localhost:9090").expect("url"),
            "local",
            false,
            None,
            PathBuf::from("/home/dev/workspace"),
        )
        .expect("connection")
    }

    fn listing(value: serde_json::Value) -> Vec<ProjectInfo> {
        serde_json::from_value(value).expect("listing")
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let conn = connection();
        assert_eq!(
            conn.api.endpoint(PROJECTS_PATH),
            "http://localhost:9090/api/v1/projects"
        );
    }

    #[test]
    fn refresh_replaces_directory_and_keeps_identity() {
        let conn = connection();
        conn.replace_projects(listing(json!([
            { "projectID": "a", "name": "alpha", "locationOnDisk": "/home/dev/workspace/alpha" },
            { "projectID": "b", "name": "beta", "locationOnDisk": "/srv/elsewhere/beta" },
        ])));
        assert_eq!(conn.project_count(), 2);
        let alpha = conn.project_by_id("a").expect("alpha");
        assert!(alpha.is_in_workspace());
        assert!(!conn.project_by_id("b").expect("beta").is_in_workspace());

        conn.replace_projects(listing(json!([
            { "projectID": "a", "name": "alpha", "appStatus": "started" },
            { "name": "no id" },
        ])));
        assert_eq!(conn.project_count(), 1);
        assert!(conn.project_by_id("b").is_none());
        let again = conn.project_by_id("a").expect("alpha");
        assert!(Arc::ptr_eq(&alpha, &again));
    }

    #[test]
    fn project_without_location_lands_in_workspace() {
        let conn = connection();
        conn.replace_projects(listing(json!([{ "projectID": 7, "name": "numeric" }])));
        let project = conn.project_by_id("7").expect("project");
        assert_eq!(project.local_path(), Path::new("/home/dev/workspace/numeric"));
        assert!(project.is_in_workspace());
    }

    #[tokio::test]
    async fn settings_error_is_reported() {
        let conn = connection();
        conn.replace_projects(listing(json!([{ "projectID": "a", "name": "alpha" }])));
        let project = conn.project_by_id("a").expect("alpha");
        let event: SettingsChanged =
            serde_json::from_value(json!({ "projectID": "a", "error": "bad port" }))
                .expect("event");
        assert_eq!(
            project.on_settings_changed_event(&event).await,
            Err(ProjectError::new("bad port"))
        );
    }
}
