//! Resolves event project ids against a connection's directory.
//!
//! A directory refresh refetches every project, so one in-flight refresh
//! serves all events that arrive while it runs, whichever ids they carry.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use tracing::{debug, error, warn};

use crate::collaborators::{Connection, Project};

type RefreshFuture = Shared<BoxFuture<'static, Result<(), String>>>;

struct InFlight {
    generation: u64,
    refresh: RefreshFuture,
}

pub struct ResolvedProject {
    pub project: Arc<dyn Project>,
    /// Set the first time a project shows up through a refresh.
    pub first_sighting: bool,
}

pub struct ProjectResolver {
    connection: Arc<dyn Connection>,
    pending: Mutex<Option<InFlight>>,
    generations: AtomicU64,
    sighted: Mutex<HashSet<String>>,
}

/// Clears the in-flight slot once the refresh that installed it settles,
/// including when the resolving task is dropped mid-await.
struct ClearOnDrop<'a> {
    slot: &'a Mutex<Option<InFlight>>,
    generation: u64,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == self.generation)
        {
            *slot = None;
        }
    }
}

impl ProjectResolver {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            pending: Mutex::new(None),
            generations: AtomicU64::new(0),
            sighted: Mutex::new(HashSet::new()),
        }
    }

    pub async fn resolve(&self, project_id: Option<&str>) -> Option<ResolvedProject> {
        let Some(project_id) = project_id else {
            error!("socket event is missing a projectID");
            return None;
        };

        let known_before = self.connection.project_by_id(project_id).is_some();

        let (refresh, clear_guard) = {
            let mut pending = self.pending.lock().unwrap_or_else(|err| err.into_inner());
            match pending.as_ref() {
                Some(in_flight) => (in_flight.refresh.clone(), None),
                None => {
                    if let Some(project) = self.connection.project_by_id(project_id) {
                        return Some(ResolvedProject {
                            project,
                            first_sighting: false,
                        });
                    }
                    warn!("received socket event for nonexistent project {project_id}");
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    let refresh = self.start_refresh();
                    *pending = Some(InFlight {
                        generation,
                        refresh: refresh.clone(),
                    });
                    let guard = ClearOnDrop {
                        slot: &self.pending,
                        generation,
                    };
                    (refresh, Some(guard))
                }
            }
        };

        let started = clear_guard.is_some();
        let outcome = refresh.await;
        drop(clear_guard);

        if let Err(err) = outcome {
            if started {
                error!("failed to refresh projects list: {err}");
            }
        }

        let Some(project) = self.connection.project_by_id(project_id) else {
            error!(
                "still did not find project {project_id} after refreshing projects list; socket event cannot be processed"
            );
            return None;
        };

        let first_sighting = !known_before && self.mark_sighted(project_id);
        if first_sighting {
            debug!("project {project_id} appeared after refresh");
        }
        Some(ResolvedProject {
            project,
            first_sighting,
        })
    }

    fn start_refresh(&self) -> RefreshFuture {
        let connection = Arc::clone(&self.connection);
        async move {
            connection
                .update_projects()
                .await
                .map_err(|err| err.to_string())
        }
        .boxed()
        .shared()
    }

    fn mark_sighted(&self, project_id: &str) -> bool {
        let mut sighted = self.sighted.lock().unwrap_or_else(|err| err.into_inner());
        sighted.insert(project_id.to_string())
    }
}
