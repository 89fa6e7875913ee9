use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::warn;

/// Global-state key for the "don't show the new-project logs message again" flag.
pub const HIDE_NEW_LOGS_MSG_KEY: &str = "show-new-logs-msg";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    OverviewOnCreation,
    LogsOnCreation,
    AddNewProjectsToWorkspace,
}

impl Setting {
    pub fn key(&self) -> &'static str {
        match self {
            Setting::OverviewOnCreation => "codewind.openOverviewOnProjectCreation",
            Setting::LogsOnCreation => "codewind.showLogsOnProjectCreation",
            Setting::AddNewProjectsToWorkspace => "codewind.addNewProjectsToWorkspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingSettings {
    pub overview_on_creation: bool,
    pub logs_on_creation: bool,
    pub add_new_projects_to_workspace: bool,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            overview_on_creation: true,
            logs_on_creation: true,
            add_new_projects_to_workspace: false,
        }
    }
}

impl OnboardingSettings {
    pub fn enabled(&self, setting: Setting) -> bool {
        match setting {
            Setting::OverviewOnCreation => self.overview_on_creation,
            Setting::LogsOnCreation => self.logs_on_creation,
            Setting::AddNewProjectsToWorkspace => self.add_new_projects_to_workspace,
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn get_bool(&self, key: &str) -> Option<bool>;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PrefsError>;
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, bool>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        let values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.get(key).copied()
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PrefsError> {
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON object on disk; every write rewrites the file.
pub struct FilePreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FilePreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = load_values(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        let values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.get(key).and_then(Value::as_bool)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PrefsError> {
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.insert(key.to_string(), Value::Bool(value));
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&*values)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

fn load_values(path: &Path) -> Map<String, Value> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Map::new();
    };
    match serde_json::from_str::<Map<String, Value>>(&contents) {
        Ok(values) => values,
        Err(err) => {
            warn!("prefs_parse_failed: {}: {err}", path.display());
            Map::new()
        }
    }
}

/// User toggles read live from the store, falling back to configured defaults.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
    defaults: OnboardingSettings,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>, defaults: OnboardingSettings) -> Self {
        Self { store, defaults }
    }

    pub fn in_memory(defaults: OnboardingSettings) -> Self {
        Self::new(Arc::new(MemoryPreferenceStore::new()), defaults)
    }

    pub fn is_enabled(&self, setting: Setting) -> bool {
        self.store
            .get_bool(setting.key())
            .unwrap_or_else(|| self.defaults.enabled(setting))
    }

    pub fn logs_message_dismissed(&self) -> bool {
        self.store.get_bool(HIDE_NEW_LOGS_MSG_KEY).unwrap_or(false)
    }

    pub fn dismiss_logs_message(&self) -> Result<(), PrefsError> {
        self.store.set_bool(HIDE_NEW_LOGS_MSG_KEY, true)
    }
}
