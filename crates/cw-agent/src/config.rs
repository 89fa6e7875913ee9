use cw_socket::OnboardingSettings;
use serde::{Deserialize, Serialize};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

pub const DEFAULT_URL: &str = "http://localhost:9090";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    pub connection: ConnectionConfig,
    pub onboarding: OnboardingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: String,
    pub label: String,
    /// Socket namespace under the url; empty means the root namespace.
    pub namespace: String,
    pub remote: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            label: "local".to_string(),
            namespace: String::new(),
            remote: false,
        }
    }
}

/// A missing file yields the defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> anyhow::Result<AgentConfig> {
    if !path.exists() {
        return Ok(AgentConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("invalid config {}: {err}", path.display()))?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &AgentConfig) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    fs::write(path, contents)
}

pub fn config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var("CW_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    config_root().join("cw/agent.toml")
}

pub fn default_prefs_path() -> PathBuf {
    state_root().join("cw/prefs.json")
}

pub fn resolve_url(flag: Option<&str>, config: &ConnectionConfig) -> String {
    if let Some(value) = flag.filter(|value| !value.trim().is_empty()) {
        return value.to_string();
    }
    if let Ok(value) = env::var("CW_URL") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    config.url.clone()
}

pub fn resolve_log_dir(flag: Option<&str>, config: &AgentConfig) -> String {
    if let Some(value) = flag.filter(|value| !value.trim().is_empty()) {
        return value.to_string();
    }
    if let Ok(value) = env::var("CW_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    config.log_dir.clone().unwrap_or_default()
}

pub fn resolve_log_stdout() -> bool {
    if let Ok(value) = env::var("CW_LOG_STDOUT") {
        match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => return true,
            "0" | "false" | "FALSE" | "no" | "NO" => return false,
            _ => {}
        }
    }
    true
}

/// Platforms without a state dir keep prefs next to other local data.
fn state_root() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| home_root().join(".local/state"))
}

fn config_root() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| home_root().join(".config"))
}

fn home_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.connection.url, DEFAULT_URL);
        assert!(config.onboarding.overview_on_creation);
    }

    #[test]
    fn partial_tables_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            r#"
prefs_path = "/tmp/cw-prefs.json"

[connection]
url = "https://cw.example.com"
remote = true

[onboarding]
logs_on_creation = false
"#,
        )
        .expect("write");

        let config = load_config(&path).expect("load");
        assert_eq!(config.connection.url, "https://cw.example.com");
        assert!(config.connection.remote);
        assert_eq!(config.connection.label, "local");
        assert!(!config.onboarding.logs_on_creation);
        assert!(config.onboarding.overview_on_creation);
        assert_eq!(config.prefs_path, Some(PathBuf::from("/tmp/cw-prefs.json")));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent.toml");
        fs::write(&path, "[connection\nurl = ").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("agent.toml");
        let mut config = AgentConfig::default();
        config.connection.namespace = "default".to_string();
        config.onboarding.add_new_projects_to_workspace = true;

        save_config(&path, &config).expect("save");
        assert_eq!(load_config(&path).expect("load"), config);
    }

    #[test]
    fn config_flag_wins_over_default_location() {
        let flag = Path::new("/etc/cw/agent.toml");
        assert_eq!(config_path(Some(flag)), flag);
    }

    #[test]
    fn default_prefs_live_under_cw_state() {
        let path = default_prefs_path();
        assert!(path.ends_with("cw/prefs.json"));
        assert!(path.is_absolute() || path.starts_with("."));
    }

    #[test]
    fn url_flag_wins_over_config() {
        let config = ConnectionConfig::default();
        assert_eq!(
            resolve_url(Some("http://10.0.0.5:9090"), &config),
            "http://10.0.0.5:9090"
        );
    }
}
