//! Configuration types.
//!
//! `config.yml` is loaded once into a [`ConfigTree`] (dotted-path lookups for the
//! handful of places that resolve keys by name) and validated against
//! [`REQUIRED_KEYS`] before the typed [`WorkerConfig`] is built from it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::ConfigError;

/// Keys that must be present (and non-null) for the worker to start.
pub const REQUIRED_KEYS: &[&str] = &[
    "faktory.url",
    "jira.cloud_id",
    "jira.project_key",
    "google_calendar.client_id",
    "google_calendar.client_secret",
    "google_calendar.refresh_token",
    "google_calendar.calendar_id",
    "google_calendar.timezone",
    "slack.workspaces",
    "outlook.inbox_url",
    "outlook.calendar_url",
    "linkedin.feed_url",
    "granola.notes_dir",
];

/// Environment variables handed to child processes, and the keys backing them.
const ENV_EXPORTS: &[(&str, &str)] = &[
    ("FAKTORY_URL", "faktory.url"),
    ("GCAL_CLIENT_ID", "google_calendar.client_id"),
    ("GCAL_CLIENT_SECRET", "google_calendar.client_secret"),
    ("GCAL_REFRESH_TOKEN", "google_calendar.refresh_token"),
];

/// Raw, loosely-typed configuration tree.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    /// Load and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let root: Value =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    /// Look up a dotted path such as `slack.workspaces.turing.url`.
    ///
    /// Fails if any segment is absent or an intermediate value is not a mapping.
    pub fn get(&self, dot_path: &str) -> Result<&Value, ConfigError> {
        let mut value = &self.root;
        for key in dot_path.split('.') {
            value = value
                .as_mapping()
                .and_then(|m| m.get(key))
                .ok_or_else(|| ConfigError::MissingKey(dot_path.to_string()))?;
        }
        Ok(value)
    }

    /// Look up a dotted path and render it as a string.
    ///
    /// Strings, numbers and booleans are accepted; anything else is invalid.
    pub fn get_string(&self, dot_path: &str) -> Result<String, ConfigError> {
        match self.get(dot_path)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err(ConfigError::MissingKey(dot_path.to_string())),
            _ => Err(ConfigError::InvalidValue {
                key: dot_path.to_string(),
                message: "expected a scalar".to_string(),
            }),
        }
    }

    /// Check every key in `required`, reporting all missing ones together.
    pub fn validate(&self, required: &[&str]) -> Result<(), ConfigError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| matches!(self.get(key), Err(_) | Ok(Value::Null)))
            .map(|key| key.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(missing))
        }
    }

    /// Environment variables to pass to spawned agent processes.
    ///
    /// Variables already set in this process are left alone, and variables whose
    /// backing key is absent are skipped.
    pub fn exported_env(&self) -> Vec<(String, String)> {
        self.exported_env_with(|name| std::env::var_os(name).is_some())
    }

    fn exported_env_with(&self, already_set: impl Fn(&str) -> bool) -> Vec<(String, String)> {
        ENV_EXPORTS
            .iter()
            .filter(|(name, _)| !already_set(name))
            .filter_map(|(name, key)| {
                self.get_string(key)
                    .ok()
                    .map(|value| (name.to_string(), value))
            })
            .collect()
    }

    /// The `worker:` section, defaulted and checked.
    pub fn runtime(&self) -> Result<RuntimeConfig, ConfigError> {
        let runtime: RuntimeConfig = self.section("worker")?;
        runtime.validate()?;
        Ok(runtime)
    }

    /// Deserialize an optional subsection, falling back to its defaults.
    pub fn section<T: Default + DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        match self.get(key) {
            Ok(Value::Null) | Err(ConfigError::MissingKey(_)) => Ok(T::default()),
            Ok(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            }),
            Err(e) => Err(e),
        }
    }
}

/// Worker tunables from the optional `worker:` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Mailbox root; contains `pending/` and `done/`.
    pub tasks_dir: PathBuf,
    /// Directory holding one credential snapshot per session.
    pub auth_state_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub progress_every_secs: u64,
    /// Delay between navigating a session and capturing its page.
    pub settle_delay_ms: u64,
    /// Grace period after launching the companion app.
    pub launch_grace_secs: u64,
    /// Application that must be running before dispatch. Empty disables the check.
    pub companion_app: String,
    pub session_cli: String,
    pub command_timeout_secs: u64,
    pub agent_cli: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("./tasks"),
            auth_state_dir: PathBuf::from("./auth-state"),
            poll_interval_secs: 5,
            poll_timeout_secs: 1800, // 30 minutes
            progress_every_secs: 30,
            settle_delay_ms: 2000,
            launch_grace_secs: 3,
            companion_app: "Google Chrome".to_string(),
            session_cli: "playwright-cli".to_string(),
            command_timeout_secs: 60,
            agent_cli: "claude".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn progress_every(&self) -> Duration {
        Duration::from_secs(self.progress_every_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn launch_grace(&self) -> Duration {
        Duration::from_secs(self.launch_grace_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Reject values that would stall the worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "worker.poll_interval_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Companion app name, or `None` when the check is disabled.
    pub fn companion_app(&self) -> Option<&str> {
        let app = self.companion_app.trim();
        (!app.is_empty()).then_some(app)
    }
}

/// Jira project coordinates.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub cloud_id: String,
    pub project_key: String,
}

/// Google Calendar credentials and target calendar.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    pub calendar_id: String,
    pub timezone: String,
}

/// Outlook Web entry points.
#[derive(Debug, Clone)]
pub struct OutlookConfig {
    pub inbox_url: String,
    pub calendar_url: String,
}

/// A Slack workspace entry under `slack.workspaces`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackWorkspace {
    #[serde(default)]
    pub url: Option<String>,
}

/// A session declared in the `sessions:` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_key: Option<String>,
    pub pattern: String,
}

/// Typed worker configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub faktory_url: String,
    pub jira: JiraConfig,
    pub google_calendar: CalendarConfig,
    pub slack_workspaces: BTreeMap<String, SlackWorkspace>,
    pub outlook: OutlookConfig,
    pub linkedin_feed_url: String,
    pub granola_notes_dir: PathBuf,
    pub sessions: BTreeMap<String, SessionEntry>,
    pub runtime: RuntimeConfig,
}

impl WorkerConfig {
    /// Validate the required keys in one pass, then build the typed view.
    pub fn from_tree(tree: &ConfigTree) -> Result<Self, ConfigError> {
        tree.validate(REQUIRED_KEYS)?;

        let slack_workspaces: BTreeMap<String, SlackWorkspace> =
            serde_yaml::from_value(tree.get("slack.workspaces")?.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "slack.workspaces".to_string(),
                    message: e.to_string(),
                }
            })?;

        Ok(Self {
            faktory_url: tree.get_string("faktory.url")?,
            jira: JiraConfig {
                cloud_id: tree.get_string("jira.cloud_id")?,
                project_key: tree.get_string("jira.project_key")?,
            },
            google_calendar: CalendarConfig {
                client_id: tree.get_string("google_calendar.client_id")?,
                client_secret: SecretString::from(
                    tree.get_string("google_calendar.client_secret")?,
                ),
                refresh_token: SecretString::from(
                    tree.get_string("google_calendar.refresh_token")?,
                ),
                calendar_id: tree.get_string("google_calendar.calendar_id")?,
                timezone: tree.get_string("google_calendar.timezone")?,
            },
            slack_workspaces,
            outlook: OutlookConfig {
                inbox_url: tree.get_string("outlook.inbox_url")?,
                calendar_url: tree.get_string("outlook.calendar_url")?,
            },
            linkedin_feed_url: tree.get_string("linkedin.feed_url")?,
            granola_notes_dir: PathBuf::from(tree.get_string("granola.notes_dir")?),
            sessions: tree.section("sessions")?,
            runtime: tree.runtime()?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    pub(crate) const FULL_CONFIG: &str = r#"
faktory:
  url: tcp://localhost:7419
jira:
  cloud_id: abc-123
  project_key: JC
google_calendar:
  client_id: gcal-id
  client_secret: gcal-secret
  refresh_token: gcal-refresh
  calendar_id: outlook@group.calendar.google.com
  timezone: America/New_York
slack:
  workspaces:
    greatminds:
      url: https://app.slack.com/client/T1
    turing:
      url: https://app.slack.com/client/T2
outlook:
  inbox_url: https://outlook.office.com/mail/
  calendar_url: https://outlook.office.com/calendar/
linkedin:
  feed_url: https://www.linkedin.com/feed/
granola:
  notes_dir: ~/Documents/granola-notes
"#;

    #[test]
    fn get_walks_dotted_paths() {
        let tree = ConfigTree::from_yaml_str(FULL_CONFIG).unwrap();
        assert_eq!(
            tree.get_string("slack.workspaces.turing.url").unwrap(),
            "https://app.slack.com/client/T2"
        );
        assert_eq!(tree.get_string("jira.project_key").unwrap(), "JC");
    }

    #[test]
    fn get_fails_on_missing_segment() {
        let tree = ConfigTree::from_yaml_str(FULL_CONFIG).unwrap();
        let err = tree.get("slack.workspaces.nope.url").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "slack.workspaces.nope.url"));
    }

    #[test]
    fn get_fails_when_traversing_a_scalar() {
        let tree = ConfigTree::from_yaml_str(FULL_CONFIG).unwrap();
        assert!(tree.get("jira.project_key.deeper").is_err());
    }

    #[test]
    fn validate_lists_all_missing_keys_at_once() {
        let tree = ConfigTree::from_yaml_str(
            "faktory:\n  url: tcp://x\njira:\n  cloud_id: ~\n",
        )
        .unwrap();
        let err = tree.validate(REQUIRED_KEYS).unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => {
                assert_eq!(keys.len(), REQUIRED_KEYS.len() - 1);
                assert!(keys.contains(&"jira.cloud_id".to_string()));
                assert!(!keys.contains(&"faktory.url".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn worker_config_builds_from_full_tree() {
        let tree = ConfigTree::from_yaml_str(FULL_CONFIG).unwrap();
        let config = WorkerConfig::from_tree(&tree).unwrap();
        assert_eq!(config.jira.cloud_id, "abc-123");
        assert_eq!(config.google_calendar.client_secret.expose_secret(), "gcal-secret");
        assert_eq!(config.slack_workspaces.len(), 2);
        assert!(config.sessions.is_empty());
        assert_eq!(config.runtime.poll_interval_secs, 5);
        assert_eq!(config.runtime.poll_timeout(), Duration::from_secs(1800));
        assert_eq!(config.runtime.companion_app(), Some("Google Chrome"));
    }

    #[test]
    fn worker_section_overrides_defaults() {
        let raw = format!(
            "{FULL_CONFIG}worker:\n  poll_interval_secs: 2\n  companion_app: \"\"\n  tasks_dir: /tmp/t\n"
        );
        let tree = ConfigTree::from_yaml_str(&raw).unwrap();
        let config = WorkerConfig::from_tree(&tree).unwrap();
        assert_eq!(config.runtime.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.runtime.poll_timeout_secs, 1800);
        assert_eq!(config.runtime.companion_app(), None);
        assert_eq!(config.runtime.tasks_dir, PathBuf::from("/tmp/t"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let raw = format!("{FULL_CONFIG}worker:\n  poll_interval_secs: 0\n");
        let tree = ConfigTree::from_yaml_str(&raw).unwrap();

        let err = tree.runtime().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "worker.poll_interval_secs"
        ));
        assert!(WorkerConfig::from_tree(&tree).is_err());
    }

    #[test]
    fn exported_env_skips_set_and_absent_keys() {
        let tree = ConfigTree::from_yaml_str(
            "faktory:\n  url: tcp://x\ngoogle_calendar:\n  client_id: id\n",
        )
        .unwrap();
        let env = tree.exported_env_with(|name| name == "FAKTORY_URL");
        assert_eq!(env, vec![("GCAL_CLIENT_ID".to_string(), "id".to_string())]);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ConfigTree::load(Path::new("/definitely/not/here/config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("config.yml.example"));
    }
}
