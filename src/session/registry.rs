//! Session registry — which automation sessions exist and how to probe them.
//!
//! Built once at startup and injected into the health checker. Each entry
//! names the page to open and the pattern its content must match for the
//! session to count as logged in.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::config::{ConfigTree, SessionEntry};
use crate::error::{ConfigError, SessionError};

/// Where a session's probe URL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    /// Fixed URL.
    Static(String),
    /// Dotted config key holding the URL.
    ConfigKey(String),
}

/// Probe definition for one session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub url: UrlSource,
    /// Case-insensitive readiness pattern.
    pub pattern: Regex,
}

impl SessionSpec {
    /// Build a spec, compiling `pattern` case-insensitively.
    pub fn new(name: &str, url: UrlSource, pattern: &str) -> Result<Self, SessionError> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| SessionError::InvalidPattern {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { url, pattern })
    }

    pub fn resolve_url(&self, config: &ConfigTree) -> Result<String, ConfigError> {
        match &self.url {
            UrlSource::Static(url) => Ok(url.clone()),
            UrlSource::ConfigKey(key) => config.get_string(key),
        }
    }

    /// Whether captured page content indicates a usable, logged-in session.
    pub fn is_ready(&self, page: &str) -> bool {
        self.pattern.is_match(page)
    }
}

/// Built-in sessions: (name, url source, pattern).
const BUILTIN: &[(&str, Builtin, &str)] = &[
    ("outlook", Builtin::Key("outlook.inbox_url"), "inbox|focused|other"),
    ("outlook-calendar", Builtin::Key("outlook.calendar_url"), "calendar|today|week"),
    (
        "slack-greatminds",
        Builtin::Key("slack.workspaces.greatminds.url"),
        "unreads|threads|channel",
    ),
    (
        "slack-turing",
        Builtin::Key("slack.workspaces.turing.url"),
        "unreads|threads|channel",
    ),
    (
        "jira",
        Builtin::Url("https://digital-greatminds.atlassian.net/jira/core/projects/JC/board"),
        "board|backlog|sprint",
    ),
    ("linkedin", Builtin::Key("linkedin.feed_url"), "feed|home|network"),
];

enum Builtin {
    Key(&'static str),
    Url(&'static str),
}

/// Immutable name → spec mapping.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, SessionSpec>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a session.
    pub fn with_session(mut self, name: impl Into<String>, spec: SessionSpec) -> Self {
        self.sessions.insert(name.into(), spec);
        self
    }

    /// The built-in work services.
    pub fn builtin() -> Result<Self, SessionError> {
        BUILTIN
            .iter()
            .try_fold(Self::new(), |registry, (name, source, pattern)| {
                let url = match source {
                    Builtin::Key(key) => UrlSource::ConfigKey(key.to_string()),
                    Builtin::Url(url) => UrlSource::Static(url.to_string()),
                };
                Ok(registry.with_session(*name, SessionSpec::new(name, url, pattern)?))
            })
    }

    /// Built-ins extended (or overridden) by the `sessions:` config section.
    pub fn with_configured(
        mut self,
        entries: &BTreeMap<String, SessionEntry>,
    ) -> Result<Self, SessionError> {
        for (name, entry) in entries {
            let url = match (&entry.url, &entry.url_key) {
                (Some(url), _) => UrlSource::Static(url.clone()),
                (None, Some(key)) => UrlSource::ConfigKey(key.clone()),
                (None, None) => return Err(SessionError::MissingUrl { name: name.clone() }),
            };
            let spec = SessionSpec::new(name, url, &entry.pattern)?;
            self.sessions.insert(name.clone(), spec);
        }
        Ok(self)
    }

    /// Look up a session. Unknown names are a caller bug.
    pub fn get(&self, name: &str) -> Result<&SessionSpec, SessionError> {
        self.sessions
            .get(name)
            .ok_or_else(|| SessionError::UnknownSession(name.to_string()))
    }

    /// Resolve the probe URL for `name`.
    pub fn url_for(&self, name: &str, config: &ConfigTree) -> Result<String, SessionError> {
        self.get(name)?
            .resolve_url(config)
            .map_err(|source| SessionError::UrlUnresolved {
                name: name.to_string(),
                source,
            })
    }

    /// Sessions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SessionSpec)> {
        self.sessions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
