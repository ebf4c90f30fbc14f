//! Session health state machine.
//!
//! For each registered session:
//!
//! ```text
//! Probe   -> live? Verify : Recover
//! Recover -> snapshot? (load, open) Verify : Unhealthy(NoCredentialSnapshot)
//! Verify  -> goto, settle, capture
//!            capture failed  -> Unhealthy(CaptureFailed)
//!            pattern matched -> Healthy, snapshot rewritten
//!            no match        -> Unhealthy(PatternMismatch), snapshot untouched
//! ```
//!
//! Sessions are evaluated one after another. A session's failure is recorded in
//! the report and never stops the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConfigTree;
use crate::error::SessionError;
use crate::session::credentials::CredentialStore;
use crate::session::registry::{SessionRegistry, SessionSpec};
use crate::session::tool::SessionTool;

/// Why a session was classified unhealthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnhealthyReason {
    /// Not live and nothing to recover from.
    NoCredentialSnapshot,
    /// Probe URL could not be resolved from configuration.
    UrlUnresolved(String),
    /// Navigation or page capture failed.
    CaptureFailed(String),
    /// Page captured but does not look logged in.
    PatternMismatch,
}

impl std::fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCredentialSnapshot => write!(f, "no credential snapshot"),
            Self::UrlUnresolved(e) => write!(f, "url unresolved: {e}"),
            Self::CaptureFailed(e) => write!(f, "capture failed: {e}"),
            Self::PatternMismatch => write!(f, "page does not match readiness pattern"),
        }
    }
}

/// Terminal classification of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Unhealthy(UnhealthyReason),
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }
}

/// States of the per-session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HealthState {
    Probe,
    Recover,
    Verify,
    Done(Verdict),
}

/// Per-session result with detail. Kept in memory only.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub name: String,
    pub healthy: bool,
    /// Whether the session was restored from its snapshot.
    pub recovered: bool,
    pub detail: Option<String>,
}

/// Aggregate `{healthy, unhealthy}` result of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
    #[serde(skip)]
    pub outcomes: Vec<SessionOutcome>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }

    pub fn total(&self) -> usize {
        self.healthy.len() + self.unhealthy.len()
    }

    fn record(&mut self, outcome: SessionOutcome) {
        if outcome.healthy {
            self.healthy.push(outcome.name.clone());
        } else {
            self.unhealthy.push(outcome.name.clone());
        }
        self.outcomes.push(outcome);
    }
}

/// Runs the health state machine across registered sessions.
pub struct HealthChecker {
    registry: Arc<SessionRegistry>,
    config: Arc<ConfigTree>,
    tool: Arc<dyn SessionTool>,
    credentials: CredentialStore,
    settle_delay: Duration,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<SessionRegistry>,
        config: Arc<ConfigTree>,
        tool: Arc<dyn SessionTool>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            registry,
            config,
            tool,
            credentials,
            settle_delay: Duration::from_secs(2),
        }
    }

    /// Delay between navigation and page capture.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Check one named session, or every registered session when `selector` is `None`.
    ///
    /// An unknown selector fails before anything is probed.
    pub async fn check_all(&self, selector: Option<&str>) -> Result<HealthReport, SessionError> {
        let targets: Vec<(&str, &SessionSpec)> = match selector {
            Some(name) => vec![(name, self.registry.get(name)?)],
            None => self.registry.iter().collect(),
        };

        let mut report = HealthReport::default();
        for (name, spec) in targets {
            report.record(self.check_session(name, spec).await);
        }

        info!(
            "Session health: {}/{} OK",
            report.healthy.len(),
            report.total()
        );
        for outcome in report.outcomes.iter().filter(|o| !o.healthy) {
            warn!(
                "Session '{}' unhealthy: {}",
                outcome.name,
                outcome.detail.as_deref().unwrap_or("unknown")
            );
        }

        Ok(report)
    }

    /// Drive one session through the state machine.
    pub async fn check_session(&self, name: &str, spec: &SessionSpec) -> SessionOutcome {
        let url = match spec.resolve_url(&self.config) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(session = name, "Cannot resolve URL: {e}");
                None
            }
        };

        let mut recovered = false;
        let mut state = HealthState::Probe;

        let verdict = loop {
            state = match state {
                HealthState::Probe => {
                    if self.tool.is_active(name).await {
                        debug!(session = name, "Session live");
                        HealthState::Verify
                    } else {
                        HealthState::Recover
                    }
                }
                HealthState::Recover => {
                    if !self.credentials.exists(name).await {
                        warn!("No auth state for '{name}'");
                        HealthState::Done(Verdict::Unhealthy(
                            UnhealthyReason::NoCredentialSnapshot,
                        ))
                    } else if let Some(url) = &url {
                        self.recover(name, url).await;
                        recovered = true;
                        HealthState::Verify
                    } else {
                        HealthState::Done(self.unresolved(name, spec))
                    }
                }
                HealthState::Verify => match &url {
                    Some(url) => HealthState::Done(self.verify(name, spec, url).await),
                    None => HealthState::Done(self.unresolved(name, spec)),
                },
                HealthState::Done(verdict) => break verdict,
            };
        };

        SessionOutcome {
            name: name.to_string(),
            healthy: verdict.is_healthy(),
            recovered,
            detail: match verdict {
                Verdict::Healthy => None,
                Verdict::Unhealthy(reason) => Some(reason.to_string()),
            },
        }
    }

    fn unresolved(&self, name: &str, spec: &SessionSpec) -> Verdict {
        let reason = spec
            .resolve_url(&self.config)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("no url for {name}"));
        Verdict::Unhealthy(UnhealthyReason::UrlUnresolved(reason))
    }

    /// Load the saved snapshot and reopen the session. Failures here are left
    /// for the verify step to catch.
    async fn recover(&self, name: &str, url: &str) {
        info!(session = name, "Restoring session from saved state");
        let path = self.credentials.path_for(name);
        if let Err(e) = self.tool.load_state(name, &path).await {
            warn!(session = name, "state-load failed: {e}");
        }
        if let Err(e) = self.tool.open(name, url).await {
            warn!(session = name, "open failed: {e}");
        }
    }

    async fn verify(&self, name: &str, spec: &SessionSpec, url: &str) -> Verdict {
        if let Err(e) = self.tool.goto(name, url).await {
            debug!(session = name, "goto failed: {e}");
        }
        tokio::time::sleep(self.settle_delay).await;

        let page = match self.tool.snapshot(name).await {
            Ok(page) => page,
            Err(e) => return Verdict::Unhealthy(UnhealthyReason::CaptureFailed(e.to_string())),
        };

        if !spec.is_ready(&page) {
            return Verdict::Unhealthy(UnhealthyReason::PatternMismatch);
        }

        self.refresh_snapshot(name).await;
        Verdict::Healthy
    }

    /// Overwrite the credential snapshot for a session just confirmed live.
    async fn refresh_snapshot(&self, name: &str) {
        if let Err(e) = self.credentials.ensure_dir().await {
            warn!(session = name, "Cannot create auth state dir: {e}");
            return;
        }
        let path = self.credentials.path_for(name);
        match self.tool.save_state(name, &path).await {
            Ok(()) => debug!(session = name, path = %path.display(), "Saved auth state"),
            Err(e) => warn!(session = name, "state-save failed: {e}"),
        }
    }
}
