//! Session tool — the external CLI that owns the browser sessions.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SessionError;
use crate::process::{CommandOutput, ProcessRunner};

/// Placeholder session used for commands that are not session-scoped.
const ANY_SESSION: &str = "_";

/// Operations the health checker needs from the session CLI.
#[async_trait]
pub trait SessionTool: Send + Sync {
    /// Whether `session` is currently attached/open.
    async fn is_active(&self, session: &str) -> bool;

    /// Load a saved credential snapshot into a fresh session.
    async fn load_state(&self, session: &str, path: &Path) -> Result<(), SessionError>;

    /// Open a browser for `session` at `url`.
    async fn open(&self, session: &str, url: &str) -> Result<(), SessionError>;

    /// Navigate an open session.
    async fn goto(&self, session: &str, url: &str) -> Result<(), SessionError>;

    /// Structural snapshot of the current page.
    async fn snapshot(&self, session: &str) -> Result<String, SessionError>;

    /// Persist the session's authentication state to `path`.
    async fn save_state(&self, session: &str, path: &Path) -> Result<(), SessionError>;
}

/// `playwright-cli -s=<session> <command> ...`
pub struct PlaywrightCli {
    program: String,
    runner: ProcessRunner,
}

impl PlaywrightCli {
    pub fn new(program: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    async fn invoke(&self, session: &str, args: &[&str]) -> Result<CommandOutput, SessionError> {
        let session_flag = format!("-s={session}");
        let mut full_args = vec![session_flag.as_str()];
        full_args.extend_from_slice(args);
        debug!(program = %self.program, args = ?full_args, "Session command");

        let output = self
            .runner
            .run(&self.program, &full_args)
            .await
            .map_err(|e| SessionError::ToolFailed {
                name: session.to_string(),
                reason: e.to_string(),
            })?;

        if output.success() {
            Ok(output)
        } else {
            Err(SessionError::ToolFailed {
                name: session.to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    args.first().copied().unwrap_or_default(),
                    output.code,
                    output.combined().trim()
                ),
            })
        }
    }
}

#[async_trait]
impl SessionTool for PlaywrightCli {
    async fn is_active(&self, session: &str) -> bool {
        match self.invoke(ANY_SESSION, &["list"]).await {
            Ok(output) => lists_session(&output.combined(), session),
            Err(e) => {
                debug!("Session list failed: {e}");
                false
            }
        }
    }

    async fn load_state(&self, session: &str, path: &Path) -> Result<(), SessionError> {
        let path = path.to_string_lossy();
        self.invoke(session, &["state-load", &*path]).await.map(|_| ())
    }

    async fn open(&self, session: &str, url: &str) -> Result<(), SessionError> {
        self.invoke(session, &["open", url]).await.map(|_| ())
    }

    async fn goto(&self, session: &str, url: &str) -> Result<(), SessionError> {
        self.invoke(session, &["goto", url]).await.map(|_| ())
    }

    async fn snapshot(&self, session: &str) -> Result<String, SessionError> {
        self.invoke(session, &["snapshot"])
            .await
            .map(|output| output.combined())
    }

    async fn save_state(&self, session: &str, path: &Path) -> Result<(), SessionError> {
        let path = path.to_string_lossy();
        self.invoke(session, &["state-save", &*path]).await.map(|_| ())
    }
}

/// Whether `list` output names `session` exactly (not as a prefix of another name).
pub(crate) fn lists_session(output: &str, session: &str) -> bool {
    output
        .split(|c: char| {
            c.is_whitespace()
                || matches!(c, ',' | ':' | ';' | '=' | '"' | '\'' | '[' | ']' | '(' | ')' | '*')
        })
        .any(|token| token == session)
}
