//! Error types for agent-dispatch.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Config file not found: {}\nCopy config.yml.example to config.yml and fill in your values.",
        path.display()
    )]
    NotFound { path: PathBuf },

    #[error("Config key not found: {0}")]
    MissingKey(String),

    #[error("Missing required config keys:\n{}", format_missing(.0))]
    MissingKeys(Vec<String>),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_missing(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("  - {k}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Task mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid task file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Job dispatch errors. Every message leads with the originating job name.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Environment is temporarily unusable; the job should be requeued.
    #[error("{job}: {reason} - will retry later")]
    RetryLater { job: String, reason: String },

    /// The external agent reported `status: error`.
    #[error("{job} failed: {output}")]
    TaskFailed { job: String, output: String },

    /// No result file appeared within the wait window. The outcome is unknown.
    #[error(
        "{job}: task {task_id} timed out after {}s - no result file found",
        waited.as_secs()
    )]
    Timeout {
        job: String,
        task_id: String,
        waited: Duration,
    },

    #[error("{job}: {source}")]
    Mailbox {
        job: String,
        #[source]
        source: MailboxError,
    },
}

impl DispatchError {
    /// Whether a retry scheduler should requeue the job rather than fail it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::RetryLater { .. })
    }

    /// Name of the job the error originated from.
    pub fn job(&self) -> &str {
        match self {
            DispatchError::RetryLater { job, .. }
            | DispatchError::TaskFailed { job, .. }
            | DispatchError::Timeout { job, .. }
            | DispatchError::Mailbox { job, .. } => job,
        }
    }
}

/// Session registry / health errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Invalid readiness pattern for session {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Session {name} has neither url nor url_key")]
    MissingUrl { name: String },

    #[error("Could not resolve URL for session {name}: {source}")]
    UrlUnresolved {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("Session tool failed for {name}: {reason}")]
    ToolFailed { name: String, reason: String },
}

/// External process errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {code}: {output}")]
    Failed {
        program: String,
        code: i32,
        output: String,
    },
}
