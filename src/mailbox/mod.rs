//! File-backed task mailbox shared with the external agent.
//!
//! The mailbox is a directory on disk containing:
//! - `pending/{jid}.json`: task descriptors written by the dispatcher
//! - `done/{jid}.json`: result records written by the agent
//!
//! Nothing signals the agent; it watches `pending/` on its own. The core never
//! deletes either file.

pub mod poller;
pub mod task;

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::MailboxError;

pub use poller::{BoundedPoller, PollOutcome, PollSettings, ProgressSink, TracingProgress};
pub use task::{ResultRecord, ResultStatus, TaskDescriptor, TaskId};

/// Well-known mailbox subdirectories.
pub mod paths {
    pub const PENDING: &str = "pending";
    pub const DONE: &str = "done";
}

/// Directory rendezvous between dispatcher and agent.
#[derive(Debug, Clone)]
pub struct Mailbox {
    root: PathBuf,
}

impl Mailbox {
    /// Create a mailbox rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.root.join(paths::PENDING)
    }

    pub fn done_dir(&self) -> PathBuf {
        self.root.join(paths::DONE)
    }

    pub fn pending_path(&self, id: &TaskId) -> PathBuf {
        self.pending_dir().join(id.file_name())
    }

    /// Where the agent writes the result for `id`.
    pub fn result_path(&self, id: &TaskId) -> PathBuf {
        self.done_dir().join(id.file_name())
    }

    /// Ensure both subdirectories exist.
    pub async fn ensure_dirs(&self) -> Result<(), MailboxError> {
        for dir in [self.pending_dir(), self.done_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| MailboxError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Write a new task descriptor and return its id.
    pub async fn dispatch(&self, job: &str, action: &str) -> Result<TaskId, MailboxError> {
        let descriptor = TaskDescriptor::new(TaskId::generate(), job, action);
        self.write_descriptor(&descriptor).await?;
        Ok(descriptor.jid)
    }

    /// Persist `descriptor` into `pending/` via a temp file and rename, so the
    /// agent never observes a half-written task.
    pub async fn write_descriptor(&self, descriptor: &TaskDescriptor) -> Result<(), MailboxError> {
        let dir = self.pending_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| MailboxError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = self.pending_path(&descriptor.jid);
        let tmp = dir.join(format!(".{}.tmp", descriptor.jid));
        let body = serde_json::to_string_pretty(descriptor)?;

        fs::write(&tmp, body)
            .await
            .map_err(|source| MailboxError::Io {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| MailboxError::Io {
                path: path.clone(),
                source,
            })?;

        info!("Wrote task file: {}", path.display());
        Ok(())
    }

    /// Read back a pending descriptor.
    pub async fn read_descriptor(&self, id: &TaskId) -> Result<TaskDescriptor, MailboxError> {
        let path = self.pending_path(id);
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|source| MailboxError::Io {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|e| MailboxError::InvalidFile {
            path,
            reason: e.to_string(),
        })
    }

    /// Read the result for `id`, or `None` if the agent has not written it yet.
    pub async fn read_result(&self, id: &TaskId) -> Result<Option<ResultRecord>, MailboxError> {
        let path = self.result_path(id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MailboxError::Io { path, source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MailboxError::InvalidFile {
                path,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn test_mailbox() -> (Mailbox, TempDir) {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(dir.path().join("tasks"));
        (mailbox, dir)
    }

    #[tokio::test]
    async fn dispatch_creates_pending_dir_and_file() {
        let (mailbox, _dir) = test_mailbox();
        let id = mailbox.dispatch("EmailCleanupJob", "archive things").await.unwrap();
        assert!(mailbox.pending_path(&id).exists());
    }

    #[tokio::test]
    async fn dispatch_read_back_roundtrip() {
        let (mailbox, _dir) = test_mailbox();
        let id = mailbox.dispatch("CalendarSyncJob", "sync mode: fast").await.unwrap();
        let desc = mailbox.read_descriptor(&id).await.unwrap();
        assert_eq!(desc.jid, id);
        assert_eq!(desc.job, "CalendarSyncJob");
        assert_eq!(desc.action, "sync mode: fast");
    }

    #[tokio::test]
    async fn dispatch_ids_are_unique() {
        let (mailbox, _dir) = test_mailbox();
        let mut ids = HashSet::new();
        for i in 0..50 {
            ids.insert(mailbox.dispatch("Job", &format!("action {i}")).await.unwrap());
        }
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn dispatch_leaves_no_temp_files() {
        let (mailbox, _dir) = test_mailbox();
        mailbox.dispatch("Job", "a").await.unwrap();
        let names: Vec<String> = std::fs::read_dir(mailbox.pending_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn read_result_absent_is_none() {
        let (mailbox, _dir) = test_mailbox();
        mailbox.ensure_dirs().await.unwrap();
        assert!(mailbox.read_result(&TaskId::generate()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_result_parses_record() {
        let (mailbox, _dir) = test_mailbox();
        mailbox.ensure_dirs().await.unwrap();
        let id = TaskId::generate();
        std::fs::write(mailbox.result_path(&id), r#"{"status":"ok","output":"done"}"#).unwrap();
        let record = mailbox.read_result(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ResultStatus::Ok);
        assert_eq!(record.output, "done");
    }

    #[tokio::test]
    async fn malformed_result_is_an_error() {
        let (mailbox, _dir) = test_mailbox();
        mailbox.ensure_dirs().await.unwrap();
        let id = TaskId::generate();
        std::fs::write(mailbox.result_path(&id), "not json").unwrap();
        let err = mailbox.read_result(&id).await.unwrap_err();
        assert!(matches!(err, MailboxError::InvalidFile { .. }));
    }
}
