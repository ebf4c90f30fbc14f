//! Bounded result poller — waits for the agent's result file.
//!
//! Elapsed time is counted in whole poll intervals (`elapsed += interval`),
//! not measured from the wall clock. Real wait time can therefore exceed
//! `max_wait` by up to one interval plus the time spent reading files.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, ResultRecord, ResultStatus, TaskId};

/// Floor applied to the poll interval so elapsed time always advances.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing knobs for [`BoundedPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep between existence checks. Never shorter than 1ms.
    pub interval: Duration,
    /// Give up once this much (interval-counted) time has elapsed.
    pub max_wait: Duration,
    /// Report progress once per window of this length.
    pub progress_every: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(1800),
            progress_every: Duration::from_secs(30),
        }
    }
}

/// Terminal result of waiting on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Agent reported `ok`.
    Success(String),
    /// Agent reported `error`; carries its diagnostic text.
    Failure(String),
    /// No result file appeared. The task may still be running.
    Timeout { waited: Duration, polls: u32 },
}

/// Receives poller progress.
pub trait ProgressSink: Send + Sync {
    /// Still waiting on `task_id` after `elapsed`.
    fn waiting(&self, task_id: &TaskId, elapsed: Duration);

    /// `task_id` finished with `record`.
    fn completed(&self, task_id: &TaskId, record: &ResultRecord);
}

/// Default sink: progress goes to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn waiting(&self, task_id: &TaskId, elapsed: Duration) {
        info!("Waiting for task {task_id} result... ({}s)", elapsed.as_secs());
    }

    fn completed(&self, task_id: &TaskId, record: &ResultRecord) {
        let status = match record.status {
            ResultStatus::Ok => "ok",
            ResultStatus::Error => "error",
        };
        info!("Task {task_id} completed: {status}");
        info!("Output: {}", record.output);
    }
}

/// Polls the mailbox's `done/` directory for one task at a time.
pub struct BoundedPoller {
    settings: PollSettings,
    progress: Arc<dyn ProgressSink>,
}

impl BoundedPoller {
    pub fn new(settings: PollSettings, progress: Arc<dyn ProgressSink>) -> Self {
        Self { settings, progress }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Block until the result for `task_id` appears or `max_wait` elapses.
    pub async fn await_result(
        &self,
        mailbox: &Mailbox,
        task_id: &TaskId,
    ) -> Result<PollOutcome, MailboxError> {
        let PollSettings {
            interval,
            max_wait,
            progress_every,
        } = self.settings;
        let interval = interval.max(MIN_INTERVAL);

        let mut elapsed = Duration::ZERO;
        let mut polls: u32 = 0;

        while elapsed < max_wait {
            if let Some(record) = mailbox.read_result(task_id).await? {
                self.progress.completed(task_id, &record);
                return Ok(match record.status {
                    ResultStatus::Ok => PollOutcome::Success(record.output),
                    ResultStatus::Error => PollOutcome::Failure(record.output),
                });
            }

            tokio::time::sleep(interval).await;
            let before = elapsed;
            elapsed += interval;
            polls += 1;

            if crossed_window(before, elapsed, progress_every) {
                self.progress.waiting(task_id, elapsed);
            }
        }

        Ok(PollOutcome::Timeout {
            waited: elapsed,
            polls,
        })
    }
}

/// Whether moving from `before` to `after` enters a new `window`.
fn crossed_window(before: Duration, after: Duration, window: Duration) -> bool {
    if window.is_zero() {
        return false;
    }
    after.as_millis() / window.as_millis() > before.as_millis() / window.as_millis()
}
