//! Job dispatch — hands work to the persistent agent and waits for it.
//!
//! A job only decides *what* to ask for ([`TaskJob::action_prompt`]). The
//! [`Dispatcher`] owns the rest: precondition gate, mailbox write, bounded
//! wait, and mapping the outcome to a [`DispatchError`] named after the job.

pub mod oneshot;
pub mod prompt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::gate::{PreconditionGate, Readiness};
use crate::mailbox::{BoundedPoller, Mailbox, PollOutcome, TaskId};

pub use oneshot::OneShotRunner;
pub use prompt::PromptJob;

/// Free-form job options, as enqueued.
pub type JobOptions = serde_json::Value;

/// A unit of work for the persistent agent.
pub trait TaskJob: Send + Sync {
    /// Job name, used in task files, logs and error messages.
    fn name(&self) -> &str;

    /// Action payload written into the task descriptor.
    fn action_prompt(&self, options: &JobOptions) -> String;
}

/// Successful job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutput {
    pub success: bool,
    pub task_id: TaskId,
    pub output: String,
}

/// Gate → mailbox → poller pipeline.
pub struct Dispatcher {
    gate: PreconditionGate,
    mailbox: Mailbox,
    poller: BoundedPoller,
}

impl Dispatcher {
    pub fn new(gate: PreconditionGate, mailbox: Mailbox, poller: BoundedPoller) -> Self {
        Self {
            gate,
            mailbox,
            poller,
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Run `job` to completion.
    ///
    /// Returns [`DispatchError::RetryLater`] without touching the mailbox when
    /// the gate is blocked. Task failures and timeouts are never retried here.
    pub async fn run(
        &self,
        job: &dyn TaskJob,
        options: &JobOptions,
    ) -> Result<JobOutput, DispatchError> {
        let name = job.name();
        info!("Starting {name}...");

        if let Readiness::Blocked { reason } = self.gate.check_ready().await {
            warn!(job = name, "{reason}, deferring");
            return Err(DispatchError::RetryLater {
                job: name.to_string(),
                reason: reason.to_string(),
            });
        }

        let action = job.action_prompt(options);
        let task_id = self
            .mailbox
            .dispatch(name, &action)
            .await
            .map_err(|source| DispatchError::Mailbox {
                job: name.to_string(),
                source,
            })?;

        let outcome = self
            .poller
            .await_result(&self.mailbox, &task_id)
            .await
            .map_err(|source| DispatchError::Mailbox {
                job: name.to_string(),
                source,
            })?;

        match outcome {
            PollOutcome::Success(output) => Ok(JobOutput {
                success: true,
                task_id,
                output,
            }),
            PollOutcome::Failure(output) => Err(DispatchError::TaskFailed {
                job: name.to_string(),
                output,
            }),
            PollOutcome::Timeout { waited, .. } => Err(DispatchError::Timeout {
                job: name.to_string(),
                task_id: task_id.to_string(),
                waited,
            }),
        }
    }
}
