//! One-shot agent runs for tasks that need no persistent session.
//!
//! Spawns the agent CLI in print mode (`<agent> [--dangerously-skip-permissions] -p <prompt>`)
//! and returns its stdout. A non-zero exit is an error carrying the output.

use tracing::{debug, error, info};

use crate::error::ProcessError;
use crate::process::ProcessRunner;

/// Prompt prefix length shown in logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Runs a single prompt through the agent CLI.
pub struct OneShotRunner {
    program: String,
    runner: ProcessRunner,
    skip_permissions: bool,
}

impl OneShotRunner {
    pub fn new(program: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            program: program.into(),
            runner,
            skip_permissions: true,
        }
    }

    /// Keep the agent's interactive permission prompts.
    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    fn args<'a>(&self, prompt: &'a str) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(3);
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions");
        }
        args.push("-p");
        args.push(prompt);
        args
    }

    pub async fn run(&self, prompt: &str) -> Result<String, ProcessError> {
        let preview: String = prompt.chars().take(LOG_PREVIEW_CHARS).collect();
        info!("Executing agent task: {preview}...");

        let args = self.args(prompt);
        debug!(program = %self.program, ?args, "Command");

        match self.runner.run(&self.program, &args).await?.into_checked(&self.program) {
            Ok(output) => {
                info!("Task completed successfully");
                Ok(output.stdout)
            }
            Err(e) => {
                error!("Task failed: {e}");
                Err(e)
            }
        }
    }
}
