//! External command execution.
//!
//! Every collaborator this crate talks to (lock probe, app launcher, session
//! CLI, agent CLI) is a separate program. Commands run with:
//! - Merged stdout/stderr capture
//! - Timeout enforcement (the child is killed on expiry)
//! - Output truncation

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ProcessError;

/// Maximum captured output size before truncation (64KB).
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout and stderr together, the way `2>&1` would present them.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Turn a non-zero exit into an error carrying the combined output.
    pub fn into_checked(self, program: &str) -> Result<Self, ProcessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProcessError::Failed {
                program: program.to_string(),
                code: self.code,
                output: self.combined(),
            })
        }
    }
}

/// Runs external programs with a fixed timeout and extra environment.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: Vec::new(),
        }
    }

    /// Add environment variables passed to every spawned child.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Run `program` with `args` directly (no shell).
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProcessError> {
        let mut command = Command::new(program);
        command.args(args);
        self.execute(program, command).await
    }

    /// Run a pipeline through `sh -c`.
    pub async fn run_shell(&self, script: &str) -> Result<CommandOutput, ProcessError> {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        self.execute("sh", command).await
    }

    async fn execute(
        &self,
        program: &str,
        mut command: Command,
    ) -> Result<CommandOutput, ProcessError> {
        command
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: truncate_output(&String::from_utf8_lossy(&output.stdout)),
                stderr: truncate_output(&String::from_utf8_lossy(&output.stderr)),
                code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(source)) => Err(ProcessError::Spawn {
                program: program.to_string(),
                source,
            }),
            // Dropping the wait future drops the child, which kills it.
            Err(_) => Err(ProcessError::Timeout {
                program: program.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_SIZE {
        return output.to_string();
    }
    let mut end = MAX_OUTPUT_SIZE;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (output truncated)", &output[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let out = runner.run_shell("echo hello; echo oops >&2; exit 3").await.unwrap();
        assert_eq!(out.code, 3);
        assert!(!out.success());
        assert!(out.combined().contains("hello"));
        assert!(out.combined().contains("oops"));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn extra_env_reaches_child() {
        let runner = ProcessRunner::new(Duration::from_secs(5))
            .with_env(vec![("AGENT_DISPATCH_TEST_VAR".into(), "present".into())]);
        let out = runner.run_shell("printf %s \"$AGENT_DISPATCH_TEST_VAR\"").await.unwrap();
        assert_eq!(out.stdout, "present");
    }

    #[test]
    fn checked_failure_carries_output() {
        let out = CommandOutput {
            stdout: String::new(),
            stderr: "bad things".into(),
            code: 1,
        };
        let err = out.into_checked("claude").unwrap_err();
        assert!(err.to_string().contains("bad things"));
    }

    #[test]
    fn truncate_long_output() {
        let long = "x".repeat(MAX_OUTPUT_SIZE + 10);
        assert!(truncate_output(&long).ends_with("(output truncated)"));
    }
}
