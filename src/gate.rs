//! Precondition gate — checks the desktop is usable before dispatching work.
//!
//! Two checks run before every dispatch:
//! 1. Screen lock. A locked console blocks the dispatch with a retry-later
//!    signal. If the probe itself fails the gate fails open.
//! 2. Companion application. If it is not running it is launched and the gate
//!    waits a fixed grace period. Launch success is not re-verified.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::process::ProcessRunner;

/// Pipeline that prints `true`/`false` for the console lock state on macOS.
const LOCK_PROBE: &str = "ioreg -n Root -d1 -a | plutil -extract IOConsoleLocked raw -";

/// Why the gate refused a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The screen is locked. Retry once it is unlocked.
    Locked,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Locked => write!(f, "Screen is locked"),
        }
    }
}

/// Outcome of [`PreconditionGate::check_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked { reason: BlockReason },
}

/// Lock-probe failures. Never surfaced past the gate.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("unrecognized lock state: {0:?}")]
    Unrecognized(String),
}

/// The host environment as seen by the gate.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Whether the console is locked.
    async fn screen_locked(&self) -> Result<bool, ProbeError>;

    /// Whether a process with exactly this name is running.
    async fn app_running(&self, app: &str) -> bool;

    /// Ask the OS to launch `app`. Best effort.
    async fn launch_app(&self, app: &str);
}

/// macOS environment backed by `ioreg`, `pgrep` and `open`.
pub struct SystemEnvironment {
    runner: ProcessRunner,
    lock_probe: String,
}

impl SystemEnvironment {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            lock_probe: LOCK_PROBE.to_string(),
        }
    }

    /// Replace the shell pipeline used to read the lock state. It must print
    /// `true` or `false`.
    pub fn with_lock_probe(mut self, script: impl Into<String>) -> Self {
        self.lock_probe = script.into();
        self
    }
}

#[async_trait]
impl Environment for SystemEnvironment {
    async fn screen_locked(&self) -> Result<bool, ProbeError> {
        let output = self
            .runner
            .run_shell(&self.lock_probe)
            .await?
            .into_checked("lock probe")?;
        parse_lock_state(&output.stdout)
    }

    async fn app_running(&self, app: &str) -> bool {
        matches!(self.runner.run("pgrep", &["-x", app]).await, Ok(out) if out.success())
    }

    async fn launch_app(&self, app: &str) {
        match self.runner.run("open", &["-a", app]).await {
            Ok(out) if out.success() => debug!(app, "Launch requested"),
            Ok(out) => warn!(app, code = out.code, "Launch command failed: {}", out.combined()),
            Err(e) => warn!(app, "Launch command failed: {e}"),
        }
    }
}

fn parse_lock_state(raw: &str) -> Result<bool, ProbeError> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ProbeError::Unrecognized(other.to_string())),
    }
}

/// Environment readiness check run before each dispatch.
pub struct PreconditionGate {
    env: Arc<dyn Environment>,
    companion_app: Option<String>,
    launch_grace: Duration,
}

impl PreconditionGate {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            env,
            companion_app: None,
            launch_grace: Duration::from_secs(3),
        }
    }

    /// Require `app` to be running, launching it if needed.
    pub fn with_companion_app(mut self, app: impl Into<String>) -> Self {
        self.companion_app = Some(app.into());
        self
    }

    /// How long to wait after launching the companion app.
    pub fn with_launch_grace(mut self, grace: Duration) -> Self {
        self.launch_grace = grace;
        self
    }

    pub async fn check_ready(&self) -> Readiness {
        match self.env.screen_locked().await {
            Ok(true) => {
                return Readiness::Blocked {
                    reason: BlockReason::Locked,
                };
            }
            Ok(false) => {}
            Err(e) => warn!("Lock probe failed, assuming unlocked: {e}"),
        }

        if let Some(app) = &self.companion_app {
            if !self.env.app_running(app).await {
                info!("{app} not running, attempting to launch...");
                self.env.launch_app(app).await;
                tokio::time::sleep(self.launch_grace).await;
            }
        }

        Readiness::Ready
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted environment recording launch requests.
    pub(crate) struct FakeEnvironment {
        pub locked: Result<bool, String>,
        pub running: bool,
        pub launched: Mutex<Vec<String>>,
    }

    impl FakeEnvironment {
        pub(crate) fn new(locked: Result<bool, String>, running: bool) -> Self {
            Self {
                locked,
                running,
                launched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Environment for FakeEnvironment {
        async fn screen_locked(&self) -> Result<bool, ProbeError> {
            self.locked.clone().map_err(ProbeError::Unrecognized)
        }

        async fn app_running(&self, _app: &str) -> bool {
            self.running
        }

        async fn launch_app(&self, app: &str) {
            self.launched.lock().unwrap().push(app.to_string());
        }
    }

    #[tokio::test]
    async fn unlocked_with_app_running_is_ready() {
        let env = Arc::new(FakeEnvironment::new(Ok(false), true));
        let gate = PreconditionGate::new(env.clone()).with_companion_app("Google Chrome");
        assert_eq!(gate.check_ready().await, Readiness::Ready);
        assert!(env.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn locked_screen_blocks() {
        let env = Arc::new(FakeEnvironment::new(Ok(true), true));
        let gate = PreconditionGate::new(env);
        assert_eq!(
            gate.check_ready().await,
            Readiness::Blocked {
                reason: BlockReason::Locked
            }
        );
    }

    #[tokio::test]
    async fn probe_error_fails_open() {
        let env = Arc::new(FakeEnvironment::new(Err("ioreg: not found".into()), true));
        let gate = PreconditionGate::new(env);
        assert_eq!(gate.check_ready().await, Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_app_is_launched_then_grace_waited() {
        let env = Arc::new(FakeEnvironment::new(Ok(false), false));
        let gate = PreconditionGate::new(env.clone())
            .with_companion_app("Google Chrome")
            .with_launch_grace(Duration::from_secs(3));

        let start = tokio::time::Instant::now();
        assert_eq!(gate.check_ready().await, Readiness::Ready);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(*env.launched.lock().unwrap(), vec!["Google Chrome".to_string()]);
    }

    #[tokio::test]
    async fn no_companion_app_skips_launch() {
        let env = Arc::new(FakeEnvironment::new(Ok(false), false));
        let gate = PreconditionGate::new(env.clone());
        assert_eq!(gate.check_ready().await, Readiness::Ready);
        assert!(env.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_probe_binary_fails_open() {
        let env = SystemEnvironment::new(ProcessRunner::new(Duration::from_secs(5)))
            .with_lock_probe("agent-dispatch-no-such-probe");
        assert!(env.screen_locked().await.is_err());

        let gate = PreconditionGate::new(Arc::new(env));
        assert_eq!(gate.check_ready().await, Readiness::Ready);
    }

    #[tokio::test]
    async fn unrecognized_probe_output_fails_open() {
        let env = SystemEnvironment::new(ProcessRunner::new(Duration::from_secs(5)))
            .with_lock_probe("echo maybe");
        assert!(matches!(
            env.screen_locked().await,
            Err(ProbeError::Unrecognized(ref s)) if s == "maybe"
        ));

        let gate = PreconditionGate::new(Arc::new(env));
        assert_eq!(gate.check_ready().await, Readiness::Ready);
    }

    #[tokio::test]
    async fn system_probe_reporting_locked_blocks() {
        let env = SystemEnvironment::new(ProcessRunner::new(Duration::from_secs(5)))
            .with_lock_probe("echo true");
        let gate = PreconditionGate::new(Arc::new(env));
        assert_eq!(
            gate.check_ready().await,
            Readiness::Blocked {
                reason: BlockReason::Locked
            }
        );
    }

    #[test]
    fn parses_lock_output() {
        assert!(parse_lock_state("true\n").unwrap());
        assert!(!parse_lock_state(" false ").unwrap());
        assert!(parse_lock_state("").is_err());
    }
}
