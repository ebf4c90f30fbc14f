use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use agent_dispatch::config::{ConfigTree, RuntimeConfig, SessionEntry, WorkerConfig};
use agent_dispatch::error::DispatchError;
use agent_dispatch::gate::{PreconditionGate, SystemEnvironment};
use agent_dispatch::jobs::{Dispatcher, JobOptions, OneShotRunner, PromptJob};
use agent_dispatch::mailbox::{BoundedPoller, Mailbox, PollSettings, TracingProgress};
use agent_dispatch::process::ProcessRunner;
use agent_dispatch::session::{CredentialStore, HealthChecker, PlaywrightCli, SessionRegistry};

/// `EX_TEMPFAIL` from sysexits.h: the job should be requeued.
const EXIT_RETRY_LATER: u8 = 75;

#[derive(Parser)]
#[command(name = "agent-dispatch", version, about = "Dispatch work to a persistent automation agent")]
struct Cli {
    /// Path to config.yml
    #[arg(long, global = true, env = "AGENT_DISPATCH_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify browser sessions are logged in (all, or one service)
    Health { service: Option<String> },
    /// Print the probe URL for a service
    Url { service: String },
    /// Check config.yml for missing required keys
    Validate,
    /// Hand a task to the persistent agent and wait for its result
    Dispatch {
        /// Job name recorded in the task file
        #[arg(long)]
        job: String,
        /// Read the action payload from a file
        #[arg(long, conflicts_with = "action")]
        action_file: Option<PathBuf>,
        /// Action payload
        action: Option<String>,
        /// Job options as JSON
        #[arg(long, default_value = "{}")]
        options: String,
    },
    /// Run a single prompt through the agent CLI, no persistent session
    Oneshot {
        prompt: String,
        /// Keep the agent's permission prompts
        #[arg(long)]
        no_skip_permissions: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(dispatch) = e.downcast_ref::<DispatchError>() {
                if dispatch.is_retryable() {
                    eprintln!("{dispatch}");
                    return ExitCode::from(EXIT_RETRY_LATER);
                }
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let tree = ConfigTree::load(&cli.config)?;
    let runtime = tree.runtime()?;
    let runner = ProcessRunner::new(runtime.command_timeout()).with_env(tree.exported_env());

    match cli.command {
        Command::Validate => {
            WorkerConfig::from_tree(&tree)?;
            eprintln!("Config OK: {}", cli.config.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Url { service } => {
            let registry = load_registry(&tree)?;
            println!("{}", registry.url_for(&service, &tree)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Health { service } => {
            let registry = Arc::new(load_registry(&tree)?);
            let checker = HealthChecker::new(
                registry,
                Arc::new(tree),
                Arc::new(PlaywrightCli::new(runtime.session_cli.clone(), runner)),
                CredentialStore::new(runtime.auth_state_dir.clone()),
            )
            .with_settle_delay(runtime.settle_delay());

            let report = checker.check_all(service.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.all_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Dispatch {
            job,
            action_file,
            action,
            options,
        } => {
            let config = WorkerConfig::from_tree(&tree)?;
            let action = read_action(action, action_file.as_deref()).await?;
            let options: JobOptions =
                serde_json::from_str(&options).context("--options must be JSON")?;

            let dispatcher = build_dispatcher(&config.runtime, runner);
            let output = dispatcher
                .run(&PromptJob::new(job, action), &options)
                .await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Oneshot {
            prompt,
            no_skip_permissions,
        } => {
            let output = OneShotRunner::new(runtime.agent_cli.clone(), runner)
                .with_skip_permissions(!no_skip_permissions)
                .run(&prompt)
                .await?;
            print!("{output}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_registry(tree: &ConfigTree) -> anyhow::Result<SessionRegistry> {
    let configured: BTreeMap<String, SessionEntry> = tree.section("sessions")?;
    Ok(SessionRegistry::builtin()?.with_configured(&configured)?)
}

fn build_dispatcher(runtime: &RuntimeConfig, runner: ProcessRunner) -> Dispatcher {
    let mut gate = PreconditionGate::new(Arc::new(SystemEnvironment::new(runner)))
        .with_launch_grace(runtime.launch_grace());
    if let Some(app) = runtime.companion_app() {
        gate = gate.with_companion_app(app);
    }

    let poller = BoundedPoller::new(
        PollSettings {
            interval: runtime.poll_interval(),
            max_wait: runtime.poll_timeout(),
            progress_every: runtime.progress_every(),
        },
        Arc::new(TracingProgress),
    );

    Dispatcher::new(gate, Mailbox::new(runtime.tasks_dir.clone()), poller)
}

async fn read_action(action: Option<String>, file: Option<&Path>) -> anyhow::Result<String> {
    match (action, file) {
        (Some(action), _) => Ok(action),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        (None, None) => anyhow::bail!("an action payload or --action-file is required"),
    }
}
