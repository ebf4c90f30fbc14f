//! Named automation sessions and their health checks.
//!
//! - `registry` — which sessions exist, their probe URL and readiness pattern
//! - `tool` — the external session CLI (`playwright-cli`)
//! - `credentials` — one saved auth-state snapshot per session
//! - `health` — probe → recover → verify → refresh state machine

pub mod credentials;
pub mod health;
pub mod registry;
pub mod tool;

pub use credentials::CredentialStore;
pub use health::{HealthChecker, HealthReport, SessionOutcome, UnhealthyReason, Verdict};
pub use registry::{SessionRegistry, SessionSpec, UrlSource};
pub use tool::{PlaywrightCli, SessionTool};
