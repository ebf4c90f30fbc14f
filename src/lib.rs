//! agent-dispatch — mailbox handoff to a persistent automation agent, plus
//! session health checks for the browser sessions it drives.

pub mod config;
pub mod error;
pub mod gate;
pub mod jobs;
pub mod mailbox;
pub mod process;
pub mod session;
