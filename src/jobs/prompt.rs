//! Generic job carrying a ready-made action payload.

use crate::jobs::{JobOptions, TaskJob};

/// A job whose action text is fixed at construction time.
///
/// Non-empty options are appended to the action as an `Options:` JSON line so
/// the agent sees them alongside the instructions.
#[derive(Debug, Clone)]
pub struct PromptJob {
    name: String,
    action: String,
}

impl PromptJob {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
        }
    }
}

impl TaskJob for PromptJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn action_prompt(&self, options: &JobOptions) -> String {
        let empty = match options {
            JobOptions::Null => true,
            JobOptions::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            self.action.clone()
        } else {
            format!("{}\n\nOptions: {options}", self.action)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_leave_action_untouched() {
        let job = PromptJob::new("EmailCleanupJob", "archive low-priority mail");
        assert_eq!(job.name(), "EmailCleanupJob");
        assert_eq!(job.action_prompt(&JobOptions::Null), "archive low-priority mail");
        assert_eq!(
            job.action_prompt(&serde_json::json!({})),
            "archive low-priority mail"
        );
    }

    #[test]
    fn options_are_appended_to_action() {
        let job = PromptJob::new("CalendarSyncJob", "sync calendars");
        assert_eq!(
            job.action_prompt(&serde_json::json!({"mode": "full"})),
            "sync calendars\n\nOptions: {\"mode\":\"full\"}"
        );
    }
}
