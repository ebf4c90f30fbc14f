//! Task descriptor and result record file formats.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Number of random bytes behind each task id.
const TASK_ID_BYTES: usize = 12;

/// Hex-encoded random task identifier (`jid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh identifier from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let bytes: [u8; TASK_ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name used in both `pending/` and `done/`.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unit of work handed to the external agent. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub jid: TaskId,
    /// Name of the job that produced the task.
    pub job: String,
    /// Opaque action payload for the agent.
    pub action: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl TaskDescriptor {
    pub fn new(jid: TaskId, job: impl Into<String>, action: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            jid,
            job: job.into(),
            action: action.into(),
            created_at: now.with_nanosecond(0).unwrap_or(now),
        }
    }
}

/// Terminal status reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Completion record written by the agent into `done/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: ResultStatus,
    #[serde(default)]
    pub output: String,
}

/// `YYYY-MM-DDTHH:MM:SSZ`, second precision.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn task_ids_are_24_hex_chars() {
        let id = TaskId::generate();
        assert_eq!(id.as_str().len(), TASK_ID_BYTES * 2);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.file_name(), format!("{id}.json"));
    }

    #[test]
    fn task_ids_do_not_collide() {
        let ids: HashSet<TaskId> = (0..1000).map(|_| TaskId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn descriptor_timestamp_format() {
        let desc = TaskDescriptor::new(TaskId::from("abc"), "EmailCleanupJob", "archive");
        let json = serde_json::to_value(&desc).unwrap();
        let created = json["created_at"].as_str().unwrap();
        assert_eq!(created.len(), "2026-01-01T00:00:00Z".len());
        assert!(created.ends_with('Z'));
        assert_eq!(json["jid"], "abc");
        assert_eq!(json["job"], "EmailCleanupJob");
    }

    #[test]
    fn result_record_parses_both_statuses() {
        let ok: ResultRecord = serde_json::from_str(r#"{"status":"ok","output":"done"}"#).unwrap();
        assert_eq!(ok.status, ResultStatus::Ok);
        assert_eq!(ok.output, "done");

        let err: ResultRecord = serde_json::from_str(r#"{"status":"error","output":"boom"}"#).unwrap();
        assert_eq!(err.status, ResultStatus::Error);
    }

    #[test]
    fn result_record_rejects_unknown_status() {
        assert!(serde_json::from_str::<ResultRecord>(r#"{"status":"maybe"}"#).is_err());
    }
}
