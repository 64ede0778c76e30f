//! Session records: one per `run()`, mutated only by the runner, frozen by `finish()`.
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::util::fs::claim_unique_file;
use crate::util::id::file_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    Failure { message: String },
}

impl SessionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionStatus::Success)
    }
}

/// A session that has started but not finished.
#[derive(Debug)]
pub struct SessionInProgress {
    agent_id: String,
    instruction: String,
    started_at: SystemTime,
    log_file: PathBuf,
}

impl SessionInProgress {
    pub fn begin(agent_id: &str, instruction: &str, log_file: PathBuf) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            instruction: instruction.to_string(),
            started_at: SystemTime::now(),
            log_file,
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn finish(self, status: SessionStatus) -> SessionRecord {
        SessionRecord {
            agent_id: self.agent_id,
            instruction: self.instruction,
            started_at: self.started_at,
            completed_at: SystemTime::now(),
            log_file: self.log_file,
            status,
        }
    }
}

/// Completed session. Fields are read-only.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    agent_id: String,
    instruction: String,
    #[serde(serialize_with = "ser_time")]
    started_at: SystemTime,
    #[serde(serialize_with = "ser_time")]
    completed_at: SystemTime,
    log_file: PathBuf,
    #[serde(flatten)]
    status: SessionStatus,
}

fn ser_time<S: serde::Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&humantime::format_rfc3339_millis(*t))
}

impl SessionRecord {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn completed_at(&self) -> SystemTime {
        self.completed_at
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

/// Claim `<agent>-<timestamp>.json` in `dir` for a session starting at `at`.
pub fn allocate_log_file(dir: &Path, agent_id: &str, at: SystemTime) -> std::io::Result<PathBuf> {
    let stem = format!("{agent_id}-{}", file_timestamp(at));
    claim_unique_file(dir, &stem, "json")
}
