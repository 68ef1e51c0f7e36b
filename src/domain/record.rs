//! Stage records: the durable fact "(artifact, stage) completed for content version V".
//!
//! Records are append-only. A new input fingerprint for the same (artifact,
//! stage) supersedes the previous record but never erases it from history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::Stage;

/// Outcome of one stage attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage action completed and its output is available
    Success,

    /// Stage action failed terminally for this input version
    Failure,
}

/// A single durable stage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Unique identifier for this record
    pub id: Uuid,

    /// Artifact identity key (`{account}:{path}`)
    pub artifact: String,

    /// Which stage this record is for
    pub stage: Stage,

    /// Content fingerprint of the stage's primary input at processing time
    pub fingerprint: String,

    /// Success or terminal failure
    pub outcome: StageOutcome,

    /// When the stage action completed
    pub completed_at: DateTime<Utc>,

    /// Output descriptor: a file path for file-producing stages, a notes page
    /// id for the sync stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Diagnostic payload for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time the action took in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StageRecord {
    /// Create a success record
    pub fn success(artifact: String, stage: Stage, fingerprint: String, output: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            stage,
            fingerprint,
            outcome: StageOutcome::Success,
            completed_at: Utc::now(),
            output,
            error: None,
            duration_ms: None,
        }
    }

    /// Create a terminal failure record
    pub fn failure(artifact: String, stage: Stage, fingerprint: String, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            stage,
            fingerprint,
            outcome: StageOutcome::Failure,
            completed_at: Utc::now(),
            output: None,
            error: Some(error),
            duration_ms: None,
        }
    }

    /// Attach a duration to the record
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Whether this record is a usable success for the given input version
    pub fn is_success_for(&self, fingerprint: &str) -> bool {
        self.outcome == StageOutcome::Success && self.fingerprint == fingerprint
    }
}
