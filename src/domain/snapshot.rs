//! Cycle snapshots: the immutable recorded outcome of one cycle.
//!
//! Snapshots replace ad-hoc comparison of live mutable state: each cycle
//! appends exactly one snapshot per account, and change detection is always
//! snapshot-to-snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ErrorKind;

use super::artifact::FolderStatus;
use super::stage::Stage;

/// Which timer produced a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    /// Lightweight pass: discovery and calendar metadata refresh
    Fast,

    /// Heavy pass: the full stage chain per artifact
    Slow,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::Fast => f.write_str("fast"),
            CycleKind::Slow => f.write_str("slow"),
        }
    }
}

/// Per-stage tallies for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    /// Actions actually executed (cache misses)
    pub attempted: u64,

    /// Executed and succeeded
    pub succeeded: u64,

    /// Skipped on an active cache hit
    pub skipped: u64,

    /// Executed and failed terminally
    pub failed: u64,
}

/// Distinct identity of an error for change detection.
///
/// Two cycles reporting the same (stage, artifact, kind) triple are the same
/// error, regardless of message wording; only a signature absent from the
/// prior snapshot counts as new.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ErrorSignature {
    /// Stage the failure occurred in, if stage-level (scan errors have none)
    pub stage: Option<Stage>,

    /// Artifact identity key, or the unreadable path for scan errors
    pub artifact: String,

    /// Failure class
    pub kind: ErrorKind,
}

/// One artifact's outcome within a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    /// Artifact identity key
    pub artifact: String,

    /// Display name at the time of the cycle
    pub display_name: String,

    /// Derived status after the cycle
    pub status: FolderStatus,

    /// Stage the artifact failed at, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
}

/// Aggregate result of one cycle-runner invocation for one account.
///
/// Immutable once appended to the snapshot store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSnapshot {
    /// Monotonic per-account cycle identifier
    pub cycle_id: u64,

    /// Account tag
    pub account: String,

    /// Fast or slow cycle
    pub kind: CycleKind,

    /// When the cycle started
    pub started_at: DateTime<Utc>,

    /// Total cycle duration in milliseconds
    pub duration_ms: u64,

    /// Per-stage tallies (BTreeMap for stable ordering)
    pub counts: BTreeMap<Stage, StageCounts>,

    /// Per-artifact outcomes, sorted by artifact key
    pub artifacts: Vec<ArtifactOutcome>,

    /// Error signatures observed this cycle, with messages
    pub errors: Vec<CycleError>,
}

/// An error captured into a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleError {
    /// Identity for change detection
    pub signature: ErrorSignature,

    /// Human-readable message (not part of the signature)
    pub message: String,
}

impl CycleSnapshot {
    /// Succeeded count for a stage, zero when absent
    pub fn succeeded(&self, stage: Stage) -> u64 {
        self.counts.get(&stage).map(|c| c.succeeded).unwrap_or(0)
    }

    /// Total succeeded across all stages
    pub fn total_succeeded(&self) -> u64 {
        self.counts.values().map(|c| c.succeeded).sum()
    }

    /// Total terminal failures across all stages
    pub fn total_failed(&self) -> u64 {
        self.counts.values().map(|c| c.failed).sum()
    }

    /// The set of error signatures in this snapshot
    pub fn error_signatures(&self) -> std::collections::BTreeSet<&ErrorSignature> {
        self.errors.iter().map(|e| &e.signature).collect()
    }
}

/// Builder accumulating tallies while a cycle runs
#[derive(Debug)]
pub struct SnapshotBuilder {
    cycle_id: u64,
    account: String,
    kind: CycleKind,
    started_at: DateTime<Utc>,
    counts: BTreeMap<Stage, StageCounts>,
    artifacts: Vec<ArtifactOutcome>,
    errors: Vec<CycleError>,
}

impl SnapshotBuilder {
    pub fn new(cycle_id: u64, account: impl Into<String>, kind: CycleKind) -> Self {
        Self {
            cycle_id,
            account: account.into(),
            kind,
            started_at: Utc::now(),
            counts: BTreeMap::new(),
            artifacts: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn entry(&mut self, stage: Stage) -> &mut StageCounts {
        self.counts.entry(stage).or_default()
    }

    pub fn record_skipped(&mut self, stage: Stage) {
        self.entry(stage).skipped += 1;
    }

    pub fn record_succeeded(&mut self, stage: Stage) {
        let counts = self.entry(stage);
        counts.attempted += 1;
        counts.succeeded += 1;
    }

    pub fn record_failed(&mut self, stage: Stage) {
        let counts = self.entry(stage);
        counts.attempted += 1;
        counts.failed += 1;
    }

    pub fn record_error(
        &mut self,
        stage: Option<Stage>,
        artifact: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(CycleError {
            signature: ErrorSignature {
                stage,
                artifact: artifact.into(),
                kind,
            },
            message: message.into(),
        });
    }

    pub fn record_artifact(&mut self, outcome: ArtifactOutcome) {
        self.artifacts.push(outcome);
    }

    /// Finalize into an immutable snapshot; outcomes are sorted by artifact
    /// key so two identical cycles serialize identically
    pub fn finish(mut self) -> CycleSnapshot {
        let duration_ms = (Utc::now() - self.started_at)
            .num_milliseconds()
            .max(0) as u64;

        self.artifacts.sort_by(|a, b| a.artifact.cmp(&b.artifact));
        self.errors
            .sort_by(|a, b| a.signature.cmp(&b.signature));

        CycleSnapshot {
            cycle_id: self.cycle_id,
            account: self.account,
            kind: self.kind,
            started_at: self.started_at,
            duration_ms,
            counts: self.counts,
            artifacts: self.artifacts,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_tallies() {
        let mut builder = SnapshotBuilder::new(1, "personal", CycleKind::Slow);

        builder.record_succeeded(Stage::VideoCompressed);
        builder.record_succeeded(Stage::AudioExtracted);
        builder.record_skipped(Stage::VideoCompressed);
        builder.record_failed(Stage::Transcribed);

        let snapshot = builder.finish();

        let video = snapshot.counts[&Stage::VideoCompressed];
        assert_eq!(video.attempted, 1);
        assert_eq!(video.succeeded, 1);
        assert_eq!(video.skipped, 1);

        assert_eq!(snapshot.counts[&Stage::Transcribed].failed, 1);
        assert_eq!(snapshot.total_succeeded(), 2);
        assert_eq!(snapshot.total_failed(), 1);
    }

    #[test]
    fn test_finish_sorts_artifacts_and_errors() {
        let mut builder = SnapshotBuilder::new(1, "work", CycleKind::Slow);

        builder.record_artifact(ArtifactOutcome {
            artifact: "work:/m/b".to_string(),
            display_name: "b".to_string(),
            status: FolderStatus::Completed,
            failed_stage: None,
        });
        builder.record_artifact(ArtifactOutcome {
            artifact: "work:/m/a".to_string(),
            display_name: "a".to_string(),
            status: FolderStatus::NotStarted,
            failed_stage: None,
        });

        let snapshot = builder.finish();
        assert_eq!(snapshot.artifacts[0].artifact, "work:/m/a");
        assert_eq!(snapshot.artifacts[1].artifact, "work:/m/b");
    }

    #[test]
    fn test_snapshot_serialization_roundtrip() {
        let mut builder = SnapshotBuilder::new(7, "personal", CycleKind::Fast);
        builder.record_succeeded(Stage::Discovered);
        builder.record_error(
            None,
            "personal:/m/unreadable",
            ErrorKind::Scan,
            "permission denied",
        );

        let snapshot = builder.finish();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: CycleSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.cycle_id, 7);
        assert_eq!(parsed.succeeded(Stage::Discovered), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].signature.kind, ErrorKind::Scan);
    }
}
