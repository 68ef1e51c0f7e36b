//! Snapshot-to-snapshot change detection.
//!
//! Change detection always compares two immutable snapshots; no live mutable
//! state is ever consulted. A cycle is actionable when it completed new stage
//! work or surfaced an error signature the previous cycle did not have. Error
//! identity is the (stage, artifact, kind) signature, so a repeated failure
//! with reworded messages does not re-notify.

use std::collections::BTreeMap;

use crate::domain::{CycleError, CycleSnapshot, ErrorSignature, Stage};

/// What changed between two consecutive cycles of one account
#[derive(Debug, Clone)]
pub struct ChangeReport {
    /// Account the cycles belong to
    pub account: String,

    /// Cycle id of the current snapshot
    pub cycle_id: u64,

    /// Stages that completed new work this cycle, with counts
    pub completed: BTreeMap<Stage, u64>,

    /// Errors whose signature was absent from the previous snapshot
    pub new_errors: Vec<CycleError>,

    /// Error signatures present previously but gone now
    pub resolved: Vec<ErrorSignature>,
}

impl ChangeReport {
    /// Whether this cycle warrants a notification
    pub fn has_actionable_change(&self) -> bool {
        !self.completed.is_empty() || !self.new_errors.is_empty()
    }

    /// Render the report as a Markdown notification message
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "*{}* cycle {} report",
            self.account, self.cycle_id
        )];

        if !self.completed.is_empty() {
            lines.push(String::new());
            lines.push("Completed:".to_string());
            for (stage, count) in &self.completed {
                lines.push(format!("  - {}: {}", stage, count));
            }
        }

        if !self.new_errors.is_empty() {
            lines.push(String::new());
            lines.push("New errors:".to_string());
            for error in &self.new_errors {
                let stage = error
                    .signature
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "scan".to_string());
                lines.push(format!(
                    "  - [{}] {}: {}",
                    stage, error.signature.artifact, error.message
                ));
            }
        }

        if !self.resolved.is_empty() {
            lines.push(String::new());
            lines.push(format!("Resolved: {} prior error(s)", self.resolved.len()));
        }

        lines.join("\n")
    }
}

/// Compares consecutive cycle snapshots
#[derive(Debug, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Diff the current snapshot against the previous one.
    ///
    /// With no previous snapshot every success and every error counts as new;
    /// a first cycle that only skipped cached work reports no change.
    pub fn diff(&self, previous: Option<&CycleSnapshot>, current: &CycleSnapshot) -> ChangeReport {
        let completed: BTreeMap<Stage, u64> = current
            .counts
            .iter()
            .filter(|(_, counts)| counts.succeeded > 0)
            .map(|(stage, counts)| (*stage, counts.succeeded))
            .collect();

        let previous_signatures = previous
            .map(|p| p.error_signatures())
            .unwrap_or_default();
        let current_signatures = current.error_signatures();

        let new_errors = current
            .errors
            .iter()
            .filter(|e| !previous_signatures.contains(&e.signature))
            .cloned()
            .collect();

        let resolved = previous_signatures
            .iter()
            .filter(|s| !current_signatures.contains(*s))
            .map(|s| (*s).clone())
            .collect();

        ChangeReport {
            account: current.account.clone(),
            cycle_id: current.cycle_id,
            completed,
            new_errors,
            resolved,
        }
    }
}
