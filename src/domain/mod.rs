//! Domain types for the meetflow orchestrator.
//!
//! This module contains the core data structures:
//! - ArtifactFolder: one meeting's file bundle and its derived status
//! - Stage / StageRecord: the fixed pipeline order and its durable completion facts
//! - CycleSnapshot: the immutable recorded outcome of one cycle

pub mod artifact;
pub mod record;
pub mod snapshot;
pub mod stage;

// Re-export commonly used types
pub use artifact::{ArtifactFolder, FolderStatus};
pub use record::{StageOutcome, StageRecord};
pub use snapshot::{
    ArtifactOutcome, CycleError, CycleKind, CycleSnapshot, ErrorSignature, SnapshotBuilder,
    StageCounts,
};
pub use stage::Stage;
