//! Orchestration core: scanning, caching, the stage pipeline, cycle
//! snapshots, and scheduling.

pub mod cache;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod scanner;
pub mod scheduler;
pub mod snapshot_store;

pub use cache::{CacheError, ContentCache};
pub use diff::{ChangeDetector, ChangeReport};
pub use error::{ErrorKind, StageError};
pub use fingerprint::{fingerprint_file, fingerprint_sources, fingerprint_text};
pub use pipeline::{PipelineSettings, StagePipeline};
pub use retry::{RetryExecutor, RetryPolicy};
pub use runner::CycleRunner;
pub use scanner::{ArtifactScanner, ScanFailure, ScanResult};
pub use scheduler::{ProcessLock, ScheduleSettings, Scheduler};
pub use snapshot_store::{SnapshotStore, SnapshotStoreError};
