//! Append-only persistence for cycle snapshots.
//!
//! One JSONL file per account under `snapshots/`. Appending is the only
//! write; cycle ids are derived from the last appended snapshot, so they stay
//! monotonic across restarts without a separate counter file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::{CycleKind, CycleSnapshot};

/// Errors from the snapshot store
#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-account JSONL snapshot files under one directory
pub struct SnapshotStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Open a store rooted at `dir`, creating it if needed
    pub async fn open(dir: PathBuf) -> Result<Self, SnapshotStoreError> {
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn account_path(&self, account: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", account))
    }

    async fn replay(path: &Path) -> Result<Vec<CycleSnapshot>, SnapshotStoreError> {
        let mut snapshots = Vec::new();

        if !path.exists() {
            return Ok(snapshots);
        }

        let file = File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let snapshot: CycleSnapshot = serde_json::from_str(&line)?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    /// Append one snapshot to its account's file
    pub async fn append(&self, snapshot: &CycleSnapshot) -> Result<(), SnapshotStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.account_path(&snapshot.account))
            .await?;

        let json = serde_json::to_string(snapshot)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// The most recent snapshot of a given kind for an account
    pub async fn latest(
        &self,
        account: &str,
        kind: CycleKind,
    ) -> Result<Option<CycleSnapshot>, SnapshotStoreError> {
        let snapshots = Self::replay(&self.account_path(account)).await?;
        Ok(snapshots.into_iter().rev().find(|s| s.kind == kind))
    }

    /// Up to `limit` most recent snapshots for an account, newest first
    pub async fn history(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<CycleSnapshot>, SnapshotStoreError> {
        let mut snapshots = Self::replay(&self.account_path(account)).await?;
        snapshots.reverse();
        snapshots.truncate(limit);
        Ok(snapshots)
    }

    /// Next cycle id for an account: one past the highest appended id
    pub async fn next_cycle_id(&self, account: &str) -> Result<u64, SnapshotStoreError> {
        let snapshots = Self::replay(&self.account_path(account)).await?;
        Ok(snapshots.iter().map(|s| s.cycle_id).max().unwrap_or(0) + 1)
    }
}
