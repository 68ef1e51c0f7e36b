//! Content-addressed stage cache with file-based persistence.
//!
//! Records are stored as newline-delimited JSON (JSONL) for simplicity and
//! easy inspection. The full file is the history; an in-memory index of the
//! most recent record per (artifact, stage) gives O(1) lookups and is the
//! "active" pointer. Appending never destroys prior records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::{Stage, StageOutcome, StageRecord};

/// Errors from the content cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSONL-backed content cache, shared across parallel account cycles.
///
/// All writers serialize through the inner mutex; one instance is shared via
/// `Arc` by every cycle runner in the process.
pub struct ContentCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    /// Path to the records JSONL file
    records_path: PathBuf,

    /// Active pointer: most recent record per (artifact key, stage)
    active: HashMap<(String, Stage), StageRecord>,
}

impl ContentCache {
    /// Open a cache, replaying existing records into the active index
    pub async fn open(records_path: PathBuf) -> Result<Self, CacheError> {
        if let Some(parent) = records_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut active = HashMap::new();
        for record in Self::replay_file(&records_path).await? {
            active.insert((record.artifact.clone(), record.stage), record);
        }

        Ok(Self {
            inner: Mutex::new(CacheInner {
                records_path,
                active,
            }),
        })
    }

    async fn replay_file(path: &Path) -> Result<Vec<StageRecord>, CacheError> {
        let mut records = Vec::new();

        if !path.exists() {
            return Ok(records);
        }

        let file = File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: StageRecord = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Look up the active record for (artifact, stage) at a specific input
    /// version. Absent when no record exists or the active record was made
    /// for a different fingerprint.
    pub async fn lookup(
        &self,
        artifact: &str,
        stage: Stage,
        fingerprint: &str,
    ) -> Option<StageRecord> {
        let inner = self.inner.lock().await;
        inner
            .active
            .get(&(artifact.to_string(), stage))
            .filter(|r| r.fingerprint == fingerprint)
            .cloned()
    }

    /// The active record for (artifact, stage) regardless of fingerprint
    pub async fn active(&self, artifact: &str, stage: Stage) -> Option<StageRecord> {
        let inner = self.inner.lock().await;
        inner.active.get(&(artifact.to_string(), stage)).cloned()
    }

    /// Append a record and swap the active pointer for its (artifact, stage)
    pub async fn record(&self, record: StageRecord) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.records_path)
            .await?;

        let json = serde_json::to_string(&record)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        inner
            .active
            .insert((record.artifact.clone(), record.stage), record);

        Ok(())
    }

    /// Number of stages with an active success record for an artifact.
    ///
    /// Feeds the derived folder status; pure with respect to cache state.
    pub async fn completed_stages(&self, artifact: &str) -> usize {
        let inner = self.inner.lock().await;
        Stage::ALL
            .iter()
            .filter(|stage| {
                inner
                    .active
                    .get(&(artifact.to_string(), **stage))
                    .map(|r| r.outcome == StageOutcome::Success)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Full record history for one artifact, oldest first (superseded records
    /// included)
    pub async fn history(&self, artifact: &str) -> Result<Vec<StageRecord>, CacheError> {
        let path = {
            let inner = self.inner.lock().await;
            inner.records_path.clone()
        };

        let records = Self::replay_file(&path).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.artifact == artifact)
            .collect())
    }
}
