//! Meeting artifact folders and their derived processing status.
//!
//! An artifact folder is one meeting's file bundle (video, extracted audio,
//! transcript, summary). Identity is (account, absolute path); everything else
//! is derived from the filesystem or from stage records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// One meeting's file bundle, discovered by the scanner each cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFolder {
    /// Account tag this folder belongs to (e.g. "personal", "work")
    pub account: String,

    /// Absolute path to the folder
    pub path: PathBuf,

    /// Display name, derived from the folder name (and refreshed from the
    /// calendar event title when one matches)
    pub display_name: String,

    /// Folder creation time
    pub created_at: Option<DateTime<Utc>>,

    /// Folder modification time
    pub modified_at: Option<DateTime<Utc>>,

    /// Source video files relevant to stage 1, sorted by name
    pub source_files: Vec<PathBuf>,
}

impl ArtifactFolder {
    /// Stable identity key used by the content cache and error signatures.
    ///
    /// Format: `{account}:{path}`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.account, self.path.display())
    }

    /// The primary recording (first source file in sorted order)
    pub fn primary_source(&self) -> Option<&PathBuf> {
        self.source_files.first()
    }
}

/// Derived overall status of an artifact folder.
///
/// Computed from the count of stages with an active success record; never
/// stored. Recomputing on unchanged records always yields the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// 0–24% of stages complete
    NotStarted,

    /// 25–49%
    Started,

    /// 50–74%
    InProgress,

    /// 75–99%
    NearCompletion,

    /// All stages complete
    Completed,
}

impl FolderStatus {
    /// Bucket a completed-stage count into a status.
    ///
    /// Pure function: `completed` active success records out of the full
    /// stage set.
    pub fn from_progress(completed: usize) -> Self {
        let total = Stage::ALL.len();
        let completed = completed.min(total);

        if completed == total {
            return FolderStatus::Completed;
        }

        match completed * 100 / total {
            0..=24 => FolderStatus::NotStarted,
            25..=49 => FolderStatus::Started,
            50..=74 => FolderStatus::InProgress,
            _ => FolderStatus::NearCompletion,
        }
    }
}

impl std::fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FolderStatus::NotStarted => "not_started",
            FolderStatus::Started => "started",
            FolderStatus::InProgress => "in_progress",
            FolderStatus::NearCompletion => "near_completion",
            FolderStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_key_includes_account() {
        let folder = ArtifactFolder {
            account: "work".to_string(),
            path: PathBuf::from("/meetings/2025-01-15 Standup"),
            display_name: "2025-01-15 Standup".to_string(),
            created_at: None,
            modified_at: None,
            source_files: vec![],
        };

        assert_eq!(folder.key(), "work:/meetings/2025-01-15 Standup");
    }

    #[test]
    fn test_status_buckets() {
        // 6 stages total: 0 → 0%, 1 → 16%, 2 → 33%, 3 → 50%, 4 → 66%, 5 → 83%, 6 → 100%
        assert_eq!(FolderStatus::from_progress(0), FolderStatus::NotStarted);
        assert_eq!(FolderStatus::from_progress(1), FolderStatus::NotStarted);
        assert_eq!(FolderStatus::from_progress(2), FolderStatus::Started);
        assert_eq!(FolderStatus::from_progress(3), FolderStatus::InProgress);
        assert_eq!(FolderStatus::from_progress(4), FolderStatus::InProgress);
        assert_eq!(FolderStatus::from_progress(5), FolderStatus::NearCompletion);
        assert_eq!(FolderStatus::from_progress(6), FolderStatus::Completed);
    }

    #[test]
    fn test_status_derivation_is_idempotent() {
        for n in 0..=Stage::ALL.len() {
            assert_eq!(
                FolderStatus::from_progress(n),
                FolderStatus::from_progress(n)
            );
        }
    }

    #[test]
    fn test_status_clamps_overflow() {
        assert_eq!(FolderStatus::from_progress(99), FolderStatus::Completed);
    }
}
