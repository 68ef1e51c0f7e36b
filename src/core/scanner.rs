//! Artifact folder enumeration for one account root.
//!
//! Scans are deterministic (lexicographic by path) so two scans of an
//! unchanged tree enumerate folders identically, which snapshot diffing
//! depends on. One unreadable folder becomes a scan error and is excluded;
//! the rest of the scan continues.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::ArtifactFolder;

/// Video extensions recognized as stage-1 source files
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "avi", "webm"];

/// Stem suffix marking transcoder output; never a source file
const DERIVED_SUFFIX: &str = "_compressed";

/// A folder that could not be enumerated
#[derive(Debug, Clone)]
pub struct ScanFailure {
    /// Path that failed
    pub path: PathBuf,

    /// What went wrong
    pub message: String,
}

/// Result of scanning one account root
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Artifact folders, sorted lexicographically by path
    pub folders: Vec<ArtifactFolder>,

    /// Folders excluded from this cycle
    pub errors: Vec<ScanFailure>,
}

/// Scanner for one account's artifact root
pub struct ArtifactScanner {
    account: String,
    root: PathBuf,
}

impl ArtifactScanner {
    pub fn new(account: impl Into<String>, root: PathBuf) -> Self {
        Self {
            account: account.into(),
            root,
        }
    }

    /// Enumerate the current set of artifact folders.
    ///
    /// A missing root yields an empty result rather than an error: a sync
    /// backend may simply not have created it yet.
    pub fn scan(&self) -> ScanResult {
        let mut result = ScanResult::default();

        if !self.root.exists() {
            warn!(root = %self.root.display(), "artifact root does not exist, skipping scan");
            return result;
        }

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                result.errors.push(ScanFailure {
                    path: self.root.clone(),
                    message: format!("read_dir failed: {e}"),
                });
                return result;
            }
        };

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_dir() && !Self::is_hidden(&path) {
                        dirs.push(path);
                    }
                }
                Err(e) => {
                    result.errors.push(ScanFailure {
                        path: self.root.clone(),
                        message: format!("unreadable entry: {e}"),
                    });
                }
            }
        }
        dirs.sort();

        for dir in dirs {
            match self.read_folder(&dir) {
                Ok(folder) => result.folders.push(folder),
                Err(message) => {
                    warn!(folder = %dir.display(), %message, "excluding folder from scan");
                    result.errors.push(ScanFailure { path: dir, message });
                }
            }
        }

        result
    }

    fn read_folder(&self, dir: &Path) -> Result<ArtifactFolder, String> {
        let entries = std::fs::read_dir(dir).map_err(|e| format!("read_dir failed: {e}"))?;

        let mut source_files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("unreadable entry: {e}"))?;
            let path = entry.path();
            if path.is_file() && Self::is_video(&path) {
                source_files.push(path);
            }
        }
        source_files.sort();

        let metadata = std::fs::metadata(dir).ok();
        let created_at = metadata
            .as_ref()
            .and_then(|m| m.created().ok())
            .map(DateTime::<Utc>::from);
        let modified_at = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        let display_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.display().to_string());

        Ok(ArtifactFolder {
            account: self.account.clone(),
            path: dir.to_path_buf(),
            display_name,
            created_at,
            modified_at,
            source_files,
        })
    }

    fn is_video(path: &Path) -> bool {
        let is_derived = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.ends_with(DERIVED_SUFFIX))
            .unwrap_or(false);
        if is_derived {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
    }
}
