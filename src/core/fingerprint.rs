//! Content fingerprints for cache keys.
//!
//! Fingerprints are derived from bytes only, never from names or mtimes: a
//! file copied or re-timestamped without a content change keeps its
//! fingerprint, while a re-recorded file gets a new one. This is the property
//! the whole skip-vs-run decision rests on.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::StageError;

/// Hex length of a fingerprint (first 8 bytes of SHA-256)
const FINGERPRINT_LEN: usize = 16;

/// Fingerprint a string (transcripts, summaries)
pub fn fingerprint_text(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(&hasher.finalize()[..FINGERPRINT_LEN / 2])
}

/// Fingerprint a file's content, streaming to avoid loading media into memory
pub fn fingerprint_file(path: &Path) -> Result<String, StageError> {
    let file = std::fs::File::open(path)
        .map_err(|e| StageError::from_io(&format!("open {}", path.display()), e))?;

    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| StageError::from_io(&format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(&hasher.finalize()[..FINGERPRINT_LEN / 2]))
}

/// Fingerprint a set of source files as one input version.
///
/// Per-file content hashes are sorted before combining, so the result is
/// independent of file names, paths, and enumeration order.
pub fn fingerprint_sources(paths: &[PathBuf]) -> Result<String, StageError> {
    if paths.is_empty() {
        return Err(StageError::InputInvalid("no source files".to_string()));
    }

    let mut hashes = Vec::with_capacity(paths.len());
    for path in paths {
        hashes.push(fingerprint_file(path)?);
    }
    hashes.sort();

    Ok(fingerprint_text(&hashes.join("\n")))
}
