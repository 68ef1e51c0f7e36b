//! Whisper transcription adapter.
//!
//! Runs the `whisper` CLI against an audio file and reads the transcript it
//! writes next to the input. A missing binary is `ExternalUnavailable` (the
//! whole account cycle should stop rather than fail every artifact one by
//! one); a stalled run is killed and reported `Transient`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::error::StageError;

use super::TranscriptionEngine;

/// Whisper CLI subprocess engine
pub struct WhisperEngine {
    /// Path to the whisper binary (default: "whisper")
    binary_path: String,

    /// Model name passed to `--model`
    model: String,

    /// Per-invocation wall-clock limit
    run_timeout: Duration,
}

impl WhisperEngine {
    pub fn new(model: impl Into<String>, run_timeout: Duration) -> Self {
        Self {
            binary_path: "whisper".to_string(),
            model: model.into(),
            run_timeout,
        }
    }

    /// Use a custom whisper binary path
    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperEngine {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<String, StageError> {
        let metadata = std::fs::metadata(audio)
            .map_err(|e| StageError::from_io(&format!("stat {}", audio.display()), e))?;
        if metadata.len() == 0 {
            return Err(StageError::InputInvalid(format!(
                "zero-length audio: {}",
                audio.display()
            )));
        }

        let output_dir = audio.parent().unwrap_or(Path::new("."));

        debug!(audio = %audio.display(), model = %self.model, "spawning whisper");

        let child = Command::new(&self.binary_path)
            .arg(audio)
            .args(["--model", &self.model])
            .args(["--language", language])
            .args(["--output_format", "txt"])
            .args(["--output_dir", &output_dir.display().to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StageError::ExternalUnavailable(format!("failed to spawn whisper: {e}"))
            })?;

        let out = match timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| StageError::Transient(format!("whisper wait failed: {e}")))?,
            Err(_) => {
                return Err(StageError::Transient(format!(
                    "whisper timed out after {:?}",
                    self.run_timeout
                )));
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(StageError::Transient(format!(
                "whisper exited with code {}: {}",
                out.status.code().unwrap_or(-1),
                stderr.trim().lines().last().unwrap_or("")
            )));
        }

        // whisper writes `<stem>.txt` into the output directory
        let transcript_path = output_dir.join(
            audio
                .with_extension("txt")
                .file_name()
                .map(|n| n.to_owned())
                .unwrap_or_default(),
        );

        let text = std::fs::read_to_string(&transcript_path).map_err(|e| {
            StageError::Transient(format!(
                "whisper produced no transcript at {}: {e}",
                transcript_path.display()
            ))
        })?;

        if text.trim().is_empty() {
            return Err(StageError::InputInvalid(format!(
                "empty transcript for {}",
                audio.display()
            )));
        }

        Ok(text)
    }
}
