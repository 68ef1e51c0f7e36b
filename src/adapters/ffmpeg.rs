//! ffmpeg transcoder adapter.
//!
//! Spawns the `ffmpeg` binary for compression and audio extraction. Runs are
//! bounded by a process-wide semaphore (so parallel account cycles cannot
//! fork unbounded encoders) and by a wall-clock timeout; a stalled process is
//! killed and the stage fails `Transient`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

use crate::core::error::StageError;

use super::{QualityProfile, Transcoder};

/// Suffix appended to compressed output files
const COMPRESSED_SUFFIX: &str = "_compressed";

/// ffmpeg subprocess transcoder
pub struct FfmpegTranscoder {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    binary_path: String,

    /// Bounds concurrent ffmpeg processes across all accounts
    slots: Arc<Semaphore>,

    /// Per-invocation wall-clock limit
    run_timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(max_concurrent: usize, run_timeout: Duration) -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            run_timeout,
        }
    }

    /// Use a custom ffmpeg binary path
    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }

    /// `-crf`/`-preset` pair for a quality profile
    fn video_args(profile: QualityProfile) -> [&'static str; 4] {
        match profile {
            QualityProfile::Low => ["-crf", "28", "-preset", "fast"],
            QualityProfile::Medium => ["-crf", "23", "-preset", "medium"],
            QualityProfile::High => ["-crf", "18", "-preset", "slow"],
        }
    }

    /// Reject unusable inputs before spawning anything
    fn check_input(path: &Path) -> Result<(), StageError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| StageError::from_io(&format!("stat {}", path.display()), e))?;

        if metadata.len() == 0 {
            return Err(StageError::InputInvalid(format!(
                "zero-length media: {}",
                path.display()
            )));
        }

        Ok(())
    }

    async fn run(&self, args: &[&str], output: &Path) -> Result<(), StageError> {
        let _permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StageError::Transient("transcoder pool closed".to_string()))?;

        debug!(binary = %self.binary_path, ?args, "spawning ffmpeg");

        let child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StageError::ExternalUnavailable(format!("failed to spawn ffmpeg: {e}"))
            })?;

        let result = match timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                // kill_on_drop reaps the stalled process
                return Err(StageError::Transient(format!(
                    "ffmpeg timed out after {:?}",
                    self.run_timeout
                )));
            }
        };

        let out = result.map_err(|e| StageError::Transient(format!("ffmpeg wait failed: {e}")))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let exit_code = out.status.code().unwrap_or(-1);
            return Err(StageError::Transient(format!(
                "ffmpeg exited with code {}: {}",
                exit_code,
                stderr.trim().lines().last().unwrap_or("")
            )));
        }

        // ffmpeg can exit 0 and still produce nothing on malformed input
        match std::fs::metadata(output) {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(StageError::InputInvalid(format!(
                "ffmpeg produced no output for {}",
                output.display()
            ))),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn compress(
        &self,
        video: &Path,
        profile: QualityProfile,
    ) -> Result<PathBuf, StageError> {
        Self::check_input(video)?;

        let output = compressed_path(video);
        let quality = Self::video_args(profile);

        let input = video.display().to_string();
        let out = output.display().to_string();
        let mut args: Vec<&str> = vec!["-y", "-i", &input, "-c:v", "libx264"];
        args.extend_from_slice(&quality);
        args.extend_from_slice(&["-c:a", "aac", "-b:a", "128k", &out]);

        self.run(&args, &output).await?;
        Ok(output)
    }

    async fn extract_audio(&self, video: &Path, format: &str) -> Result<PathBuf, StageError> {
        Self::check_input(video)?;

        let output = video.with_extension(format);

        let input = video.display().to_string();
        let out = output.display().to_string();
        let args = [
            "-y", "-i", &input, "-vn", "-ab", "128k", "-ar", "44100", &out,
        ];

        self.run(&args, &output).await?;
        Ok(output)
    }
}

/// Output path for a compressed video (`rec.mp4` → `rec_compressed.mp4`)
fn compressed_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = video
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());

    video.with_file_name(format!("{stem}{COMPRESSED_SUFFIX}.{ext}"))
}
