//! Collaborator interfaces for external systems.
//!
//! The orchestration core only sees these narrow contracts: input descriptor
//! in, output descriptor or a classified `StageError` out. Concrete wire
//! protocols live in the per-adapter modules and are replaceable without
//! touching the core.

pub mod ffmpeg;
pub mod notion;
pub mod summarizer;
pub mod telegram;
pub mod whisper;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::StageError;

pub use ffmpeg::FfmpegTranscoder;
pub use notion::NotionClient;
pub use summarizer::HttpSummarizer;
pub use telegram::TelegramNotifier;
pub use whisper::WhisperEngine;

/// Compression quality profile for the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityProfile {
    /// Smallest output, fastest encode
    Low,

    /// Balanced default
    Medium,

    /// Near-source quality
    High,
}

impl Default for QualityProfile {
    fn default() -> Self {
        Self::Medium
    }
}

/// A calendar event, the minimal shape the core needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Provider-assigned event id
    pub id: String,

    /// Event title
    pub title: String,

    /// Start time
    pub start: DateTime<Utc>,

    /// End time
    pub end: DateTime<Utc>,

    /// Attendee addresses
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Calendar data source for an account
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List events within `window` of now
    async fn list_events(
        &self,
        account: &str,
        window: Duration,
    ) -> Result<Vec<CalendarEvent>, StageError>;
}

/// Video transcoding (compression and audio extraction)
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Compress a video with the given quality profile; returns the output path
    async fn compress(
        &self,
        video: &Path,
        profile: QualityProfile,
    ) -> Result<PathBuf, StageError>;

    /// Extract the audio track into the given container format (e.g. "mp3")
    async fn extract_audio(&self, video: &Path, format: &str) -> Result<PathBuf, StageError>;
}

/// Speech-to-text engine
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe an audio file; returns the transcript text
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<String, StageError>;
}

/// Transcript summarization
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a transcript with the given model profile
    async fn summarize(&self, transcript: &str, model_profile: &str) -> Result<String, StageError>;
}

/// Notes store (page upsert keyed by the artifact identity).
///
/// `upsert_page` MUST be idempotent in `external_key`: retries after a
/// transient failure may re-submit the same key and must not create
/// duplicate pages.
#[async_trait]
pub trait NotesStore: Send + Sync {
    /// Create or update the page for `external_key`; returns the page id
    async fn upsert_page(
        &self,
        external_key: &str,
        title: &str,
        content: &str,
    ) -> Result<String, StageError>;
}

/// Chat notifier, fire-and-forget from the core's perspective
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification message; failures are logged by the caller, never fatal
    async fn send(&self, message: &str) -> Result<()>;
}
