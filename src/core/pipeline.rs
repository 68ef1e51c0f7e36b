//! The stage pipeline: ordered actions per artifact, skip-vs-run decisions,
//! and derived folder status.
//!
//! Each stage takes the fingerprint of its required input (the prior stage's
//! output, or the source files for the first stage). An active success record
//! at that exact fingerprint skips the action; anything else runs it through
//! the retry executor and records the outcome. A failed stage halts later
//! stages for that artifact this cycle; completed stages are never undone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::adapters::{NotesStore, QualityProfile, Summarizer, Transcoder, TranscriptionEngine};
use crate::domain::{
    ArtifactFolder, ArtifactOutcome, FolderStatus, SnapshotBuilder, Stage, StageOutcome,
    StageRecord,
};

use super::cache::ContentCache;
use super::error::StageError;
use super::fingerprint::{fingerprint_file, fingerprint_sources};
use super::retry::RetryExecutor;

/// File name for the transcript written into the artifact folder
const TRANSCRIPT_FILE: &str = "transcript.md";

/// File name for the summary written into the artifact folder
const SUMMARY_FILE: &str = "summary.md";

/// Knobs the stage actions need
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Compression quality profile
    pub quality: QualityProfile,

    /// Audio container format for extraction (e.g. "mp3")
    pub audio_format: String,

    /// Transcription language hint
    pub language: String,

    /// Summarizer model profile
    pub model_profile: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quality: QualityProfile::Medium,
            audio_format: "mp3".to_string(),
            language: "en".to_string(),
            model_profile: "gpt-4o-mini".to_string(),
        }
    }
}

/// Drives the fixed stage chain for artifact folders
pub struct StagePipeline {
    cache: Arc<ContentCache>,
    retry: RetryExecutor,
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn TranscriptionEngine>,
    summarizer: Arc<dyn Summarizer>,
    notes: Arc<dyn NotesStore>,
    settings: PipelineSettings,
}

impl StagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<ContentCache>,
        retry: RetryExecutor,
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn TranscriptionEngine>,
        summarizer: Arc<dyn Summarizer>,
        notes: Arc<dyn NotesStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache,
            retry,
            transcoder,
            transcriber,
            summarizer,
            notes,
            settings,
        }
    }

    /// Shared cache handle (for status derivation outside a cycle)
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Derived overall status of a folder, a pure function of its active
    /// stage records
    pub async fn folder_status(&self, folder: &ArtifactFolder) -> FolderStatus {
        let completed = self.cache.completed_stages(&folder.key()).await;
        FolderStatus::from_progress(completed)
    }

    /// Fast-cycle pass: fingerprint the sources and record discovery.
    ///
    /// Folders without source files are not errors; the meeting simply has no
    /// recording yet.
    pub async fn discover(
        &self,
        folder: &ArtifactFolder,
        builder: &mut SnapshotBuilder,
    ) -> Result<(), StageError> {
        if folder.source_files.is_empty() {
            debug!(folder = %folder.display_name, "no source files yet");
            return Ok(());
        }

        let fingerprint = fingerprint_sources(&folder.source_files)?;
        let key = folder.key();

        if let Some(record) = self.cache.lookup(&key, Stage::Discovered, &fingerprint).await {
            if record.outcome == StageOutcome::Success {
                builder.record_skipped(Stage::Discovered);
                return Ok(());
            }
        }

        self.cache
            .record(StageRecord::success(
                key,
                Stage::Discovered,
                fingerprint,
                None,
            ))
            .await
            .map_err(|e| StageError::Transient(format!("cache write failed: {e}")))?;

        builder.record_succeeded(Stage::Discovered);
        info!(folder = %folder.display_name, "discovered new input version");
        Ok(())
    }

    /// Slow-cycle pass: the full stage chain for one folder.
    ///
    /// Only `ExternalUnavailable` escapes (the account cycle must abort);
    /// every other failure is recorded into the builder and absorbed.
    pub async fn process(
        &self,
        folder: &ArtifactFolder,
        builder: &mut SnapshotBuilder,
    ) -> Result<(), StageError> {
        let key = folder.key();

        if folder.source_files.is_empty() {
            self.push_outcome(folder, builder, None).await;
            return Ok(());
        }

        // Stage 1 input version: content of the source set
        let source_fp = match fingerprint_sources(&folder.source_files) {
            Ok(fp) => fp,
            Err(e) => {
                builder.record_error(Some(Stage::Discovered), &key, e.kind(), e.to_string());
                self.push_outcome(folder, builder, Some(Stage::Discovered)).await;
                return Ok(());
            }
        };

        if let Err(e) = self.discover(folder, builder).await {
            builder.record_error(Some(Stage::Discovered), &key, e.kind(), e.to_string());
            self.push_outcome(folder, builder, Some(Stage::Discovered)).await;
            return Ok(());
        }

        let mut fingerprint = source_fp;
        // Path of the previous stage's output, input to the next action
        let mut carry: PathBuf = match folder.primary_source() {
            Some(path) => path.clone(),
            None => {
                self.push_outcome(folder, builder, None).await;
                return Ok(());
            }
        };
        let mut failed_stage = None;

        for stage in Stage::ACTIONS {
            // Skip on an active success for this exact input version, as long
            // as the recorded output is still usable
            if let Some(record) = self.cache.lookup(&key, stage, &fingerprint).await {
                if record.outcome == StageOutcome::Success {
                    if let Some(next) = self.reuse_output(stage, &record) {
                        debug!(folder = %folder.display_name, %stage, "cache hit, skipping");
                        builder.record_skipped(stage);
                        if let ReusedOutput::File(path, fp) = next {
                            carry = path;
                            fingerprint = fp;
                        }
                        continue;
                    }
                    warn!(folder = %folder.display_name, %stage, "cached output missing, re-running");
                }
            }

            let started = Instant::now();
            let result = self.run_action(stage, folder, &carry).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    let descriptor = output.descriptor();
                    self.cache
                        .record(
                            StageRecord::success(
                                key.clone(),
                                stage,
                                fingerprint.clone(),
                                Some(descriptor),
                            )
                            .with_duration(duration_ms),
                        )
                        .await
                        .map_err(|e| StageError::Transient(format!("cache write failed: {e}")))?;

                    builder.record_succeeded(stage);
                    info!(folder = %folder.display_name, %stage, duration_ms, "stage completed");

                    match output {
                        ActionOutput::File(path) => {
                            fingerprint = fingerprint_file(&path)?;
                            carry = path;
                        }
                        ActionOutput::PageId(_) => {}
                    }
                }
                Err(e) => {
                    self.cache
                        .record(
                            StageRecord::failure(
                                key.clone(),
                                stage,
                                fingerprint.clone(),
                                e.to_string(),
                            )
                            .with_duration(duration_ms),
                        )
                        .await
                        .map_err(|e| StageError::Transient(format!("cache write failed: {e}")))?;

                    builder.record_failed(stage);
                    builder.record_error(Some(stage), &key, e.kind(), e.to_string());
                    warn!(folder = %folder.display_name, %stage, error = %e, "stage failed");

                    failed_stage = Some(stage);
                    self.push_outcome(folder, builder, failed_stage).await;

                    if matches!(e, StageError::ExternalUnavailable(_)) {
                        return Err(e);
                    }
                    return Ok(());
                }
            }
        }

        self.push_outcome(folder, builder, failed_stage).await;
        Ok(())
    }

    /// Validate a cached record's output and derive the next stage's input
    fn reuse_output(&self, stage: Stage, record: &StageRecord) -> Option<ReusedOutput> {
        let descriptor = record.output.as_deref()?;

        if stage == Stage::Synced {
            // Terminal stage; a non-empty page id is all we need
            if descriptor.is_empty() {
                return None;
            }
            return Some(ReusedOutput::Terminal);
        }

        let path = PathBuf::from(descriptor);
        match fingerprint_file(&path) {
            Ok(fp) => Some(ReusedOutput::File(path, fp)),
            Err(_) => None,
        }
    }

    /// Execute one stage action through the retry executor
    async fn run_action(
        &self,
        stage: Stage,
        folder: &ArtifactFolder,
        input: &Path,
    ) -> Result<ActionOutput, StageError> {
        let label = format!("{}:{}", folder.display_name, stage);

        match stage {
            Stage::Discovered => unreachable!("discovery is not an action stage"),

            Stage::VideoCompressed => {
                let quality = self.settings.quality;
                let output = self
                    .retry
                    .execute(&label, || self.transcoder.compress(input, quality))
                    .await?;
                Ok(ActionOutput::File(output))
            }

            Stage::AudioExtracted => {
                let format = self.settings.audio_format.clone();
                let output = self
                    .retry
                    .execute(&label, || self.transcoder.extract_audio(input, &format))
                    .await?;
                Ok(ActionOutput::File(output))
            }

            Stage::Transcribed => {
                let language = self.settings.language.clone();
                let text = self
                    .retry
                    .execute(&label, || self.transcriber.transcribe(input, &language))
                    .await?;

                let path = folder.path.join(TRANSCRIPT_FILE);
                std::fs::write(&path, &text)
                    .map_err(|e| StageError::from_io("write transcript", e))?;
                Ok(ActionOutput::File(path))
            }

            Stage::Summarized => {
                let transcript = std::fs::read_to_string(input)
                    .map_err(|e| StageError::from_io("read transcript", e))?;
                let profile = self.settings.model_profile.clone();
                let text = self
                    .retry
                    .execute(&label, || self.summarizer.summarize(&transcript, &profile))
                    .await?;

                let path = folder.path.join(SUMMARY_FILE);
                std::fs::write(&path, &text)
                    .map_err(|e| StageError::from_io("write summary", e))?;
                Ok(ActionOutput::File(path))
            }

            Stage::Synced => {
                let summary = std::fs::read_to_string(input)
                    .map_err(|e| StageError::from_io("read summary", e))?;
                let key = folder.key();
                let title = folder.display_name.clone();
                let page_id = self
                    .retry
                    .execute(&label, || self.notes.upsert_page(&key, &title, &summary))
                    .await?;
                Ok(ActionOutput::PageId(page_id))
            }
        }
    }

    async fn push_outcome(
        &self,
        folder: &ArtifactFolder,
        builder: &mut SnapshotBuilder,
        failed_stage: Option<Stage>,
    ) {
        let status = self.folder_status(folder).await;
        builder.record_artifact(ArtifactOutcome {
            artifact: folder.key(),
            display_name: folder.display_name.clone(),
            status,
            failed_stage,
        });
    }
}

/// Output of one stage action
enum ActionOutput {
    /// A file on disk (compressed video, audio, transcript, summary)
    File(PathBuf),

    /// The notes page id from the sync stage
    PageId(String),
}

impl ActionOutput {
    fn descriptor(&self) -> String {
        match self {
            ActionOutput::File(path) => path.display().to_string(),
            ActionOutput::PageId(id) => id.clone(),
        }
    }
}

/// Cached output revalidated for reuse
enum ReusedOutput {
    /// Output file with its current fingerprint (next stage's input version)
    File(PathBuf, String),

    /// Terminal stage output; nothing to carry forward
    Terminal,
}
