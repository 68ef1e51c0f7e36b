//! Shared test doubles and wiring for integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use meetflow::adapters::{
    NotesStore, Notifier, QualityProfile, Summarizer, Transcoder, TranscriptionEngine,
};
use meetflow::core::{
    ArtifactScanner, ContentCache, CycleRunner, PipelineSettings, RetryExecutor, RetryPolicy,
    SnapshotStore, StageError, StagePipeline,
};

/// How a scripted adapter should fail
#[derive(Debug, Clone, Copy)]
pub enum FailMode {
    Transient,
    InputInvalid,
    Unavailable,
}

impl FailMode {
    pub fn error(self, message: &str) -> StageError {
        match self {
            FailMode::Transient => StageError::Transient(message.to_string()),
            FailMode::InputInvalid => StageError::InputInvalid(message.to_string()),
            FailMode::Unavailable => StageError::ExternalUnavailable(message.to_string()),
        }
    }
}

/// Failure script keyed on a substring of the input descriptor
type Script = Mutex<Option<(String, FailMode)>>;

fn scripted_failure(script: &Script, descriptor: &str, what: &str) -> Result<(), StageError> {
    if let Some((needle, mode)) = script.lock().unwrap().as_ref() {
        if descriptor.contains(needle.as_str()) {
            return Err(mode.error(&format!("scripted {what} failure")));
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct MockTranscoder {
    pub compress_calls: AtomicU32,
    pub extract_calls: AtomicU32,
    pub fail_compress: Script,
}

impl MockTranscoder {
    pub fn fail_compress_for(&self, needle: &str, mode: FailMode) {
        *self.fail_compress.lock().unwrap() = Some((needle.to_string(), mode));
    }

    pub fn clear_failures(&self) {
        *self.fail_compress.lock().unwrap() = None;
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn compress(
        &self,
        video: &Path,
        _profile: QualityProfile,
    ) -> Result<PathBuf, StageError> {
        self.compress_calls.fetch_add(1, Ordering::SeqCst);
        scripted_failure(&self.fail_compress, &video.display().to_string(), "compress")?;

        let stem = video.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
        let out = video.with_file_name(format!("{stem}_compressed.mp4"));
        let bytes = std::fs::read(video).unwrap();
        std::fs::write(&out, [b"compressed:".as_ref(), &bytes].concat()).unwrap();
        Ok(out)
    }

    async fn extract_audio(&self, video: &Path, format: &str) -> Result<PathBuf, StageError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let out = video.with_extension(format);
        let bytes = std::fs::read(video).unwrap();
        std::fs::write(&out, [b"audio:".as_ref(), &bytes].concat()).unwrap();
        Ok(out)
    }
}

#[derive(Default)]
pub struct MockTranscriber {
    pub calls: AtomicU32,
    pub fail_for: Script,
}

impl MockTranscriber {
    pub fn fail_for(&self, needle: &str, mode: FailMode) {
        *self.fail_for.lock().unwrap() = Some((needle.to_string(), mode));
    }

    pub fn clear_failures(&self) {
        *self.fail_for.lock().unwrap() = None;
    }
}

#[async_trait]
impl TranscriptionEngine for MockTranscriber {
    async fn transcribe(&self, audio: &Path, _language: &str) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        scripted_failure(&self.fail_for, &audio.display().to_string(), "transcribe")?;

        // Derive the transcript from the audio bytes so changed media
        // propagates down the chain
        let bytes = std::fs::read(audio).unwrap();
        Ok(format!("transcript::{}", String::from_utf8_lossy(&bytes)))
    }
}

#[derive(Default)]
pub struct MockSummarizer {
    pub calls: AtomicU32,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, transcript: &str, _model_profile: &str) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("summary::{transcript}"))
    }
}

#[derive(Default)]
pub struct MockNotes {
    pub calls: AtomicU32,
    pub upserted_keys: Mutex<Vec<String>>,
    pub fail_for: Script,
}

impl MockNotes {
    pub fn fail_for(&self, needle: &str, mode: FailMode) {
        *self.fail_for.lock().unwrap() = Some((needle.to_string(), mode));
    }
}

#[async_trait]
impl NotesStore for MockNotes {
    async fn upsert_page(
        &self,
        external_key: &str,
        _title: &str,
        _content: &str,
    ) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        scripted_failure(&self.fail_for, external_key, "upsert")?;

        self.upserted_keys
            .lock()
            .unwrap()
            .push(external_key.to_string());
        Ok(format!("page-{external_key}"))
    }
}

#[derive(Default)]
pub struct CapturingNotifier {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Runners for one or more accounts wired over a single shared pipeline and
/// one set of mock adapters, like the real service
pub struct Harness {
    pub temp: TempDir,
    pub runners: Vec<CycleRunner>,
    pub transcoder: Arc<MockTranscoder>,
    pub transcriber: Arc<MockTranscriber>,
    pub summarizer: Arc<MockSummarizer>,
    pub notes: Arc<MockNotes>,
    pub notifier: Arc<CapturingNotifier>,
}

impl Harness {
    /// The single runner of a one-account harness
    pub fn runner(&self) -> &CycleRunner {
        &self.runners[0]
    }

    /// The runner for a named account
    pub fn runner_for(&self, account: &str) -> &CycleRunner {
        self.runners
            .iter()
            .find(|r| r.account() == account)
            .unwrap()
    }

    /// Create a meeting folder with one source recording
    pub fn make_meeting(&self, account: &str, name: &str, content: &[u8]) -> PathBuf {
        let dir = self.temp.path().join(account).join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("recording.mp4"), content).unwrap();
        dir
    }

    /// Sum of all external adapter calls
    pub fn total_adapter_calls(&self) -> u32 {
        self.transcoder.compress_calls.load(Ordering::SeqCst)
            + self.transcoder.extract_calls.load(Ordering::SeqCst)
            + self.transcriber.calls.load(Ordering::SeqCst)
            + self.summarizer.calls.load(Ordering::SeqCst)
            + self.notes.calls.load(Ordering::SeqCst)
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 2.0,
    }
}

/// Wire one runner for `account` over a fresh temp directory
pub async fn harness(account: &str) -> Harness {
    multi_harness(&[account]).await
}

/// Wire one runner per account, all sharing the same cache, snapshot store,
/// and adapters
pub async fn multi_harness(accounts: &[&str]) -> Harness {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state");

    let cache = Arc::new(
        ContentCache::open(state.join("records.jsonl"))
            .await
            .unwrap(),
    );
    let snapshots = Arc::new(SnapshotStore::open(state.join("snapshots")).await.unwrap());

    let transcoder = Arc::new(MockTranscoder::default());
    let transcriber = Arc::new(MockTranscriber::default());
    let summarizer = Arc::new(MockSummarizer::default());
    let notes = Arc::new(MockNotes::default());
    let notifier = Arc::new(CapturingNotifier::default());

    let pipeline = Arc::new(StagePipeline::new(
        cache,
        RetryExecutor::new(fast_retry()),
        transcoder.clone(),
        transcriber.clone(),
        summarizer.clone(),
        notes.clone(),
        PipelineSettings::default(),
    ));

    let runners = accounts
        .iter()
        .map(|account| {
            let scanner = ArtifactScanner::new(*account, temp.path().join(account));
            CycleRunner::new(*account, scanner, pipeline.clone(), snapshots.clone())
                .with_notifier(notifier.clone())
        })
        .collect();

    Harness {
        temp,
        runners,
        transcoder,
        transcriber,
        summarizer,
        notes,
        notifier,
    }
}
