//! One cycle for one account, end to end.
//!
//! The runner scans the account root, drives either the fast pass (discovery
//! and calendar display-name refresh) or the slow pass (the full stage
//! chain), finalizes exactly one snapshot, diffs it against the previous
//! snapshot of the same kind, and notifies when the diff is actionable. A
//! failed notification is logged and never fails the cycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{CalendarProvider, Notifier};
use crate::domain::{ArtifactFolder, CycleKind, CycleSnapshot, SnapshotBuilder};

use super::diff::{ChangeDetector, ChangeReport};
use super::error::{ErrorKind, StageError};
use super::pipeline::StagePipeline;
use super::scanner::ArtifactScanner;
use super::snapshot_store::SnapshotStore;

/// Calendar lookback window for display-name matching
const CALENDAR_WINDOW_HOURS: i64 = 48;

/// Maximum gap between folder creation and event start to consider a match
const CALENDAR_MATCH_SLACK_MINUTES: i64 = 30;

/// Runs cycles for a single account
pub struct CycleRunner {
    account: String,
    scanner: ArtifactScanner,
    pipeline: Arc<StagePipeline>,
    snapshots: Arc<SnapshotStore>,
    detector: ChangeDetector,
    notifier: Option<Arc<dyn Notifier>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
}

impl CycleRunner {
    pub fn new(
        account: impl Into<String>,
        scanner: ArtifactScanner,
        pipeline: Arc<StagePipeline>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            account: account.into(),
            scanner,
            pipeline,
            snapshots,
            detector: ChangeDetector::new(),
            notifier: None,
            calendar: None,
        }
    }

    /// Attach a notifier for actionable change reports
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach a calendar provider for display-name refresh
    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Run one cycle: scan, process, snapshot, diff, notify.
    ///
    /// Returns the appended snapshot together with its change report.
    #[instrument(skip(self), fields(account = %self.account, %kind))]
    pub async fn run_cycle(&self, kind: CycleKind) -> Result<(CycleSnapshot, ChangeReport)> {
        let cycle_id = self
            .snapshots
            .next_cycle_id(&self.account)
            .await
            .context("failed to derive next cycle id")?;

        info!(cycle_id, "cycle starting");
        let mut builder = SnapshotBuilder::new(cycle_id, &self.account, kind);

        let scan = self.scanner.scan();
        for failure in &scan.errors {
            builder.record_error(
                None,
                failure.path.display().to_string(),
                ErrorKind::Scan,
                &failure.message,
            );
        }

        let mut folders = scan.folders;
        match kind {
            CycleKind::Fast => {
                self.refresh_display_names(&mut folders).await;
                self.run_fast(&folders, &mut builder).await;
            }
            CycleKind::Slow => {
                self.run_slow(&folders, &mut builder).await;
            }
        }

        let snapshot = builder.finish();
        let previous = self
            .snapshots
            .latest(&self.account, kind)
            .await
            .context("failed to load previous snapshot")?;

        self.snapshots
            .append(&snapshot)
            .await
            .context("failed to append snapshot")?;

        let report = self.detector.diff(previous.as_ref(), &snapshot);
        info!(
            cycle_id,
            succeeded = snapshot.total_succeeded(),
            failed = snapshot.total_failed(),
            actionable = report.has_actionable_change(),
            "cycle finished"
        );

        if report.has_actionable_change() {
            self.notify(&report).await;
        }

        Ok((snapshot, report))
    }

    /// Fast pass: fingerprint sources, record discovery, capture statuses
    async fn run_fast(&self, folders: &[ArtifactFolder], builder: &mut SnapshotBuilder) {
        for folder in folders {
            if let Err(e) = self.pipeline.discover(folder, builder).await {
                builder.record_error(None, folder.key(), e.kind(), e.to_string());
                warn!(folder = %folder.display_name, error = %e, "discovery failed");
            }
            let status = self.pipeline.folder_status(folder).await;
            builder.record_artifact(crate::domain::ArtifactOutcome {
                artifact: folder.key(),
                display_name: folder.display_name.clone(),
                status,
                failed_stage: None,
            });
        }
    }

    /// Slow pass: the full chain per folder; an unavailable collaborator
    /// aborts the rest of the account's folders this cycle
    async fn run_slow(&self, folders: &[ArtifactFolder], builder: &mut SnapshotBuilder) {
        for folder in folders {
            match self.pipeline.process(folder, builder).await {
                Ok(()) => {}
                Err(StageError::ExternalUnavailable(reason)) => {
                    warn!(
                        account = %self.account,
                        %reason,
                        "collaborator unavailable, aborting remaining folders this cycle"
                    );
                    break;
                }
                Err(e) => {
                    builder.record_error(None, folder.key(), e.kind(), e.to_string());
                    warn!(folder = %folder.display_name, error = %e, "folder processing failed");
                }
            }
        }
    }

    /// Replace bare folder names with matching calendar event titles.
    ///
    /// Best effort: a calendar failure is logged and the cycle proceeds with
    /// filesystem names.
    async fn refresh_display_names(&self, folders: &mut [ArtifactFolder]) {
        let Some(calendar) = &self.calendar else {
            return;
        };

        let events = match calendar
            .list_events(&self.account, Duration::hours(CALENDAR_WINDOW_HOURS))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(account = %self.account, error = %e, "calendar refresh failed");
                return;
            }
        };

        for folder in folders.iter_mut() {
            let Some(created_at) = folder.created_at else {
                continue;
            };

            let matched = events.iter().find(|event| {
                (event.start - created_at)
                    .num_minutes()
                    .abs()
                    <= CALENDAR_MATCH_SLACK_MINUTES
            });

            if let Some(event) = matched {
                if folder.display_name != event.title {
                    debug!(
                        folder = %folder.display_name,
                        title = %event.title,
                        "display name refreshed from calendar"
                    );
                    folder.display_name = event.title.clone();
                }
            }
        }
    }

    async fn notify(&self, report: &ChangeReport) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        if let Err(e) = notifier.send(&report.render()).await {
            warn!(account = %self.account, error = %e, "notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CalendarEvent;
    use crate::core::cache::ContentCache;
    use crate::core::pipeline::{PipelineSettings, StagePipeline};
    use crate::core::retry::{RetryExecutor, RetryPolicy};
    use crate::domain::Stage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct NoopTranscoder;

    #[async_trait]
    impl crate::adapters::Transcoder for NoopTranscoder {
        async fn compress(
            &self,
            video: &Path,
            _profile: crate::adapters::QualityProfile,
        ) -> Result<PathBuf, StageError> {
            let stem = video
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("out");
            let out = video.with_file_name(format!("{stem}_compressed.mp4"));
            let bytes = std::fs::read(video).unwrap();
            std::fs::write(&out, [b"compressed:".as_ref(), &bytes].concat()).unwrap();
            Ok(out)
        }

        async fn extract_audio(&self, video: &Path, format: &str) -> Result<PathBuf, StageError> {
            let out = video.with_extension(format);
            let bytes = std::fs::read(video).unwrap();
            std::fs::write(&out, [b"audio:".as_ref(), &bytes].concat()).unwrap();
            Ok(out)
        }
    }

    struct CannedTranscriber;

    #[async_trait]
    impl crate::adapters::TranscriptionEngine for CannedTranscriber {
        async fn transcribe(&self, _audio: &Path, _language: &str) -> Result<String, StageError> {
            Ok("the transcript".to_string())
        }
    }

    struct CannedSummarizer;

    #[async_trait]
    impl crate::adapters::Summarizer for CannedSummarizer {
        async fn summarize(
            &self,
            _transcript: &str,
            _model_profile: &str,
        ) -> Result<String, StageError> {
            Ok("the summary".to_string())
        }
    }

    struct CannedNotes;

    #[async_trait]
    impl crate::adapters::NotesStore for CannedNotes {
        async fn upsert_page(
            &self,
            _external_key: &str,
            _title: &str,
            _content: &str,
        ) -> Result<String, StageError> {
            Ok("page-1".to_string())
        }
    }

    struct FixedCalendar {
        events: Vec<CalendarEvent>,
    }

    #[async_trait]
    impl CalendarProvider for FixedCalendar {
        async fn list_events(
            &self,
            _account: &str,
            _window: Duration,
        ) -> Result<Vec<CalendarEvent>, StageError> {
            Ok(self.events.clone())
        }
    }

    async fn make_runner(temp: &TempDir, account: &str) -> CycleRunner {
        let state = temp.path().join("state");
        let cache = Arc::new(
            ContentCache::open(state.join("records.jsonl")).await.unwrap(),
        );
        let pipeline = Arc::new(StagePipeline::new(
            cache,
            RetryExecutor::new(RetryPolicy {
                initial_delay_ms: 1,
                max_delay_ms: 2,
                ..Default::default()
            }),
            Arc::new(NoopTranscoder),
            Arc::new(CannedTranscriber),
            Arc::new(CannedSummarizer),
            Arc::new(CannedNotes),
            PipelineSettings::default(),
        ));
        let snapshots = Arc::new(
            SnapshotStore::open(state.join("snapshots")).await.unwrap(),
        );
        let scanner = ArtifactScanner::new(account, temp.path().join("meetings"));
        CycleRunner::new(account, scanner, pipeline, snapshots)
    }

    fn make_meeting(temp: &TempDir, name: &str) -> PathBuf {
        let dir = temp.path().join("meetings").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rec.mp4"), b"video bytes").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_slow_cycle_processes_then_skips() {
        let temp = TempDir::new().unwrap();
        make_meeting(&temp, "2025-01-15 Standup");
        let runner = make_runner(&temp, "personal").await;

        let (first, report) = runner.run_cycle(CycleKind::Slow).await.unwrap();
        assert_eq!(first.cycle_id, 1);
        for stage in Stage::ACTIONS {
            assert_eq!(first.succeeded(stage), 1, "{stage} should have run");
        }
        assert!(report.has_actionable_change());

        // Unchanged input: everything cached, nothing actionable
        let (second, report) = runner.run_cycle(CycleKind::Slow).await.unwrap();
        assert_eq!(second.cycle_id, 2);
        assert_eq!(second.total_succeeded(), 0);
        for stage in Stage::ACTIONS {
            assert_eq!(second.counts[&stage].skipped, 1);
        }
        assert!(!report.has_actionable_change());
    }

    #[tokio::test]
    async fn test_changed_source_reruns_chain() {
        let temp = TempDir::new().unwrap();
        let dir = make_meeting(&temp, "2025-01-15 Standup");
        let runner = make_runner(&temp, "personal").await;

        runner.run_cycle(CycleKind::Slow).await.unwrap();

        // New recording content invalidates the media stages
        std::fs::write(dir.join("rec.mp4"), b"different video bytes").unwrap();

        let (second, report) = runner.run_cycle(CycleKind::Slow).await.unwrap();
        assert_eq!(second.succeeded(Stage::VideoCompressed), 1);
        assert_eq!(second.succeeded(Stage::AudioExtracted), 1);
        assert_eq!(second.succeeded(Stage::Transcribed), 1);
        // The canned transcript is unchanged, so later stages short-circuit
        assert_eq!(second.counts[&Stage::Summarized].skipped, 1);
        assert_eq!(second.counts[&Stage::Synced].skipped, 1);
        assert!(report.has_actionable_change());
    }

    #[tokio::test]
    async fn test_fast_cycle_discovers_without_heavy_work() {
        let temp = TempDir::new().unwrap();
        let dir = make_meeting(&temp, "2025-01-15 Standup");
        let runner = make_runner(&temp, "personal").await;

        let (snapshot, _) = runner.run_cycle(CycleKind::Fast).await.unwrap();
        assert_eq!(snapshot.succeeded(Stage::Discovered), 1);
        for stage in Stage::ACTIONS {
            assert!(!snapshot.counts.contains_key(&stage));
        }
        // No transcript or summary yet
        assert!(!dir.join("transcript.md").exists());
    }

    #[tokio::test]
    async fn test_calendar_title_applied_to_outcome() {
        let temp = TempDir::new().unwrap();
        make_meeting(&temp, "2025-01-15-0930");
        let runner = make_runner(&temp, "personal").await;

        let runner = runner.with_calendar(Arc::new(FixedCalendar {
            events: vec![CalendarEvent {
                id: "evt1".to_string(),
                title: "Weekly Standup".to_string(),
                start: Utc::now(),
                end: Utc::now() + Duration::hours(1),
                attendees: vec![],
            }],
        }));

        let (snapshot, _) = runner.run_cycle(CycleKind::Fast).await.unwrap();
        assert_eq!(snapshot.artifacts.len(), 1);
        assert_eq!(snapshot.artifacts[0].display_name, "Weekly Standup");
    }

    #[tokio::test]
    async fn test_rename_does_not_rerun_stages() {
        let temp = TempDir::new().unwrap();
        let dir = make_meeting(&temp, "2025-01-15 Standup");
        let runner = make_runner(&temp, "personal").await;

        runner.run_cycle(CycleKind::Slow).await.unwrap();

        // Rename the source file; content is unchanged
        std::fs::rename(dir.join("rec.mp4"), dir.join("renamed.mp4")).unwrap();

        let (snapshot, _) = runner.run_cycle(CycleKind::Slow).await.unwrap();
        for stage in Stage::ACTIONS {
            assert_eq!(
                snapshot.counts[&stage].skipped, 1,
                "{stage} should be cached after rename"
            );
        }
    }
}
