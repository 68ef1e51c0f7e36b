//! No duplicate external work: unchanged inputs are never reprocessed,
//! changed content is, and a rename alone costs nothing.

mod common;

use std::sync::atomic::Ordering;

use common::{harness, FailMode};
use meetflow::domain::{CycleKind, Stage};

#[tokio::test]
async fn unchanged_folder_costs_zero_adapter_calls() {
    let h = harness("personal").await;
    h.make_meeting("personal", "2025-01-15 Standup", b"video bytes");

    h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    let after_first = h.total_adapter_calls();
    assert!(after_first > 0);

    h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    assert_eq!(h.total_adapter_calls(), after_first);
}

#[tokio::test]
async fn renamed_source_is_not_reprocessed() {
    let h = harness("personal").await;
    let dir = h.make_meeting("personal", "2025-01-15 Standup", b"video bytes");

    h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    let after_first = h.total_adapter_calls();

    std::fs::rename(dir.join("recording.mp4"), dir.join("renamed.mp4")).unwrap();

    let (snapshot, _) = h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    assert_eq!(h.total_adapter_calls(), after_first);
    for stage in Stage::ACTIONS {
        assert_eq!(snapshot.counts[&stage].skipped, 1);
    }
}

#[tokio::test]
async fn changed_content_reruns_downstream_stages() {
    let h = harness("personal").await;
    let dir = h.make_meeting("personal", "2025-01-15 Standup", b"take one");

    h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    assert_eq!(h.notes.upserted_keys.lock().unwrap().len(), 1);

    std::fs::write(dir.join("recording.mp4"), b"take two, re-recorded").unwrap();

    let (snapshot, _) = h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    for stage in Stage::ACTIONS {
        assert_eq!(
            snapshot.succeeded(stage),
            1,
            "{stage} should rerun for new content"
        );
    }

    // Same external key both times; the notes upsert never duplicates pages
    let keys = h.notes.upserted_keys.lock().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn failed_stage_is_reattempted_next_cycle() {
    let h = harness("personal").await;
    h.make_meeting("personal", "2025-01-15 Standup", b"video bytes");

    h.transcriber.fail_for("Standup", FailMode::Transient);

    let (first, _) = h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    assert_eq!(first.counts[&Stage::Transcribed].failed, 1);
    assert!(!first.counts.contains_key(&Stage::Summarized));
    // Retried to exhaustion within the cycle
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 3);

    h.transcriber.clear_failures();

    let (second, _) = h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    // Earlier stages stay cached; only the failed stage and its successors run
    assert_eq!(second.counts[&Stage::VideoCompressed].skipped, 1);
    assert_eq!(second.counts[&Stage::AudioExtracted].skipped, 1);
    assert_eq!(second.succeeded(Stage::Transcribed), 1);
    assert_eq!(second.succeeded(Stage::Summarized), 1);
    assert_eq!(second.succeeded(Stage::Synced), 1);
}

#[tokio::test]
async fn invalid_input_is_not_retried_within_cycle() {
    let h = harness("personal").await;
    h.make_meeting("personal", "2025-01-15 Standup", b"video bytes");

    h.transcoder.fail_compress_for("Standup", FailMode::InputInvalid);

    let (snapshot, _) = h.runner().run_cycle(CycleKind::Slow).await.unwrap();
    assert_eq!(snapshot.counts[&Stage::VideoCompressed].failed, 1);
    assert_eq!(h.transcoder.compress_calls.load(Ordering::SeqCst), 1);
}
