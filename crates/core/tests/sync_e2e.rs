//! End-to-end tests for reconciling exported notes into a vault.
//!
//! These tests exercise the real `SyncEngine` against a temporary vault on
//! disk, with a fixed clock so every decision is deterministic. Local edits
//! are simulated by rewriting a note and moving its modification time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use notesync_core::config::ConflictStrategy;
use notesync_core::conflict::merger::CONFLICT_START;
use notesync_core::dates::FixedClock;
use notesync_core::models::{NoteOutcome, NormalizedNote};
use notesync_core::source::MarkdownSource;
use notesync_core::sync_engine::{NoteReport, ProgressCallback, SyncEngine};
use notesync_core::vault::Vault;

// ===========================================================================
// Helpers
// ===========================================================================

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, day, hour, 0, 0).unwrap()
}

fn engine_at(dir: &Path, strategy: ConflictStrategy, now: DateTime<Utc>) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        Vault::new(dir, "Imported", "md"),
        strategy,
        Arc::new(FixedClock(now)),
    ))
}

/// Rewrite the body of a stored note, keeping its preamble, and stamp the
/// file as modified at `when`.
fn edit_locally(path: &Path, new_body: &str, when: DateTime<Utc>) {
    let text = fs::read_to_string(path).unwrap();
    let preamble_end = text.match_indices("---\n").nth(1).unwrap().0 + 4;
    fs::write(path, format!("{}{}", &text[..preamble_end], new_body)).unwrap();
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::from(when))
        .unwrap();
}

async fn first_pass(dir: &TempDir, strategy: ConflictStrategy, body: &str) -> PathBuf {
    let engine = engine_at(dir.path(), strategy, at(1, 0));
    let note = NormalizedNote::new("Journal", body).with_updated(at(1, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();
    assert_eq!(stats.created, 1);
    engine.vault().note_path("Journal")
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_second_identical_pass_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let notes = vec![
        NormalizedNote::new("One", "first note"),
        NormalizedNote::new("Two", "second note").with_updated(at(1, 0)),
        NormalizedNote::new("Three", ""),
    ];

    let first = engine_at(dir.path(), ConflictStrategy::Rename, at(2, 0));
    let stats = first.run_sync_cycle(notes.clone(), None).await.unwrap();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.failed, 0);

    let later = engine_at(dir.path(), ConflictStrategy::Rename, at(9, 0));
    let stats = later.run_sync_cycle(notes, None).await.unwrap();
    assert_eq!(stats.skipped, 3);
    assert_eq!(stats.created + stats.overwritten + stats.renamed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_only_change_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;

    let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(3, 0));
    let note = NormalizedNote::new("Journal", "final").with_updated(at(2, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();

    assert_eq!(stats.overwritten, 1);
    let stored = engine.vault().inspect(&path).unwrap().unwrap();
    assert_eq!(stored.content, "final");
    assert_eq!(stored.last_synced_date, Some(at(3, 0)));
    assert!(!engine.vault().notes_dir().join("Journal (1).md").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_both_sides_changed_keeps_both_copies() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;
    edit_locally(&path, "local edit", at(2, 0));

    let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(4, 0));
    let note = NormalizedNote::new("Journal", "remote edit").with_updated(at(3, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();

    assert_eq!(stats.renamed, 1);
    let renamed = engine.vault().notes_dir().join("Journal (1).md");
    assert_eq!(
        stats.notes[0].outcome,
        Some(NoteOutcome::Renamed {
            existing: path.clone(),
            path: renamed.clone(),
        })
    );
    assert_eq!(engine.vault().inspect(&path).unwrap().unwrap().content, "local edit");
    assert_eq!(engine.vault().inspect(&renamed).unwrap().unwrap().content, "remote edit");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_only_change_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;
    edit_locally(&path, "local edit", at(2, 0));

    // Incoming is older than the last sync but still differs.
    let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(4, 0));
    let note = NormalizedNote::new("Journal", "stale remote").with_updated(at(1, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();

    assert_eq!(stats.renamed, 1);
    assert_eq!(engine.vault().inspect(&path).unwrap().unwrap().content, "local edit");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_passes_keep_a_single_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;
    edit_locally(&path, "local edit", at(2, 0));

    let note = NormalizedNote::new("Journal", "remote edit").with_updated(at(3, 0));
    for day in 4..=6 {
        let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(day, 0));
        let stats = engine.run_sync_cycle(vec![note.clone()], None).await.unwrap();
        assert_eq!(stats.renamed, 1);
    }

    let files = fs::read_dir(dir.path().join("Imported")).unwrap().count();
    assert_eq!(files, 2);
    let copy = dir.path().join("Imported").join("Journal (1).md");
    assert!(fs::read_to_string(&path).unwrap().ends_with("local edit"));
    assert!(fs::read_to_string(copy).unwrap().ends_with("remote edit"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_renamed_copy_never_hides_a_note_with_that_title() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;
    edit_locally(&path, "local edit", at(2, 0));

    let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(4, 0));
    let diverged = NormalizedNote::new("Journal", "remote edit").with_updated(at(3, 0));
    let stats = engine.run_sync_cycle(vec![diverged], None).await.unwrap();
    assert_eq!(stats.renamed, 1);
    let copy = engine.vault().notes_dir().join("Journal (1).md");
    assert!(copy.exists());

    // A later, undated note whose title is the copy's file name.
    let other = NormalizedNote::new("Journal (1)", "a different note");
    let stats = engine.run_sync_cycle(vec![other], None).await.unwrap();
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.renamed, 1);

    let stored = engine
        .vault()
        .inspect(stats.notes[0].outcome.as_ref().unwrap().path())
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, "a different note");
    assert_eq!(stored.title.as_deref(), Some("Journal (1)"));
    assert_eq!(engine.vault().inspect(&copy).unwrap().unwrap().content, "remote edit");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_skips_keys_of_notes_in_the_same_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Rename, "draft").await;
    edit_locally(&path, "local edit", at(2, 0));

    let engine = engine_at(dir.path(), ConflictStrategy::Rename, at(4, 0));
    let notes = vec![
        NormalizedNote::new("Journal", "remote edit").with_updated(at(3, 0)),
        NormalizedNote::new("Journal (1)", "its own note"),
    ];
    let stats = engine.run_sync_cycle(notes, None).await.unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.renamed, 1);

    let vault = engine.vault();
    let own = vault.inspect(&vault.note_path("Journal (1)")).unwrap().unwrap();
    assert_eq!(own.content, "its own note");
    let copy = vault
        .inspect(&vault.notes_dir().join("Journal (2).md"))
        .unwrap()
        .unwrap();
    assert_eq!(copy.content, "remote edit");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_strategy_without_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Merge, "A\nB").await;
    edit_locally(&path, "local\nA\nB", at(2, 0));

    let engine = engine_at(dir.path(), ConflictStrategy::Merge, at(4, 0));
    let note = NormalizedNote::new("Journal", "A\nB\nremote").with_updated(at(3, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();

    assert_eq!(stats.merged, 1);
    assert_eq!(stats.conflicts, 0);
    let stored = engine.vault().inspect(&path).unwrap().unwrap();
    assert_eq!(stored.content, "local\nA\nB\nremote");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_strategy_marks_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = first_pass(&dir, ConflictStrategy::Merge, "A\nB\nC").await;
    edit_locally(&path, "A\nB\nC\nlocal", at(2, 0));

    let engine = engine_at(dir.path(), ConflictStrategy::Merge, at(4, 0));
    let note = NormalizedNote::new("Journal", "A\nZ\nC").with_updated(at(3, 0));
    let stats = engine.run_sync_cycle(vec![note], None).await.unwrap();

    assert_eq!(stats.merged, 1);
    assert_eq!(stats.conflicts, 1);
    let stored = engine.vault().inspect(&path).unwrap().unwrap();
    assert!(stored.content.contains(CONFLICT_START));
    assert!(stored.content.ends_with("C\nlocal"));
    assert!(!engine.vault().notes_dir().join("Journal (1).md").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_and_source_round_trip() {
    let export = tempfile::tempdir().unwrap();
    fs::write(
        export.path().join("groceries.md"),
        "---\ntitle: Groceries\nupdated: 2023-05-30\n---\nmilk\n",
    )
    .unwrap();
    fs::write(export.path().join("Ideas.md"), "plain body").unwrap();

    let notes = MarkdownSource::new(export.path(), "md", Vec::new())
        .load()
        .unwrap();
    assert_eq!(notes.len(), 2);

    let vault_dir = tempfile::tempdir().unwrap();
    let engine = engine_at(vault_dir.path(), ConflictStrategy::Rename, at(1, 0));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let progress: ProgressCallback = Arc::new(move |_report: &NoteReport| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let stats = engine.run_sync_cycle(notes, Some(progress)).await.unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(stats.notes[0].title, "Groceries");

    let stored = engine
        .vault()
        .inspect(&engine.vault().note_path("Groceries"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, "milk\n");
    assert_eq!(
        stored.updated_date,
        Some(Utc.with_ymd_and_hms(2023, 5, 30, 0, 0, 0).unwrap())
    );
}
