//! Sync engine: reconciles a batch of incoming notes against the vault.
//!
//! For each incoming note the engine:
//!
//! 1. Computes the storage key and snapshots whatever is stored there.
//! 2. Writes the note directly if nothing is stored yet.
//! 3. Keeps both copies if the stored file belongs to a different title.
//! 4. Otherwise asks the [`ReconciliationPolicy`] for a decision.
//! 5. Applies it, resolving `rename` through the [`Merger`] when the merge
//!    strategy is configured.
//!
//! Notes are grouped by storage key. Groups run in parallel on blocking
//! tasks; notes sharing a key run one after another so each decision sees
//! the previous write. Renamed copies never take the storage key of another
//! note in the same cycle. A lock prevents concurrent cycles on one engine.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ConflictStrategy};
use crate::conflict::{MergeResult, Merger, ReconciliationPolicy};
use crate::dates::Clock;
use crate::errors::{CoreError, SyncError};
use crate::models::{Decision, ExistingFileInfo, NoteOutcome, NormalizedNote};
use crate::vault::Vault;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one incoming note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReport {
    pub title: String,
    pub outcome: Option<NoteOutcome>,
    pub error: Option<String>,
}

impl NoteReport {
    fn new(title: &str, result: Result<NoteOutcome, SyncError>) -> Self {
        match result {
            Ok(outcome) => Self {
                title: title.to_string(),
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                title: title.to_string(),
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Statistics from a single sync cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub created: usize,
    pub overwritten: usize,
    pub renamed: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Merges that left conflict blocks in the file.
    pub conflicts: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub notes: Vec<NoteReport>,
}

impl SyncStats {
    fn record(&mut self, report: NoteReport) {
        match &report.outcome {
            Some(NoteOutcome::Created { .. }) => self.created += 1,
            Some(NoteOutcome::Overwritten { .. }) => self.overwritten += 1,
            Some(NoteOutcome::Renamed { .. }) => self.renamed += 1,
            Some(NoteOutcome::Skipped { .. }) => self.skipped += 1,
            Some(NoteOutcome::Merged { has_conflicts, .. }) => {
                self.merged += 1;
                if *has_conflicts {
                    self.conflicts += 1;
                }
            }
            None => self.failed += 1,
        }
        self.notes.push(report);
    }

    /// Number of notes processed, successfully or not.
    pub fn total(&self) -> usize {
        self.notes.len()
    }
}

/// What a cycle would do for one note, with the conflict strategy applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlannedStep {
    /// Nothing is stored at the key yet.
    Create,
    Skip,
    Overwrite,
    /// Store next to the existing file.
    Rename,
    /// Merge into the existing file.
    Merge { has_conflicts: bool },
}

impl PlannedStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Merge { .. } => "merge",
        }
    }
}

/// What a cycle would do for one note, without touching the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub title: String,
    pub path: PathBuf,
    pub step: PlannedStep,
}

/// How a stored note is resolved against an incoming one.
enum Resolution {
    Apply(Decision),
    Merge(MergeResult),
}

/// Called once per note as soon as it has been reconciled.
pub type ProgressCallback = Arc<dyn Fn(&NoteReport) + Send + Sync>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The note sync engine.
pub struct SyncEngine {
    vault: Vault,
    strategy: ConflictStrategy,
    clock: Arc<dyn Clock>,
    /// Atomic flag preventing concurrent sync cycles.
    running: Arc<AtomicBool>,
    /// Start of the current cycle, in Unix milliseconds.
    cycle_started_ms: AtomicI64,
}

impl SyncEngine {
    pub fn new(vault: Vault, strategy: ConflictStrategy, clock: Arc<dyn Clock>) -> Self {
        info!(notes_dir = %vault.notes_dir().display(), %strategy, "initializing sync engine");
        Self {
            vault,
            strategy,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            cycle_started_ms: AtomicI64::new(0),
        }
    }

    /// Validate `config` and build an engine for its vault and strategy.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self::new(
            Vault::from_config(&config.vault),
            config.sync.conflict_strategy,
            clock,
        ))
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Check if a sync cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Single note
    // -----------------------------------------------------------------------

    /// Decide what a sync would do for `note` without writing anything.
    pub fn plan(&self, note: &NormalizedNote) -> Result<PlannedAction, SyncError> {
        let path = self.vault.note_path(&note.title);
        let step = match self.vault.inspect(&path)? {
            None => PlannedStep::Create,
            Some(existing) => match self.resolve(note, &existing) {
                Resolution::Apply(Decision::Skip) => PlannedStep::Skip,
                Resolution::Apply(Decision::Overwrite) => PlannedStep::Overwrite,
                Resolution::Apply(Decision::Rename) => PlannedStep::Rename,
                Resolution::Merge(merge) => PlannedStep::Merge {
                    has_conflicts: merge.has_conflicts,
                },
            },
        };
        Ok(PlannedAction {
            title: note.title.clone(),
            path,
            step,
        })
    }

    /// Reconcile one note against the vault and apply the result.
    pub fn reconcile_note(&self, note: &NormalizedNote) -> Result<NoteOutcome, SyncError> {
        self.reconcile(note, &HashSet::new())
    }

    /// Like [`reconcile_note`](Self::reconcile_note); a renamed copy never
    /// lands on a path in `reserved`.
    fn reconcile(
        &self,
        note: &NormalizedNote,
        reserved: &HashSet<PathBuf>,
    ) -> Result<NoteOutcome, SyncError> {
        let path = self.vault.note_path(&note.title);
        let now = self.clock.now();

        let Some(existing) = self.vault.inspect(&path)? else {
            return Ok(self.vault.create(&path, note, now)?);
        };

        match self.resolve(note, &existing) {
            Resolution::Merge(merge) => Ok(self.vault.write_merged(
                &path,
                &existing,
                note,
                &merge.merged_content,
                merge.has_conflicts,
                now,
            )?),
            Resolution::Apply(decision) => {
                debug!(title = %note.title, %decision, "applying decision");
                Ok(self.vault.apply(decision, &path, note, now, reserved)?)
            }
        }
    }

    fn resolve(&self, note: &NormalizedNote, existing: &ExistingFileInfo) -> Resolution {
        if let Some(owner) = existing.title.as_deref().filter(|t| *t != note.title) {
            debug!(title = %note.title, %owner, "storage key holds another note");
            return Resolution::Apply(Decision::Rename);
        }

        let decision = ReconciliationPolicy::decide(note, existing, self.clock.as_ref());
        if decision == Decision::Rename && self.strategy == ConflictStrategy::Merge {
            return Resolution::Merge(Merger::merge(&existing.content, &note.body));
        }
        Resolution::Apply(decision)
    }

    // -----------------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------------

    /// Reconcile a batch of notes.
    ///
    /// Per-note failures are recorded in the stats and do not stop the
    /// cycle. The sync lock is released via a drop guard so it is freed
    /// even if the cycle panics.
    pub async fn run_sync_cycle(
        self: &Arc<Self>,
        notes: Vec<NormalizedNote>,
        progress: Option<ProgressCallback>,
    ) -> Result<SyncStats, SyncError> {
        let started = Utc::now();
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let started_at = DateTime::<Utc>::from_timestamp_millis(
                self.cycle_started_ms.load(Ordering::SeqCst),
            )
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
            return Err(SyncError::AlreadyRunning { started_at });
        }
        let _guard = SyncLockGuard(self.running.clone());
        self.cycle_started_ms
            .store(started.timestamp_millis(), Ordering::SeqCst);

        let mut stats = SyncStats {
            started_at: started.to_rfc3339(),
            ..Default::default()
        };
        info!(count = notes.len(), "starting sync cycle");

        let mut groups: BTreeMap<PathBuf, Vec<NormalizedNote>> = BTreeMap::new();
        for note in notes {
            groups
                .entry(self.vault.note_path(&note.title))
                .or_default()
                .push(note);
        }

        let reserved: Arc<HashSet<PathBuf>> = Arc::new(groups.keys().cloned().collect());
        let mut tasks = JoinSet::new();
        for group in groups.into_values() {
            let engine = Arc::clone(self);
            let progress = progress.clone();
            let reserved = Arc::clone(&reserved);
            tasks.spawn_blocking(move || {
                group
                    .iter()
                    .map(|note| {
                        let result = engine.reconcile(note, &reserved);
                        if let Err(ref e) = result {
                            warn!(title = %note.title, error = %e, "failed to reconcile note");
                        }
                        let report = NoteReport::new(&note.title, result);
                        if let Some(ref callback) = progress {
                            callback(&report);
                        }
                        report
                    })
                    .collect::<Vec<_>>()
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let reports = joined.map_err(|e| SyncError::TaskFailed(e.to_string()))?;
            for report in reports {
                stats.record(report);
            }
        }

        stats.notes.sort_by(|a, b| a.title.cmp(&b.title));
        stats.completed_at = Some(Utc::now().to_rfc3339());
        info!(
            created = stats.created,
            overwritten = stats.overwritten,
            renamed = stats.renamed,
            merged = stats.merged,
            skipped = stats.skipped,
            failed = stats.failed,
            conflicts = stats.conflicts,
            "sync cycle complete"
        );
        Ok(stats)
    }
}

/// RAII guard that resets the sync-running flag when dropped.
struct SyncLockGuard(Arc<AtomicBool>);

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
