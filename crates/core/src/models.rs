//! Domain model types shared by the policy, the vault, and the sync engine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Incoming note
// ---------------------------------------------------------------------------

/// A note arriving from the external source, already normalized.
///
/// `body` never contains a metadata preamble. Absent dates mean "unknown",
/// not the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedNote {
    pub title: String,
    pub body: String,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl NormalizedNote {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            created: None,
            updated: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }
}

// ---------------------------------------------------------------------------
// Existing artifact snapshot
// ---------------------------------------------------------------------------

/// Snapshot of the note currently stored at an incoming note's storage key.
///
/// Built fresh for every decision. The `created_date`, `updated_date` and
/// `last_synced_date` fields come from the file's own preamble; the `fs_*`
/// fields come from the file system and only serve as fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingFileInfo {
    pub content: String,
    /// Title recorded in the preamble: the note that owns this file.
    pub title: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub fs_created_date: Option<DateTime<Utc>>,
    pub fs_updated_date: Option<DateTime<Utc>>,
    pub last_synced_date: Option<DateTime<Utc>>,
}

impl ExistingFileInfo {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// What to do with an incoming note whose storage key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Already reconciled; leave the existing copy untouched.
    Skip,
    /// Keep the existing copy and write the incoming one under a new name.
    Rename,
    /// Replace the existing copy with the incoming one.
    Overwrite,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Rename => write!(f, "rename"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome of reconciling one note
// ---------------------------------------------------------------------------

/// What the sync engine actually did for one incoming note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NoteOutcome {
    /// Nothing stored at the key yet; the note was written there.
    Created { path: PathBuf },
    /// Existing copy left as is.
    Skipped { path: PathBuf },
    /// Existing copy replaced.
    Overwritten { path: PathBuf },
    /// Incoming copy written next to the existing one.
    Renamed { existing: PathBuf, path: PathBuf },
    /// Both bodies merged into the existing file.
    Merged { path: PathBuf, has_conflicts: bool },
}

impl NoteOutcome {
    /// Path of the file the incoming content ended up in (or would have).
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Created { path }
            | Self::Skipped { path }
            | Self::Overwritten { path }
            | Self::Renamed { path, .. }
            | Self::Merged { path, .. } => path,
        }
    }

    /// Short label for tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Skipped { .. } => "skipped",
            Self::Overwritten { .. } => "overwritten",
            Self::Renamed { .. } => "renamed",
            Self::Merged { .. } => "merged",
        }
    }
}
