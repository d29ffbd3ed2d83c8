//! File-system vault: storage keys, snapshots, and applying decisions.
//!
//! Notes live at `<root>/<folder>/<sanitized title>.<ext>`. The vault is the
//! only component that touches the disk; the policy and the merger only see
//! the [`ExistingFileInfo`] snapshots it produces.
//!
//! Every written note records its own title in the preamble. A file whose
//! recorded title differs from an incoming note's title belongs to another
//! note (a kept copy, or a title that sanitizes to the same name) and is
//! never reconciled against it.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::{DateTime, SubsecRound, Utc};
use regex_lite::Regex;
use tracing::{debug, info};

use crate::config::VaultConfig;
use crate::errors::StorageError;
use crate::frontmatter::{
    extract_frontmatter, render_note, NoteMetadata, CREATED_KEY, LAST_SYNCED_KEY, TITLE_KEY,
    UPDATED_KEY,
};
use crate::models::{Decision, ExistingFileInfo, NoteOutcome, NormalizedNote};

/// Upper bound on `Title (n)` probing.
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

const UNTITLED: &str = "Untitled";

/// A directory of note files.
#[derive(Debug, Clone)]
pub struct Vault {
    notes_dir: PathBuf,
    extension: String,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>, folder: &str, extension: impl Into<String>) -> Self {
        Self {
            notes_dir: root.into().join(folder),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.expanded_root(), &config.folder, config.extension.clone())
    }

    /// Directory that receives synced notes.
    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// Storage key for a note title.
    pub fn note_path(&self, title: &str) -> PathBuf {
        self.notes_dir
            .join(format!("{}.{}", sanitize_title(title), self.extension))
    }

    /// Snapshot the note stored at `path`, or `None` if nothing is there.
    pub fn inspect(&self, path: &Path) -> Result<Option<ExistingFileInfo>, StorageError> {
        let read_err = |source: io::Error| StorageError::ReadFailed {
            path: path.display().to_string(),
            source,
        };

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_err(e)),
        };
        let text = fs::read_to_string(path).map_err(read_err)?;
        let fm = extract_frontmatter(&text);

        let info = ExistingFileInfo {
            title: fm.get(TITLE_KEY).map(str::to_string),
            created_date: fm.date(CREATED_KEY),
            updated_date: fm.date(UPDATED_KEY),
            last_synced_date: fm.date(LAST_SYNCED_KEY),
            // Not every file system records a creation time.
            fs_created_date: metadata.created().ok().map(DateTime::<Utc>::from),
            fs_updated_date: metadata.modified().ok().map(DateTime::<Utc>::from),
            content: fm.body,
        };
        debug!(
            path = %path.display(),
            last_synced = ?info.last_synced_date,
            fs_updated = ?info.fs_updated_date,
            "inspected existing note"
        );
        Ok(Some(info))
    }

    /// `<stem> (1).<ext>`, `<stem> (2).<ext>`, ... next to `path`.
    fn rename_candidates<'a>(&'a self, path: &Path) -> impl Iterator<Item = PathBuf> + 'a {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        let parent = path
            .parent()
            .unwrap_or(self.notes_dir.as_path())
            .to_path_buf();

        (1..=MAX_RENAME_ATTEMPTS)
            .map(move |n| parent.join(format!("{} ({}).{}", stem, n, self.extension)))
    }

    /// Store `note` under the first free `<stem> (n).<ext>` next to `path`.
    ///
    /// Names in `reserved` are storage keys of other notes and are never
    /// taken. A sibling that already holds this note's body is reused instead
    /// of writing another copy. Returns the target and whether it was written.
    pub fn write_renamed(
        &self,
        path: &Path,
        meta: &NoteMetadata,
        note: &NormalizedNote,
        synced_at: DateTime<Utc>,
        reserved: &HashSet<PathBuf>,
    ) -> Result<(PathBuf, bool), StorageError> {
        for candidate in self.rename_candidates(path) {
            if reserved.contains(&candidate) {
                continue;
            }

            if let Some(copy) = self.inspect(&candidate)? {
                let same_note = copy.title.as_deref().map_or(true, |t| t == note.title);
                if same_note && copy.content == note.body {
                    return Ok((candidate, false));
                }
                continue;
            }

            match write_file(&candidate, &render_note(meta, &note.body), synced_at, true) {
                Ok(()) => return Ok((candidate, true)),
                // Taken between the check and the write.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(StorageError::WriteFailed {
                        path: candidate.display().to_string(),
                        source,
                    })
                }
            }
        }
        Err(StorageError::NoFreeName(path.display().to_string()))
    }

    /// Write a note and stamp the file's modification time with `synced_at`.
    ///
    /// Without the stamp the write itself would make the file look locally
    /// modified after its own `LastSynced` on the next pass.
    pub fn write_note(
        &self,
        path: &Path,
        meta: &NoteMetadata,
        body: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        write_file(path, &render_note(meta, body), synced_at, false).map_err(|source| {
            StorageError::WriteFailed {
                path: path.display().to_string(),
                source,
            }
        })?;

        debug!(path = %path.display(), bytes = body.len(), "note written");
        Ok(())
    }

    /// Carry out `decision` for `note` against the file at `path`.
    pub fn apply(
        &self,
        decision: Decision,
        path: &Path,
        note: &NormalizedNote,
        synced_at: DateTime<Utc>,
        reserved: &HashSet<PathBuf>,
    ) -> Result<NoteOutcome, StorageError> {
        let synced_at = synced_at.trunc_subsecs(0);
        let meta = NoteMetadata::for_note(note, synced_at);

        match decision {
            Decision::Skip => Ok(NoteOutcome::Skipped {
                path: path.to_path_buf(),
            }),
            Decision::Overwrite => {
                self.write_note(path, &meta, &note.body, synced_at)?;
                info!(path = %path.display(), "overwrote existing note");
                Ok(NoteOutcome::Overwritten {
                    path: path.to_path_buf(),
                })
            }
            Decision::Rename => {
                let (target, written) =
                    self.write_renamed(path, &meta, note, synced_at, reserved)?;
                if written {
                    info!(
                        existing = %path.display(),
                        path = %target.display(),
                        "kept both copies"
                    );
                } else {
                    debug!(path = %target.display(), "copy already kept");
                }
                Ok(NoteOutcome::Renamed {
                    existing: path.to_path_buf(),
                    path: target,
                })
            }
        }
    }

    /// Write a note that had no stored counterpart.
    pub fn create(
        &self,
        path: &Path,
        note: &NormalizedNote,
        synced_at: DateTime<Utc>,
    ) -> Result<NoteOutcome, StorageError> {
        let synced_at = synced_at.trunc_subsecs(0);
        let meta = NoteMetadata::for_note(note, synced_at);
        self.write_note(path, &meta, &note.body, synced_at)?;
        info!(path = %path.display(), "created note");
        Ok(NoteOutcome::Created {
            path: path.to_path_buf(),
        })
    }

    /// Replace the body at `path` with a merge of both copies.
    ///
    /// The existing creation date is kept; the update date is the later of
    /// the two sides.
    pub fn write_merged(
        &self,
        path: &Path,
        existing: &ExistingFileInfo,
        note: &NormalizedNote,
        merged_body: &str,
        has_conflicts: bool,
        synced_at: DateTime<Utc>,
    ) -> Result<NoteOutcome, StorageError> {
        let synced_at = synced_at.trunc_subsecs(0);
        let meta = NoteMetadata {
            title: Some(note.title.clone()),
            created: existing.created_date.or(note.created),
            updated: existing.updated_date.max(note.updated),
            last_synced: Some(synced_at),
        };
        self.write_note(path, &meta, merged_body, synced_at)?;
        info!(path = %path.display(), has_conflicts, "merged both copies");
        Ok(NoteOutcome::Merged {
            path: path.to_path_buf(),
            has_conflicts,
        })
    }
}

fn write_file(
    path: &Path,
    text: &str,
    synced_at: DateTime<Utc>,
    create_new: bool,
) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = fs::File::options();
    if create_new {
        options.write(true).create_new(true);
    } else {
        options.write(true).create(true).truncate(true);
    }
    let mut file = options.open(path)?;
    file.write_all(text.as_bytes())?;
    file.set_modified(SystemTime::from(synced_at))
}

/// Turn a note title into a safe file stem.
pub fn sanitize_title(title: &str) -> String {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let illegal = ILLEGAL.get_or_init(|| {
        Regex::new(r#"[\\/:*?"<>|#^\[\]\x00-\x1f]"#).expect("Invalid regex")
    });
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex"));

    let collapsed = whitespace.replace_all(title, " ");
    let replaced = illegal.replace_all(&collapsed, "-");
    // Leading dots would hide the file on Unix.
    let stem = replaced.trim().trim_start_matches('.').trim();

    if stem.is_empty() {
        UNTITLED.to_string()
    } else {
        stem.to_string()
    }
}
