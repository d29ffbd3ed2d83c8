//! Incoming notes read from an export directory.
//!
//! Each file becomes one [`NormalizedNote`]: the title comes from the `title`
//! preamble field or the file stem, dates from `created` / `updated`, and
//! the body is everything after the preamble.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::frontmatter::{extract_frontmatter, CREATED_KEY, TITLE_KEY, UPDATED_KEY};
use crate::models::NormalizedNote;

/// Reads notes from a directory tree of text files.
#[derive(Debug, Clone)]
pub struct MarkdownSource {
    dir: PathBuf,
    extension: String,
    ignore_patterns: Vec<String>,
}

impl MarkdownSource {
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        ignore_patterns: Vec<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            ignore_patterns,
        }
    }

    /// Load every note under the directory, sorted by title.
    pub fn load(&self) -> Result<Vec<NormalizedNote>, SourceError> {
        if !self.dir.is_dir() {
            return Err(SourceError::DirectoryNotFound(
                self.dir.display().to_string(),
            ));
        }

        let mut files = Vec::new();
        self.collect_files(&self.dir, &mut files)?;

        let mut notes = Vec::with_capacity(files.len());
        for path in files {
            let text = fs::read_to_string(&path).map_err(|source| SourceError::ReadFailed {
                path: path.display().to_string(),
                source,
            })?;
            match parse_note(&path, &text) {
                Some(note) => notes.push(note),
                None => warn!(path = %path.display(), "skipping source note without a title"),
            }
        }

        notes.sort_by(|a, b| a.title.cmp(&b.title));
        info!(dir = %self.dir.display(), count = notes.len(), "loaded source notes");
        Ok(notes)
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SourceError> {
        let read_err = |source: std::io::Error| SourceError::ReadFailed {
            path: dir.display().to_string(),
            source,
        };

        for entry in fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if self.is_ignored(&path) {
                debug!(path = %path.display(), "ignored by pattern");
                continue;
            }
            if path.is_dir() {
                self.collect_files(&path, out)?;
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
            {
                out.push(path);
            }
        }
        Ok(())
    }

    /// Patterns are matched against the path relative to the source root.
    fn is_ignored(&self, path: &Path) -> bool {
        let rel = path
            .strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match::glob_match(&pattern.replace('\\', "/"), &rel))
    }
}

/// Build a note from one source file, or `None` if it has no usable title.
pub fn parse_note(path: &Path, text: &str) -> Option<NormalizedNote> {
    let fm = extract_frontmatter(text);
    let title = fm
        .get(TITLE_KEY)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().trim().to_string())
                .filter(|t| !t.is_empty())
        })?;

    Some(NormalizedNote {
        title,
        created: fm.date(CREATED_KEY),
        updated: fm.date(UPDATED_KEY),
        body: fm.body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_parse_note_with_preamble() {
        let note = parse_note(
            Path::new("export/file-name.md"),
            "---\ntitle: Groceries\ncreated: 2023-05-01\nupdated: 2023-05-02T10:00:00Z\n---\nmilk\neggs",
        )
        .unwrap();
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.body, "milk\neggs");
        assert_eq!(
            note.created,
            Some(Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            note.updated,
            Some(Utc.with_ymd_and_hms(2023, 5, 2, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_note_title_from_stem_and_bad_dates() {
        let note = parse_note(Path::new("x/Meeting.md"), "---\nupdated: soon\n---\nagenda").unwrap();
        assert_eq!(note.title, "Meeting");
        assert_eq!(note.updated, None);
        assert_eq!(note.created, None);
    }

    #[test]
    fn test_load_walks_tree_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.md", "second");
        write(dir.path(), "nested/a.md", "first");
        write(dir.path(), "drafts/c.md", "draft");
        write(dir.path(), "image.png", "not a note");
        write(dir.path(), "scratch.tmp.md", "scratch");

        let source = MarkdownSource::new(
            dir.path(),
            "md",
            vec!["drafts/**".into(), "*.tmp.md".into()],
        );
        let notes = source.load().unwrap();
        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(notes[0].body, "first");
    }

    #[test]
    fn test_ignore_patterns_match_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/x.tmp.md");

        let shallow = MarkdownSource::new(dir.path(), "md", vec!["*.tmp.md".into()]);
        assert!(shallow.is_ignored(&dir.path().join("x.tmp.md")));
        assert!(!shallow.is_ignored(&nested));

        let deep = MarkdownSource::new(dir.path(), "md", vec!["**/*.tmp.md".into()]);
        assert!(deep.is_ignored(&nested));
    }

    #[test]
    fn test_load_missing_dir() {
        let source = MarkdownSource::new("/definitely/not/here", "md", Vec::new());
        assert!(matches!(
            source.load(),
            Err(SourceError::DirectoryNotFound(_))
        ));
    }
}
