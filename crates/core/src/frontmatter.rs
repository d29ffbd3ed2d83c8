//! Metadata preamble handling.
//!
//! Notes carry their timestamps in a preamble at the top of the file:
//!
//! ```markdown
//! ---
//! Title: Weekly review
//! Created: 2023-05-20T09:00:00Z
//! Updated: 2023-05-25T17:45:00Z
//! LastSynced: 2023-05-26T08:00:00Z
//! ---
//! Note body...
//! ```
//!
//! Keys are normalized to snake_case so `LastSynced`, `last-synced` and
//! `Last Synced` all read as `last_synced`.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::dates::normalize_date;
use crate::models::NormalizedNote;

const DELIMITER: &str = "---";

pub const TITLE_KEY: &str = "title";
pub const CREATED_KEY: &str = "created";
pub const UPDATED_KEY: &str = "updated";
pub const LAST_SYNCED_KEY: &str = "last_synced";

/// A document split into preamble and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    /// Text between the two delimiters, empty when there is no preamble.
    pub raw: String,
    /// Everything after the closing delimiter line.
    pub body: String,
    /// Preamble fields keyed by normalized key.
    pub fields: HashMap<String, String>,
}

impl Frontmatter {
    /// Look up a field; `key` is normalized first.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(&normalize_key(key)).map(String::as_str)
    }

    /// Look up a field and parse it as a date.
    pub fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        normalize_date(self.get(key))
    }
}

/// Split `text` into preamble and body and parse the preamble fields.
///
/// Without an opening and a closing delimiter the whole text is the body.
/// This is narrower than pairing the first two `---` lines found anywhere:
/// the opening one must come before any other content, so a body that only
/// contains horizontal rules never loses text to a preamble.
pub fn extract_frontmatter(text: &str) -> Frontmatter {
    match split_preamble(text) {
        Some((raw, body)) => Frontmatter {
            raw: raw.to_string(),
            body: body.to_string(),
            fields: parse_fields(raw),
        },
        None => Frontmatter {
            body: text.to_string(),
            ..Default::default()
        },
    }
}

/// The opening delimiter must be the first non-blank line; the closing one is
/// the next line that is exactly `---`.
fn split_preamble(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let mut offset = 0;

    let open_end = loop {
        let line = lines.next()?;
        offset += line.len();
        match line.trim() {
            "" => continue,
            DELIMITER => break offset,
            _ => return None,
        }
    };

    let mut cursor = open_end;
    for line in lines {
        if line.trim_end() == DELIMITER {
            return Some((&text[open_end..cursor], &text[cursor + line.len()..]));
        }
        cursor += line.len();
    }
    None
}

fn parse_fields(raw: &str) -> HashMap<String, String> {
    if raw.trim().is_empty() {
        return HashMap::new();
    }

    // Most preambles are YAML; hand-edited ones sometimes are not
    // (e.g. an unquoted colon inside a value).
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(serde_yaml::Value::Mapping(map)) => map
            .iter()
            .filter_map(|(k, v)| Some((normalize_key(&yaml_to_string(k)?), yaml_to_string(v)?)))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        _ => parse_lines(raw),
    }
}

fn yaml_to_string(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(yaml_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Tagged(tagged) => yaml_to_string(&tagged.value),
        Value::Null | Value::Mapping(_) => None,
    }
}

/// `key: value` per line, split at the first colon.
fn parse_lines(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = normalize_key(key);
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            Some((key, value.to_string()))
        })
        .collect()
}

/// Normalize a preamble key to snake_case.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut after_lower = false;

    for c in key.trim().chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && after_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            after_lower = c.is_lowercase() || c.is_numeric();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            after_lower = false;
        }
    }

    out.trim_end_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Fields written into a note's preamble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMetadata {
    /// Title of the note that owns the file.
    pub title: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl NoteMetadata {
    /// Metadata for storing `note` as synced at `synced_at`.
    pub fn for_note(note: &NormalizedNote, synced_at: DateTime<Utc>) -> Self {
        Self {
            title: Some(note.title.clone()),
            created: note.created,
            updated: note.updated,
            last_synced: Some(synced_at),
        }
    }
}

/// Build a full note from metadata and body. Absent fields are left out.
pub fn render_note(meta: &NoteMetadata, body: &str) -> String {
    let entries = [
        ("Created", meta.created),
        ("Updated", meta.updated),
        ("LastSynced", meta.last_synced),
    ];

    let mut out = String::from(DELIMITER);
    out.push('\n');
    if let Some(title) = &meta.title {
        out.push_str(&format!("Title: {}\n", yaml_scalar(title)));
    }
    for (key, value) in entries {
        if let Some(ts) = value {
            out.push_str(&format!(
                "{}: {}\n",
                key,
                ts.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

/// A string as a YAML scalar, quoted when it would otherwise parse as
/// something else.
fn yaml_scalar(value: &str) -> String {
    serde_yaml::to_string(value)
        .map(|yaml| yaml.trim_end().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}
