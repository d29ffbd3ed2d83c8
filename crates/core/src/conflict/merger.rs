//! Line-level merge of two note bodies.
//!
//! There is no common ancestor to work from, so the merge is anchored on the
//! longest common subsequence of lines. Lines only one side has are kept in
//! place; where both sides have their own lines between the same two anchors,
//! a conflict block is emitted:
//!
//! ```text
//! <<<<<<< existing
//! ...existing-only lines...
//! =======
//! ...incoming-only lines...
//! >>>>>>> incoming
//! ```
//!
//! Every input line appears in the output exactly once.

use tracing::{debug, info};

pub const CONFLICT_START: &str = "<<<<<<< existing";
pub const CONFLICT_SEPARATOR: &str = "=======";
pub const CONFLICT_END: &str = ">>>>>>> incoming";

/// The result of merging two bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// The merged content (contains conflict blocks if `has_conflicts` is true).
    pub merged_content: String,
    /// Whether any conflict block was emitted.
    pub has_conflicts: bool,
    /// Locations of conflict blocks within the merged content.
    pub conflict_markers: Vec<ConflictMarker>,
}

/// A single conflict region within merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictMarker {
    /// Line number (1-indexed) of the start marker.
    pub start_line: usize,
    /// Line number (1-indexed) of the end marker.
    pub end_line: usize,
}

/// Stateless line merger.
pub struct Merger;

impl Merger {
    /// Merge `existing` and `incoming` line by line.
    pub fn merge(existing: &str, incoming: &str) -> MergeResult {
        if existing == incoming {
            return MergeResult {
                merged_content: existing.to_string(),
                has_conflicts: false,
                conflict_markers: Vec::new(),
            };
        }

        let left = split_lines(existing);
        let right = split_lines(incoming);
        let table = build_lcs_table(&left, &right);
        let common = reconstruct_lcs(&table, &left, &right);
        debug!(
            existing_lines = left.len(),
            incoming_lines = right.len(),
            common_lines = common.len(),
            "computed line LCS"
        );

        let mut out = MergeOutput::default();
        let (mut i, mut j) = (0, 0);

        for &line in &common {
            // The LCS is in order, so the earliest occurrence at or after the
            // cursor is always a valid anchor.
            let next_i = position_from(&left, i, line);
            let next_j = position_from(&right, j, line);
            out.emit_gap(&left[i..next_i], &right[j..next_j]);
            out.lines.push(line);
            i = next_i + 1;
            j = next_j + 1;
        }
        out.emit_gap(&left[i..], &right[j..]);

        let has_conflicts = !out.markers.is_empty();
        if has_conflicts {
            info!(conflicts = out.markers.len(), "merge produced conflict blocks");
        }

        MergeResult {
            merged_content: out.lines.join("\n"),
            has_conflicts,
            conflict_markers: out.markers,
        }
    }
}

/// Split a body into lines. The empty body has no lines at all.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Backward-filled LCS length table of size `(m + 1) x (n + 1)`.
///
/// `table[i][j]` is the LCS length of `left[i..]` and `right[j..]`.
pub fn build_lcs_table(left: &[&str], right: &[&str]) -> Vec<Vec<usize>> {
    let (m, n) = (left.len(), right.len());
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i][j] = if left[i] == right[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    table
}

/// Walk `table` from the start and return one LCS.
///
/// On a tie the left (existing) side advances first.
pub fn reconstruct_lcs<'a>(
    table: &[Vec<usize>],
    left: &[&'a str],
    right: &[&'a str],
) -> Vec<&'a str> {
    let mut common = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if left[i] == right[j] {
            common.push(left[i]);
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    common
}

fn position_from(lines: &[&str], start: usize, needle: &str) -> usize {
    lines[start..]
        .iter()
        .position(|l| *l == needle)
        .map_or(lines.len(), |offset| start + offset)
}

#[derive(Default)]
struct MergeOutput<'a> {
    lines: Vec<&'a str>,
    markers: Vec<ConflictMarker>,
}

impl<'a> MergeOutput<'a> {
    fn emit_gap(&mut self, existing: &[&'a str], incoming: &[&'a str]) {
        match (existing.is_empty(), incoming.is_empty()) {
            (false, false) => {
                let start_line = self.lines.len() + 1;
                self.lines.push(CONFLICT_START);
                self.lines.extend_from_slice(existing);
                self.lines.push(CONFLICT_SEPARATOR);
                self.lines.extend_from_slice(incoming);
                self.lines.push(CONFLICT_END);
                self.markers.push(ConflictMarker {
                    start_line,
                    end_line: self.lines.len(),
                });
            }
            (false, true) => self.lines.extend_from_slice(existing),
            (true, false) => self.lines.extend_from_slice(incoming),
            (true, true) => {}
        }
    }
}
