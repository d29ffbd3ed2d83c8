//! Tables for sync results and dry-run plans.

use std::path::Path;

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use notesync_core::models::NoteOutcome;
use notesync_core::sync_engine::{PlannedAction, PlannedStep, SyncStats};

use crate::style;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

/// Show `path` relative to the notes directory when possible.
fn short_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Per-note results of a sync cycle.
pub fn outcomes_table(stats: &SyncStats, base: &Path) -> Table {
    let mut table = new_table(vec!["Title", "Action", "File"]);
    for report in &stats.notes {
        let (label, file) = match (&report.outcome, &report.error) {
            (Some(outcome), _) => {
                let mut label = style::action(outcome.label());
                if matches!(outcome, NoteOutcome::Merged { has_conflicts: true, .. }) {
                    label.push_str(" (conflicts)");
                }
                (label, short_path(outcome.path(), base))
            }
            (None, error) => (
                style::action("failed"),
                error.clone().unwrap_or_default(),
            ),
        };
        table.add_row(vec![Cell::new(&report.title), Cell::new(label), Cell::new(file)]);
    }
    table
}

/// Counts by outcome.
pub fn summary_table(stats: &SyncStats) -> Table {
    let mut table = new_table(vec!["Outcome", "Notes"]);
    for (label, count) in [
        ("created", stats.created),
        ("overwritten", stats.overwritten),
        ("renamed", stats.renamed),
        ("merged", stats.merged),
        ("skipped", stats.skipped),
        ("failed", stats.failed),
    ] {
        table.add_row(vec![Cell::new(style::action(label)), Cell::new(count)]);
    }
    table
}

/// What a dry run would do.
pub fn plan_table(plan: &[PlannedAction], base: &Path) -> Table {
    let mut table = new_table(vec!["Title", "Action", "File"]);
    for action in plan {
        let mut label = style::action(action.step.label());
        if action.step == (PlannedStep::Merge { has_conflicts: true }) {
            label.push_str(" (conflicts)");
        }
        table.add_row(vec![
            Cell::new(&action.title),
            Cell::new(label),
            Cell::new(short_path(&action.path, base)),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use notesync_core::sync_engine::NoteReport;

    #[test]
    fn test_short_path() {
        let base = Path::new("/vault/Imported");
        assert_eq!(short_path(Path::new("/vault/Imported/a.md"), base), "a.md");
        assert_eq!(short_path(Path::new("/elsewhere/b.md"), base), "/elsewhere/b.md");
    }

    #[test]
    fn test_tables_list_every_note() {
        let base = PathBuf::from("/vault/Imported");
        let stats = SyncStats {
            created: 1,
            failed: 1,
            notes: vec![
                NoteReport {
                    title: "Groceries".into(),
                    outcome: Some(NoteOutcome::Created {
                        path: base.join("Groceries.md"),
                    }),
                    error: None,
                },
                NoteReport {
                    title: "Broken".into(),
                    outcome: None,
                    error: Some("permission denied".into()),
                },
            ],
            ..Default::default()
        };

        let rendered = outcomes_table(&stats, &base).to_string();
        assert!(rendered.contains("Groceries.md"));
        assert!(rendered.contains("permission denied"));
        assert!(summary_table(&stats).to_string().contains("overwritten"));

        let plan = vec![
            PlannedAction {
                title: "Groceries".into(),
                path: base.join("Groceries.md"),
                step: PlannedStep::Skip,
            },
            PlannedAction {
                title: "Journal".into(),
                path: base.join("Journal.md"),
                step: PlannedStep::Merge { has_conflicts: true },
            },
        ];
        let rendered = plan_table(&plan, &base).to_string();
        assert!(rendered.contains("skip"));
        assert!(rendered.contains("merge"));
        assert!(rendered.contains("(conflicts)"));
    }
}
