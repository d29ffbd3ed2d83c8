//! Date-based reconciliation policy.
//!
//! Decides whether an incoming note should be skipped, should overwrite the
//! existing copy, or should be stored next to it. Rules are evaluated in
//! order and the first match wins:
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Bodies are byte-for-byte equal | `Skip` |
//! | Sync reference known, both sides changed since | `Rename` |
//! | Sync reference known, only incoming changed | `Overwrite` |
//! | Sync reference known, only existing changed | `Rename` |
//! | Sync reference known, neither changed | `Skip` |
//! | No reference, incoming strictly newer | `Overwrite` |
//! | No reference, anything else | `Rename` |
//!
//! Timestamps from the two storage systems are never compared with each
//! other when a sync reference exists: each side is only compared with the
//! last-synced point.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dates::{first_present, Clock};
use crate::models::{Decision, ExistingFileInfo, NormalizedNote};

/// The five reference points the policy reasons about, after fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub incoming_created: DateTime<Utc>,
    pub incoming_updated: DateTime<Utc>,
    pub existing_created: Option<DateTime<Utc>>,
    pub existing_updated: Option<DateTime<Utc>>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl ResolvedDates {
    /// Apply the fallback chains for every field.
    ///
    /// Undated incoming notes are treated as modified at `clock.now()`.
    pub fn resolve(
        incoming: &NormalizedNote,
        existing: &ExistingFileInfo,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        Self {
            incoming_created: incoming.created.unwrap_or(now),
            incoming_updated: incoming.updated.unwrap_or(now),
            existing_created: first_present([existing.created_date, existing.fs_created_date]),
            existing_updated: first_present([
                existing.fs_updated_date,
                existing.updated_date,
                existing.fs_created_date,
            ]),
            last_synced: first_present([existing.last_synced_date, existing.fs_created_date]),
        }
    }
}

/// Stateless reconciliation policy.
pub struct ReconciliationPolicy;

impl ReconciliationPolicy {
    /// Decide what to do with `incoming` given the note already stored.
    ///
    /// Total over every combination of present and absent dates.
    pub fn decide(
        incoming: &NormalizedNote,
        existing: &ExistingFileInfo,
        clock: &dyn Clock,
    ) -> Decision {
        if incoming.body == existing.content {
            debug!(title = %incoming.title, "content identical, skipping");
            return Decision::Skip;
        }

        let dates = ResolvedDates::resolve(incoming, existing, clock);
        let decision = Self::decide_from_dates(&dates);
        debug!(
            title = %incoming.title,
            incoming_updated = %dates.incoming_updated,
            existing_updated = ?dates.existing_updated,
            last_synced = ?dates.last_synced,
            %decision,
            "reconciliation decision"
        );
        decision
    }

    /// The date rules alone, for bodies already known to differ.
    pub fn decide_from_dates(dates: &ResolvedDates) -> Decision {
        match (dates.last_synced, dates.existing_updated) {
            (Some(last_synced), Some(existing_updated)) => {
                let incoming_modified = dates.incoming_updated > last_synced;
                let existing_modified = existing_updated > last_synced;
                match (incoming_modified, existing_modified) {
                    (true, true) => Decision::Rename,
                    (true, false) => Decision::Overwrite,
                    (false, true) => Decision::Rename,
                    (false, false) => Decision::Skip,
                }
            }
            (_, Some(existing_updated)) if dates.incoming_updated > existing_updated => {
                Decision::Overwrite
            }
            _ => Decision::Rename,
        }
    }
}
