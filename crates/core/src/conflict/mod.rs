//! Conflict handling between an incoming note and the stored copy.
//!
//! The conflict subsystem is responsible for:
//! 1. **Policy** -- deciding from content and dates whether to skip,
//!    overwrite, or keep both copies.
//! 2. **Merging** -- folding two diverged bodies into one, marking the
//!    regions where both sides changed.

pub mod merger;
pub mod policy;

pub use merger::{ConflictMarker, MergeResult, Merger};
pub use policy::{ReconciliationPolicy, ResolvedDates};
