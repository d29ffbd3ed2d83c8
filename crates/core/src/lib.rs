//! notesync core library.
//!
//! This crate reconciles notes arriving from an external export with the
//! copies already stored in a local markdown vault: date-based
//! reconciliation policy, line-level merging, metadata preamble handling,
//! vault storage, and the sync engine that ties them together.

pub mod config;
pub mod conflict;
pub mod dates;
pub mod errors;
pub mod frontmatter;
pub mod models;
pub mod source;
pub mod sync_engine;
pub mod vault;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{Merger, ReconciliationPolicy};
pub use models::{Decision, ExistingFileInfo, NormalizedNote};
pub use sync_engine::SyncEngine;
pub use vault::Vault;
