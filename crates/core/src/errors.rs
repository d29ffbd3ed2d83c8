//! Error types for the notesync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.
//!
//! The reconciliation policy and the content merger are total functions and
//! have no error type of their own.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from reading or writing notes in the vault.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading an existing note failed.
    #[error("failed to read note at '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a note failed.
    #[error("failed to write note at '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No free file name could be found for a renamed copy.
    #[error("no free file name next to '{0}'")]
    NoFreeName(String),
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors from loading incoming notes.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source directory does not exist or is not a directory.
    #[error("note source directory not found: {0}")]
    DirectoryNotFound(String),

    /// A source file could not be read.
    #[error("failed to read source note '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync cycle is already running on this engine.
    #[error("sync already in progress (started at {started_at})")]
    AlreadyRunning { started_at: String },

    /// A background reconciliation task panicked or was cancelled.
    #[error("reconciliation task failed: {0}")]
    TaskFailed(String),

    /// Underlying storage error while reconciling a note.
    #[error("sync storage error: {0}")]
    StorageError(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
