//! TOML-based configuration for notesync.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration that syncs into `~/Notes/Imported`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where synced notes are stored.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Vault location and file naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault root directory. A leading `~` is expanded to the home directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Sub-folder (relative to `root`) that receives synced notes.
    #[serde(default = "default_folder")]
    pub folder: String,

    /// File extension of note files, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("~/Notes")
}
fn default_folder() -> String {
    "Imported".into()
}
fn default_extension() -> String {
    "md".into()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            folder: default_folder(),
            extension: default_extension(),
        }
    }
}

impl VaultConfig {
    /// `root` with a leading `~` replaced by the user's home directory.
    pub fn expanded_root(&self) -> PathBuf {
        expand_home(&self.root)
    }
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// How a `rename` decision is carried out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Keep both copies as separate files.
    #[default]
    Rename,
    /// Merge both bodies into the existing file, marking conflicting regions.
    Merge,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rename => write!(f, "rename"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// What to do when both copies diverged.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// Glob patterns to leave out, matched against each file's path
    /// relative to the source directory with `/` separators. `*.tmp.md`
    /// only matches at the top level; use `**/*.tmp.md` for any depth.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            ignore_patterns: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "vault.root".into(),
                detail: "vault root must not be empty".into(),
            });
        }
        if self.vault.extension.is_empty() || self.vault.extension.contains('.') {
            return Err(ConfigError::InvalidValue {
                field: "vault.extension".into(),
                detail: "extension must be non-empty and given without a dot".into(),
            });
        }
        if Path::new(&self.vault.folder).is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "vault.folder".into(),
                detail: "folder must be relative to the vault root".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.sync.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "sync.log_level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Default location of the config file (`<config dir>/notesync/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notesync")
            .join("config.toml")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
