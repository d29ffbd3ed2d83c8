//! notesync command-line tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! syncing a directory of exported notes into the vault, and inspecting a
//! single reconciliation decision or merge.

mod report;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use notesync_core::config::AppConfig;
use notesync_core::conflict::{Merger, ReconciliationPolicy, ResolvedDates};
use notesync_core::dates::SystemClock;
use notesync_core::frontmatter::extract_frontmatter;
use notesync_core::source::{parse_note, MarkdownSource};
use notesync_core::sync_engine::{NoteReport, PlannedAction, ProgressCallback, SyncEngine};
use notesync_core::vault::Vault;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// notesync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "notesync",
    version,
    about = "Sync exported notes into a Markdown vault without losing local edits"
)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Defaults to `<config dir>/notesync/config.toml`. A missing default
    /// file means built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,

    /// Reconcile a directory of exported notes into the vault.
    Sync {
        /// Directory holding the exported notes.
        #[arg(short, long)]
        source: PathBuf,

        /// Only print what would happen.
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the decision for one incoming note against one stored file.
    Decide {
        /// The incoming note.
        #[arg(long)]
        incoming: PathBuf,

        /// The stored note.
        #[arg(long)]
        existing: PathBuf,
    },

    /// Merge the bodies of two notes, marking conflicting regions.
    Merge {
        /// The stored note.
        existing: PathBuf,

        /// The incoming note.
        incoming: PathBuf,

        /// Write the merged body here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            AppConfig::load_from_file(&config_path)
                .ok()
                .map(|c| c.sync.log_level)
        })
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli, &config_path).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config_path: &Path) -> Result<ExitCode> {
    let explicit_config = cli.config.is_some();
    match cli.command {
        Commands::Init { output } => {
            cmd_init(output.as_deref().unwrap_or(config_path))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate => {
            cmd_validate(config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync {
            source,
            dry_run,
            json,
        } => {
            let config = load_config(config_path, explicit_config)?;
            cmd_sync(&config, &source, dry_run, json).await
        }
        Commands::Decide { incoming, existing } => {
            let config = load_config(config_path, explicit_config)?;
            cmd_decide(&config, &incoming, &existing)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Merge {
            existing,
            incoming,
            output,
        } => {
            let has_conflicts = cmd_merge(&existing, &incoming, output.as_deref())?;
            Ok(if has_conflicts {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load and validate the config. Only the implicit default path may be absent.
fn load_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# notesync configuration

[vault]
# Vault root; a leading ~ is expanded to the home directory.
root = "~/Notes"
# Sub-folder of the vault that receives synced notes.
folder = "Imported"
# Note file extension, without the dot.
extension = "md"

[sync]
# What to do when both copies changed since the last sync:
#   "rename" keeps both copies, "merge" merges them into one file.
conflict_strategy = "rename"
# Glob patterns, relative to the source directory, to leave out.
ignore_patterns = []
log_level = "info"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Point [vault] root at your notes vault");
    println!(
        "  2. Validate with: notesync validate --config {}",
        output.display()
    );
    println!(
        "  3. Sync with: notesync sync --config {} --source <export dir>",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let vault = Vault::from_config(&config.vault);
    println!();
    println!("Configuration summary:");
    println!("  Notes folder     : {}", vault.notes_dir().display());
    println!(
        "  Folder exists    : {}",
        if vault.notes_dir().is_dir() {
            "yes"
        } else {
            "no (created on first sync)"
        }
    );
    println!("  Extension        : .{}", config.vault.extension);
    println!("  Conflict strategy: {}", config.sync.conflict_strategy);
    println!(
        "  Ignore patterns  : {}",
        if config.sync.ignore_patterns.is_empty() {
            "none".to_string()
        } else {
            config.sync.ignore_patterns.join(", ")
        }
    );
    println!("  Log level        : {}", config.sync.log_level);

    Ok(())
}

async fn cmd_sync(config: &AppConfig, source: &Path, dry_run: bool, json: bool) -> Result<ExitCode> {
    let notes = MarkdownSource::new(
        source,
        config.vault.extension.clone(),
        config.sync.ignore_patterns.clone(),
    )
    .load()
    .context("failed to load source notes")?;

    let engine = Arc::new(
        SyncEngine::from_config(config, Arc::new(SystemClock))
            .context("invalid configuration")?,
    );
    let notes_dir = engine.vault().notes_dir().to_path_buf();

    if dry_run {
        let plan = notes
            .iter()
            .map(|note| engine.plan(note))
            .collect::<Result<Vec<PlannedAction>, _>>()
            .context("failed to plan sync")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!();
            println!(
                "{}",
                style::header(&format!("Dry run: {} notes from {}", plan.len(), source.display()))
            );
            println!();
            println!("{}", report::plan_table(&plan, &notes_dir));
            println!("{}", style::dim("Nothing was written."));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let bar = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(notes.len() as u64)
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    let progress_bar = bar.clone();
    let progress: ProgressCallback = Arc::new(move |note_report: &NoteReport| {
        progress_bar.set_message(note_report.title.clone());
        progress_bar.inc(1);
    });

    let stats = engine
        .run_sync_cycle(notes, Some(progress))
        .await
        .context("sync cycle failed")?;
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!();
        println!(
            "{}",
            style::header(&format!("Synced {} notes into {}", stats.total(), notes_dir.display()))
        );
        println!();
        println!("{}", report::outcomes_table(&stats, &notes_dir));
        println!("{}", report::summary_table(&stats));
        if stats.conflicts > 0 {
            println!(
                "{}",
                style::warn(&format!(
                    "{} merged notes contain conflict markers",
                    stats.conflicts
                ))
            );
        }
    }

    if stats.failed > 0 {
        eprintln!(
            "{}",
            style::error(&format!("{} notes failed to sync", stats.failed))
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_decide(config: &AppConfig, incoming: &Path, existing: &Path) -> Result<()> {
    let note = parse_note(incoming, &read_file(incoming)?)
        .with_context(|| format!("{} has no usable title", incoming.display()))?;
    let stored = Vault::from_config(&config.vault)
        .inspect(existing)?
        .with_context(|| format!("{} does not exist", existing.display()))?;

    let clock = SystemClock;
    let dates = ResolvedDates::resolve(&note, &stored, &clock);
    let decision = ReconciliationPolicy::decide(&note, &stored, &clock);

    let show = |value: Option<chrono::DateTime<chrono::Utc>>| {
        value
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    };

    println!();
    println!("{}", style::header(&format!("Note: {}", note.title)));
    println!();
    println!("  Incoming created : {}", dates.incoming_created.to_rfc3339());
    println!("  Incoming updated : {}", dates.incoming_updated.to_rfc3339());
    println!("  Existing created : {}", show(dates.existing_created));
    println!("  Existing updated : {}", show(dates.existing_updated));
    println!("  Last synced      : {}", show(dates.last_synced));
    println!(
        "  Content          : {}",
        if note.body == stored.content {
            "identical"
        } else {
            "different"
        }
    );
    println!();
    match stored.title.as_deref().filter(|t| *t != note.title) {
        Some(owner) => {
            println!("  Stored note      : {}", owner);
            println!("  Decision         : {}", style::action("rename"));
        }
        None => println!("  Decision         : {}", style::action(&decision.to_string())),
    }
    println!();

    Ok(())
}

/// Returns whether conflict blocks remain in the merged body.
fn cmd_merge(existing: &Path, incoming: &Path, output: Option<&Path>) -> Result<bool> {
    let existing_body = extract_frontmatter(&read_file(existing)?).body;
    let incoming_body = extract_frontmatter(&read_file(incoming)?).body;

    let result = Merger::merge(&existing_body, &incoming_body);

    match output {
        Some(path) => {
            std::fs::write(path, &result.merged_content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                style::success(&format!("Merged body written to {}", path.display()))
            );
        }
        None => println!("{}", result.merged_content),
    }

    for marker in &result.conflict_markers {
        eprintln!(
            "{}",
            style::warn(&format!(
                "conflict at lines {}-{}",
                marker.start_line, marker.end_line
            ))
        );
    }
    Ok(result.has_conflicts)
}
