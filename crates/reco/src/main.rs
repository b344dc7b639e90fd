//! reco - editor crash-recovery backup maintenance
//!
//! Works on the backup directory shared by every editor instance: lists what
//! is there, shows which crashed sessions can be resumed, diffs or restores
//! pre-recovery snapshots, and removes leftovers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reco_core::config::Config;
use reco_core::diff::{self, SnapshotDiff};
use reco_core::ledger::{CleanupLedger, CleanupReport};
use reco_core::logging::init_logging;
use reco_core::naming::NamingScheme;
use reco_core::store::{self, ArtifactKind, BackupArtifact, BackupStore};
use serde::Serialize;

/// reco - editor crash-recovery backups
#[derive(Parser, Debug)]
#[command(name = "reco")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to reco.toml (defaults to the user config directory)
    #[arg(short, long, global = true, env = "RECO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every backup artifact in the backup directory
    Status,

    /// List session descriptors left behind by crashed editors
    Sessions,

    /// Show what recovery changed in a file
    Diff {
        /// File that was recovered
        file: PathBuf,
    },

    /// Print or write the contents a file had before recovery
    Restore {
        /// File that was recovered
        file: PathBuf,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove backup artifacts
    Clean {
        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Remove even while a running editor owns a session descriptor
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, cli.format);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    init_logging(&config.logging).context("failed to initialize logging")?;

    let scheme = config.naming_scheme().map_err(reco_core::Error::from)?;
    let store = BackupStore::open(&config.backup.directory).map_err(reco_core::Error::from)?;
    tracing::debug!(root = %store.root().display(), command = ?cli.command, "reco starting");

    match &cli.command {
        Commands::Status => status(&store, &scheme, cli.format),
        Commands::Sessions => sessions(&store, &scheme, cli.format),
        Commands::Diff { file } => diff_file(&store, file, cli.format),
        Commands::Restore { file, output } => restore(&store, file, output.as_deref()),
        Commands::Clean { dry_run, force } => {
            clean(&store, &scheme, *dry_run, *force, cli.format)
        }
    }
}

fn report_error(err: &anyhow::Error, format: OutputFormat) {
    let remediation = err
        .downcast_ref::<reco_core::Error>()
        .and_then(reco_core::Error::remediation);
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "ok": false,
                "error": format!("{err:#}"),
                "remediation": remediation.map(|r| r.summary),
            });
            eprintln!("{value}");
        }
        OutputFormat::Plain => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation {
                eprint!("{}", remediation.render_plain());
            }
        }
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Serialize)]
struct ArtifactRow<'a> {
    #[serde(flatten)]
    artifact: &'a BackupArtifact,
    modified: Option<String>,
    owner_alive: Option<bool>,
}

impl<'a> ArtifactRow<'a> {
    fn new(artifact: &'a BackupArtifact) -> Self {
        Self {
            artifact,
            modified: artifact.modified.map(format_time),
            owner_alive: artifact.owner_pid.map(store::process_alive),
        }
    }
}

fn list(store: &BackupStore, scheme: &NamingScheme) -> Result<Vec<BackupArtifact>> {
    Ok(store
        .list_artifacts(scheme)
        .map_err(reco_core::Error::from)?)
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

fn status(store: &BackupStore, scheme: &NamingScheme, format: OutputFormat) -> Result<()> {
    let artifacts = list(store, scheme)?;
    let rows: Vec<_> = artifacts.iter().map(ArtifactRow::new).collect();

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "directory": store.root(),
            "count": rows.len(),
            "artifacts": rows,
        }));
    }

    println!("Backup directory: {}", store.root().display());
    if rows.is_empty() {
        println!("No backup artifacts.");
        return Ok(());
    }
    println!("{:<8}  {:>8}  {:>10}  {:<20}  PATH", "KIND", "OWNER", "SIZE", "MODIFIED");
    for row in &rows {
        let owner = match (row.artifact.owner_pid, row.owner_alive) {
            (Some(pid), Some(true)) => format!("{pid}*"),
            (Some(pid), _) => pid.to_string(),
            (None, _) => "-".to_string(),
        };
        let shown = row.artifact.origin.as_ref().unwrap_or(&row.artifact.path);
        println!(
            "{:<8}  {:>8}  {:>10}  {:<20}  {}",
            row.artifact.kind.as_str(),
            owner,
            row.artifact.size,
            row.modified.as_deref().unwrap_or("-"),
            shown.display()
        );
    }
    println!("{} artifact(s); * marks a running owner", rows.len());
    Ok(())
}

fn sessions(store: &BackupStore, scheme: &NamingScheme, format: OutputFormat) -> Result<()> {
    let artifacts = list(store, scheme)?;
    let resumable: Vec<_> = artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::SessionSnapshot)
        .map(ArtifactRow::new)
        .filter(|row| row.owner_alive == Some(false))
        .collect();

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "count": resumable.len(),
            "sessions": resumable,
        }));
    }

    if resumable.is_empty() {
        println!("No crashed sessions to resume.");
        return Ok(());
    }
    for row in &resumable {
        println!(
            "pid {:<8}  {}  {}",
            row.artifact.owner_pid.unwrap_or_default(),
            row.modified.as_deref().unwrap_or("-"),
            row.artifact.path.display()
        );
    }
    println!("Source a descriptor in the editor to resume that session.");
    Ok(())
}

// =============================================================================
// Snapshots
// =============================================================================

fn snapshot_for(store: &BackupStore, file: &Path) -> Result<(PathBuf, PathBuf)> {
    let file = std::path::absolute(file)
        .with_context(|| format!("cannot resolve {}", file.display()))?;
    match store.snapshot_of(&file) {
        Some(snapshot) => Ok((snapshot, file)),
        None => Err(reco_core::Error::SnapshotMissing { path: file }.into()),
    }
}

fn diff_file(store: &BackupStore, file: &Path, format: OutputFormat) -> Result<()> {
    let (snapshot, file) = snapshot_for(store, file)?;
    let result: SnapshotDiff = diff::diff_files(&snapshot, &file)
        .with_context(|| format!("cannot diff {}", file.display()))?;

    if format == OutputFormat::Json {
        return print_json(&result);
    }
    if result.is_unchanged() {
        println!("{} is unchanged since the pre-recovery snapshot.", file.display());
    } else {
        print!("{}", result.unified);
    }
    Ok(())
}

fn restore(store: &BackupStore, file: &Path, output: Option<&Path>) -> Result<()> {
    let (snapshot, file) = snapshot_for(store, file)?;
    if let Some(output) = output {
        store::copy_preserving(&snapshot, output)
            .with_context(|| format!("cannot write {}", output.display()))?;
        tracing::info!(
            artifact = %snapshot.display(),
            path = %output.display(),
            "restored pre-recovery snapshot"
        );
        eprintln!("Restored {} to {}", file.display(), output.display());
        return Ok(());
    }
    let bytes = std::fs::read(&snapshot)
        .with_context(|| format!("cannot read {}", snapshot.display()))?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}

// =============================================================================
// Cleanup
// =============================================================================

#[derive(Serialize)]
struct CleanSummary<'a> {
    dry_run: bool,
    removed: &'a [PathBuf],
    missing: &'a [PathBuf],
    failed: Vec<FailedRemoval<'a>>,
}

#[derive(Serialize)]
struct FailedRemoval<'a> {
    path: &'a Path,
    error: &'a str,
}

fn clean(
    store: &BackupStore,
    scheme: &NamingScheme,
    dry_run: bool,
    force: bool,
    format: OutputFormat,
) -> Result<()> {
    let artifacts = list(store, scheme)?;
    let live: Vec<u32> = artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::SessionSnapshot)
        .filter_map(|a| a.owner_pid)
        .filter(|pid| store::process_alive(*pid))
        .collect();
    if !live.is_empty() && !force {
        bail!(
            "refusing to clean: editor process(es) {live:?} still own session descriptors (use --force to override)"
        );
    }

    let mut ledger = CleanupLedger::new();
    for artifact in &artifacts {
        ledger.append(&artifact.path);
    }

    let report = if dry_run {
        CleanupReport {
            removed: ledger.iter().map(Path::to_path_buf).collect(),
            ..CleanupReport::default()
        }
    } else {
        ledger.remove_all()
    };

    let summary = CleanSummary {
        dry_run,
        removed: &report.removed,
        missing: &report.missing,
        failed: report
            .failed
            .iter()
            .map(|(path, error)| FailedRemoval { path, error })
            .collect(),
    };

    if format == OutputFormat::Json {
        print_json(&summary)?;
    } else {
        let verb = if dry_run { "Would remove" } else { "Removed" };
        for path in summary.removed {
            println!("{verb} {}", path.display());
        }
        for failed in &summary.failed {
            println!("Failed {}: {}", failed.path.display(), failed.error);
        }
        println!("{verb} {} artifact(s).", summary.removed.len());
    }

    if report.is_clean() {
        Ok(())
    } else {
        bail!("{} artifact(s) could not be removed", report.failed.len())
    }
}
