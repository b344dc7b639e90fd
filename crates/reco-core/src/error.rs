//! Error types for reco-core

use std::fmt::Write;
use std::path::PathBuf;

use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for reco-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Buffer/session name grammar errors
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// Backup directory errors
    #[error("Backup store error: {0}")]
    Store(#[from] StoreError),

    /// Editor primitive failures
    #[error("Editor error: {0}")]
    Host(#[from] HostError),

    /// A diff/revert was requested but no pre-recovery snapshot was taken
    #[error("no pre-recovery snapshot found for {}", path.display())]
    SnapshotMissing { path: PathBuf },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Config(err) => Some(err.remediation()),
            Self::Naming(err) => Some(err.remediation()),
            Self::Store(err) => Some(err.remediation()),
            Self::Host(_) => None,
            Self::SnapshotMissing { path } => Some(
                Remediation::new(format!(
                    "No backup of {} was taken before recovery, so there is nothing to compare against.",
                    path.display()
                ))
                .command("List backups", "reco status")
                .alternative("Snapshots only exist for files that had a conflicting swap file."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .command("List backups", "reco status")
                    .alternative("Verify the backup directory exists and is writable."),
            ),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\""))
            .alternative("Ensure the file is readable by the current user."),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the TOML syntax and retry.")
                .alternative("Remove unknown keys; every section is optional."),
            Self::ValidationError(_) => Remediation::new(
                "Config validation failed. Fix the reported value and retry.",
            )
            .alternative("Prefixes may only use letters, digits, '_' and '.'."),
        }
    }
}

/// Name grammar errors
#[derive(Error, Debug)]
pub enum NamingError {
    /// The recognition pattern built from a prefix does not compile
    #[error("invalid {kind} pattern for prefix {prefix:?}: {reason}")]
    InvalidPattern {
        kind: &'static str,
        prefix: String,
        reason: String,
    },

    /// A freshly generated name is not recognised by its own grammar
    #[error("generated name {name:?} does not match the {kind} grammar")]
    GrammarMismatch { kind: &'static str, name: String },
}

impl NamingError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidPattern { prefix, .. } | Self::GrammarMismatch { name: prefix, .. } => {
                Remediation::new(format!(
                    "The configured prefix produces names that cannot be recognised again ({prefix})."
                ))
                .command("Show config", "reco status --format json")
                .alternative("Use a prefix made of letters, digits, '_' and '.'.")
            }
        }
    }
}

/// Backup directory errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backup directory {} could not be created: {source}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup path {} exists but is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to read backup directory {}: {source}", path.display())]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::CreateFailed { path, .. } => Remediation::new(format!(
                "Create {} or point [backup].directory somewhere writable.",
                path.display()
            ))
            .command("Check parent", format!("ls -ld \"{}\"", path.display())),
            Self::NotADirectory { path } => Remediation::new(format!(
                "{} is a file; move it away or choose another backup directory.",
                path.display()
            ))
            .command("Inspect", format!("ls -l \"{}\"", path.display())),
            Self::ListFailed { path, .. } => Remediation::new(format!(
                "Check read permissions on {}.",
                path.display()
            ))
            .command("Inspect", format!("ls -ld \"{}\"", path.display())),
        }
    }
}

/// Failures reported by the editor host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("buffer {0} does not exist")]
    NoSuchBuffer(u32),

    #[error("editor command failed: {0}")]
    CommandFailed(String),
}
