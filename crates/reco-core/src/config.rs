//! Configuration management for reco
//!
//! Handles loading and validation of reco.toml configuration files.
//!
//! ```toml
//! [backup]
//! directory = "~/.local/share/reco"
//! backup_prefix = "reco_backup"
//! buffer_prefix = "tmp_buf"
//! nofile = false
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::naming::NamingScheme;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backup naming and location
    #[serde(default)]
    pub backup: BackupConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory that receives session descriptors, snapshots and swap copies
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Prefix of session descriptor names
    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,

    /// Prefix of generated scratch buffer names
    #[serde(default = "default_buffer_prefix")]
    pub buffer_prefix: String,

    /// Mark generated buffers as not backed by a file
    #[serde(default)]
    pub nofile: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            backup_prefix: default_backup_prefix(),
            buffer_prefix: default_buffer_prefix(),
            nofile: false,
        }
    }
}

fn default_directory() -> String {
    "~".to_string()
}

fn default_backup_prefix() -> String {
    "reco_backup".to_string()
}

fn default_buffer_prefix() -> String {
    "tmp_buf".to_string()
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

impl Config {
    /// Default config location: `$XDG_CONFIG_HOME/reco/reco.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reco").join("reco.toml"))
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> crate::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that both prefixes yield usable name grammars.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backup = &self.backup;
        if backup.directory.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backup.directory must not be empty".to_string(),
            ));
        }
        for (key, prefix) in [
            ("backup.backup_prefix", &backup.backup_prefix),
            ("backup.buffer_prefix", &backup.buffer_prefix),
        ] {
            if prefix.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{key} must be a file name, got {prefix:?}"
                )));
            }
        }
        if backup.backup_prefix == backup.buffer_prefix {
            return Err(ConfigError::ValidationError(
                "backup.backup_prefix and backup.buffer_prefix must differ".to_string(),
            ));
        }

        let scheme = self
            .naming_scheme()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        // Generate one name so a prefix that cannot recognise its own output
        // fails here rather than on the first unnamed buffer.
        scheme
            .generate(1, 1)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.logging.level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "logging.level {:?} is not a known level",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Name grammars for the configured prefixes.
    pub fn naming_scheme(&self) -> Result<NamingScheme, crate::error::NamingError> {
        NamingScheme::new(&self.backup.buffer_prefix, &self.backup.backup_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.backup.directory, "~");
        assert_eq!(config.backup.backup_prefix, "reco_backup");
        assert_eq!(config.backup.buffer_prefix, "tmp_buf");
        assert!(!config.backup.nofile);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml("[backup]\nnofile = true\n").unwrap();
        assert!(config.backup.nofile);
        assert_eq!(config.backup.buffer_prefix, "tmp_buf");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.backup.backup_prefix, "reco_backup");
    }

    #[test]
    fn parse_error_is_reported() {
        let err = Config::from_toml("[backup\n").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn prefix_with_regex_metacharacters_is_rejected() {
        let err = Config::from_toml("[backup]\nbuffer_prefix = \"buf+\"\n").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn identical_prefixes_are_rejected() {
        let mut config = Config::default();
        config.backup.buffer_prefix = "same".to_string();
        config.backup.backup_prefix = "same".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn prefix_with_slash_is_rejected() {
        let mut config = Config::default();
        config.backup.backup_prefix = "dir/prefix".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = Config::from_toml("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/reco.toml")).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reco.toml");
        std::fs::write(
            &path,
            "[backup]\ndirectory = \"/var/tmp/reco\"\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backup.directory, "/var/tmp/reco");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
