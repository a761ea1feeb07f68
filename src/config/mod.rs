//! Configuration management.
//!
//! Values are resolved in order (later wins): built-in defaults, a TOML
//! file, then `CONTACT_DEDUP_*` environment variables.

use crate::services::ScoringConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application directory name under the platform config/data dirs.
const APP_DIR: &str = "contact-dedup";

/// Main configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the database and default log file.
    pub data_dir: PathBuf,
    /// Explicit database path; defaults to `{data_dir}/contacts.db`.
    pub database: Option<PathBuf>,
    /// Scoring weights and threshold.
    pub scoring: ScoringConfig,
    /// How dismissed suggestions behave on rescan.
    pub dismissal: DismissalPolicy,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Dismissal behavior for previously dismissed pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DismissalPolicy {
    /// Reopen a dismissed pair when the contacts' match-relevant data changed.
    pub resurface_on_change: bool,
}

impl Default for DismissalPolicy {
    fn default() -> Self {
        Self {
            resurface_on_change: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names fall back to `Pretty`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Filter directive such as `info` or `contact_dedup=debug`.
    pub level: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database path.
    pub database: Option<String>,
    /// Scoring section.
    pub scoring: Option<ConfigFileScoring>,
    /// Dismissal section.
    pub dismissal: Option<ConfigFileDismissal>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Scoring section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScoring {
    /// Minimum score for a suggestion.
    pub min_score: Option<u8>,
    /// Points for equal names.
    pub name_exact_weight: Option<u8>,
    /// Maximum points for similar names.
    pub name_similar_weight: Option<u8>,
    /// Similarity cut-off for similar names.
    pub name_similarity_threshold: Option<f64>,
    /// Points for a shared phone.
    pub phone_weight: Option<u8>,
    /// Points for a shared email.
    pub email_weight: Option<u8>,
    /// Points for the same organization.
    pub organization_weight: Option<u8>,
    /// Points for the same birthday.
    pub birthday_weight: Option<u8>,
    /// Minimum digits for suffix phone matching.
    pub min_phone_digits: Option<usize>,
}

/// Dismissal section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDismissal {
    /// Reopen dismissed pairs on data change.
    pub resurface_on_change: Option<bool>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".contact-dedup"),
            |d| d.data_dir().join(APP_DIR),
        );
        Self {
            data_dir,
            database: None,
            scoring: ScoringConfig::default(),
            dismissal: DismissalPolicy::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let mut config = Self::from_toml(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`].
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `CONTACT_DEDUP_CONFIG_PATH`, then the platform config dir
    /// (`contact-dedup/config.toml`). Falls back to defaults plus environment
    /// overrides when no file is found or the file is unreadable.
    #[must_use]
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("CONTACT_DEDUP_CONFIG_PATH")
            && !path.trim().is_empty()
        {
            match Self::load_from_file(Path::new(&path)) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(error = %e, path = %path, "Ignoring unreadable config"),
            }
        }

        if let Some(base_dirs) = directories::BaseDirs::new() {
            let platform_config = base_dirs.config_dir().join(APP_DIR).join("config.toml");
            if platform_config.exists() {
                match Self::load_from_file(&platform_config) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        error = %e,
                        path = %platform_config.display(),
                        "Ignoring unreadable config"
                    ),
                }
            }
        }

        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Converts a `ConfigFile` to `AppConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(database) = file.database {
            config.database = Some(PathBuf::from(database));
        }
        if let Some(scoring) = file.scoring {
            let s = &mut config.scoring;
            if let Some(v) = scoring.min_score {
                s.min_score = v;
            }
            if let Some(v) = scoring.name_exact_weight {
                s.name_exact_weight = v;
            }
            if let Some(v) = scoring.name_similar_weight {
                s.name_similar_weight = v;
            }
            if let Some(v) = scoring.name_similarity_threshold {
                s.name_similarity_threshold = v;
            }
            if let Some(v) = scoring.phone_weight {
                s.phone_weight = v;
            }
            if let Some(v) = scoring.email_weight {
                s.email_weight = v;
            }
            if let Some(v) = scoring.organization_weight {
                s.organization_weight = v;
            }
            if let Some(v) = scoring.birthday_weight {
                s.birthday_weight = v;
            }
            if let Some(v) = scoring.min_phone_digits {
                s.min_phone_digits = v;
            }
        }
        if let Some(dismissal) = file.dismissal
            && let Some(v) = dismissal.resurface_on_change
        {
            config.dismissal.resurface_on_change = v;
        }
        if let Some(logging) = file.logging {
            config.logging.level = logging.level;
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config
    }

    /// Applies `CONTACT_DEDUP_*` environment overrides.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CONTACT_DEDUP_DATA_DIR` | `data_dir` |
    /// | `CONTACT_DEDUP_DATABASE` | `database` |
    /// | `CONTACT_DEDUP_SCORE_*` | `scoring`, see [`ScoringConfig`] |
    /// | `CONTACT_DEDUP_RESURFACE_ON_CHANGE` | `dismissal.resurface_on_change` |
    /// | `CONTACT_DEDUP_LOG_FORMAT` | `logging.format` |
    /// | `CONTACT_DEDUP_LOG_FILE` | `logging.file` |
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CONTACT_DEDUP_DATA_DIR")
            && !v.trim().is_empty()
        {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CONTACT_DEDUP_DATABASE")
            && !v.trim().is_empty()
        {
            self.database = Some(PathBuf::from(v));
        }
        self.scoring = self.scoring.clone().with_env_overrides();
        if let Ok(v) = std::env::var("CONTACT_DEDUP_RESURFACE_ON_CHANGE") {
            self.dismissal.resurface_on_change = v.to_lowercase() != "false" && v != "0";
        }
        if let Ok(v) = std::env::var("CONTACT_DEDUP_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&v);
        }
        if let Ok(v) = std::env::var("CONTACT_DEDUP_LOG_FILE")
            && !v.trim().is_empty()
        {
            self.logging.file = Some(PathBuf::from(v));
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()
    }

    /// Returns the database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("contacts.db"))
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the scoring configuration.
    #[must_use]
    pub const fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Sets the dismissal policy.
    #[must_use]
    pub const fn with_dismissal(mut self, dismissal: DismissalPolicy) -> Self {
        self.dismissal = dismissal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config = AppConfig::from_toml(
            r#"
            data_dir = "/tmp/dedup"

            [scoring]
            min_score = 55
            phone_weight = 30
            name_similarity_threshold = 0.9

            [dismissal]
            resurface_on_change = false

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/dedup"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/dedup/contacts.db"));
        assert_eq!(config.scoring.min_score, 55);
        assert_eq!(config.scoring.phone_weight, 30);
        assert_eq!(config.scoring.email_weight, ScoringConfig::default().email_weight);
        assert!(!config.dismissal.resurface_on_change);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.scoring, ScoringConfig::default());
        assert!(config.dismissal.resurface_on_change);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let result = AppConfig::from_toml("scoring = 3");
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_load_from_file_rejects_out_of_range() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring]\nmin_score = 101\n").unwrap();

        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_explicit_database_path() {
        let config = AppConfig::from_toml("database = \"/var/lib/c.db\"").unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/c.db"));
    }
}
