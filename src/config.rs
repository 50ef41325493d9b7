// ⚙️ Configuration
// TOML file with a default for every field, so an absent file is a valid
// configuration. Environment overrides apply after the file is parsed:
//
//   UNIFY_DATABASE_PATH → database.path
//   UNIFY_LOG_LEVEL     → logging.level

use crate::db::DEFAULT_PAGE_SIZE;
use crate::error::{Result, UnificationError};
use crate::parser::{InvalidDatePolicy, ParseOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "unify.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifyConfig {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("unification.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// What to do with a date cell that does not parse
    pub invalid_dates: InvalidDatePolicy,

    /// Rows between progress log lines (0 disables them)
    pub progress_interval: usize,

    /// Skip rows whose identity fields are empty instead of storing them
    pub skip_invalid: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            invalid_dates: InvalidDatePolicy::default(),
            progress_interval: 1000,
            skip_invalid: true,
        }
    }
}

impl ImportConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            invalid_dates: self.invalid_dates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows fetched per page by the SQLite record source
    pub page_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl UnifyConfig {
    /// Load `path`, falling back to defaults when the file does not exist,
    /// then apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                UnificationError::Configuration(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&contents)?
        } else {
            UnifyConfig::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `UNIFY_*` overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("UNIFY_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("UNIFY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(UnificationError::Configuration(format!(
                "invalid log level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.export.page_size == 0 {
            return Err(UnificationError::Configuration(
                "export.page_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = UnifyConfig::default();

        assert_eq!(config.database.path, PathBuf::from("unification.db"));
        assert_eq!(config.import.invalid_dates, InvalidDatePolicy::Null);
        assert_eq!(config.import.progress_interval, 1000);
        assert!(config.import.skip_invalid);
        assert_eq!(config.export.page_size, 500);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = UnifyConfig::from_toml(
            r#"
            [import]
            invalid_dates = "flag"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.import.invalid_dates, InvalidDatePolicy::Flag);
        assert_eq!(config.import.progress_interval, 1000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.import.parse_options().invalid_dates,
            InvalidDatePolicy::Flag
        );
    }

    #[test]
    fn test_bad_toml_is_configuration_error() {
        let err = UnifyConfig::from_toml("[import]\nprogress_interval = \"often\"").unwrap_err();
        assert!(matches!(err, UnificationError::Configuration(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = UnifyConfig::default();
        config.apply_overrides(|name| match name {
            "UNIFY_DATABASE_PATH" => Some("/tmp/other.db".to_string()),
            "UNIFY_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = UnifyConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = UnifyConfig::default();
        config.export.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[export]\npage_size = 50").unwrap();

        let config = UnifyConfig::load(file.path()).unwrap();
        assert_eq!(config.export.page_size, 50);
    }
}
