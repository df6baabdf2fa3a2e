//! CLI configuration
//!
//! Read from `<config dir>/qspec/config.toml` unless a path is given.
//! Every field is optional in the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ast::DEFAULT_LIMIT;
use crate::error::{QspecError, QspecResult};

/// Environment variable that overrides `database_url`.
pub const DATABASE_URL_ENV: &str = "QSPEC_DATABASE_URL";

/// How query results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Sql,
}

impl FromStr for OutputFormat {
    type Err = QspecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "sql" => Ok(Self::Sql),
            other => Err(QspecError::Config(format!("unknown output format '{}'", other))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Sql => write!(f, "sql"),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QspecConfig {
    /// Database connection URL
    pub database_url: Option<String>,

    /// Path to the schema file (JSON or text)
    pub schema_path: Option<PathBuf>,

    /// Limit applied when a spec does not set one
    pub default_limit: usize,

    /// Default output format
    pub format: OutputFormat,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for QspecConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema_path: None,
            default_limit: DEFAULT_LIMIT,
            format: OutputFormat::Table,
            max_connections: 5,
        }
    }
}

impl QspecConfig {
    /// Create a new configuration builder
    pub fn builder() -> QspecConfigBuilder {
        QspecConfigBuilder::default()
    }

    /// Default location of the config file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("qspec").join("config.toml"))
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> QspecResult<Self> {
        toml::from_str(text).map_err(|e| QspecError::Config(e.to_string()))
    }

    /// Load from `path`, or from the default location.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    /// `QSPEC_DATABASE_URL` overrides the file's database URL.
    pub fn load(path: Option<&Path>) -> QspecResult<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(&p)?;
                let config = Self::from_toml(&text)?;
                tracing::debug!("Loaded config from {}", p.display());
                config
            }
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = Some(url);
        }
        Ok(config)
    }
}

/// Builder for QspecConfig
#[derive(Debug, Default)]
pub struct QspecConfigBuilder {
    config: QspecConfig,
}

impl QspecConfigBuilder {
    /// Set the database URL
    pub fn database(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Set the schema path
    pub fn schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.schema_path = Some(path.into());
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.config.max_connections = n;
        self
    }

    /// Build the configuration
    pub fn build(self) -> QspecConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = QspecConfig::from_toml(
            r#"
            schema_path = "db/schema.json"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.schema_path, Some(PathBuf::from("db/schema.json")));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_malformed_file() {
        let err = QspecConfig::from_toml("format = [").unwrap_err();
        assert!(matches!(err, QspecError::Config(_)));

        let err = QspecConfig::from_toml("format = \"xml\"").unwrap_err();
        assert!(matches!(err, QspecError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = QspecConfig::builder()
            .database("sqlite::memory:")
            .schema("schema.qs")
            .default_limit(25)
            .format(OutputFormat::Sql)
            .max_connections(1)
            .build();
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.default_limit, 25);
        assert_eq!(config.format, OutputFormat::Sql);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = QspecConfig::load(Some(Path::new("/nonexistent/qspec.toml"))).unwrap();
        assert_eq!(config.default_limit, QspecConfig::default().default_limit);
        assert_eq!(config.schema_path, None);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
