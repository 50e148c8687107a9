use crate::domain::LogLevel;
use crate::error::LogError;
use crate::pipeline::{DeliveryMode, PipelineOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_FILE_PATH: &str = "./logs/app.log";
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;
const DEFAULT_SQL_TABLE: &str = "logs";
const DEFAULT_SQL_DRIVER: &str = "mysql";

/// Tag selecting one of the supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Sql,
}

impl FromStr for BackendKind {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "sql" => Ok(BackendKind::Sql),
            _ => Err(LogError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => f.write_str("file"),
            BackendKind::Sql => f.write_str("sql"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    pub path: PathBuf,
    /// Size hint in megabytes. Recorded only; the file backend does not rotate.
    pub max_size_mb: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FILE_PATH),
            max_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
        }
    }
}

impl FileSettings {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.path.as_os_str().is_empty() {
            return Err(LogError::InvalidSettings(
                "file path cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlSettings {
    /// e.g. `user:password@tcp(localhost:3306)/dbname`
    pub dsn: String,
    pub table: String,
    /// `mysql`, `postgres`, `sqlite`
    pub driver: String,
}

impl SqlSettings {
    pub fn with_dsn(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            table: DEFAULT_SQL_TABLE.to_string(),
            driver: DEFAULT_SQL_DRIVER.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.dsn.trim().is_empty() {
            return Err(LogError::InvalidSettings("SQL dsn cannot be empty".into()));
        }
        if self.table.trim().is_empty() {
            return Err(LogError::InvalidSettings(
                "SQL table name cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Backend selection together with the settings that backend needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    File(FileSettings),
    Sql(SqlSettings),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::File(_) => BackendKind::File,
            BackendConfig::Sql(_) => BackendKind::Sql,
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        match self {
            BackendConfig::File(settings) => settings.validate(),
            BackendConfig::Sql(settings) => settings.validate(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::File(FileSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub backend: BackendConfig,
    /// Deliver through the bounded queue and background consumer.
    pub async_delivery: bool,
    /// Recorded for callers; not applied as a filter.
    pub default_level: Option<LogLevel>,
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            async_delivery: false,
            default_level: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.async_delivery = true;
        self
    }

    /// Delivery mode for the pipeline, using the tracing dead-letter sink.
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.async_delivery {
            DeliveryMode::Asynchronous(PipelineOptions {
                capacity: self.queue_capacity,
                submit_timeout: self.submit_timeout,
                ..PipelineOptions::default()
            })
        } else {
            DeliveryMode::Synchronous
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        self.backend.validate()?;
        if self.queue_capacity == 0 {
            return Err(LogError::InvalidSettings(
                "queue capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Load from `RASK_LOG_*` environment variables.
    pub fn from_env() -> Result<Self, LogError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup using the environment variable names.
    ///
    /// `RASK_LOG_SQL_DSN_FILE` takes precedence over `RASK_LOG_SQL_DSN` and
    /// names a file holding the DSN (Docker secrets).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str| -> Result<Option<u64>, LogError> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|e| LogError::Config(format!("{key}: {e}")))
                })
                .transpose()
        };

        let async_delivery = lookup("RASK_LOG_ASYNC")
            .map(|raw| parse_bool("RASK_LOG_ASYNC", &raw))
            .transpose()?;

        let queue_capacity = parse_u64("RASK_LOG_QUEUE_CAPACITY")?
            .map(|n| usize::try_from(n).map_err(|e| LogError::Config(e.to_string())))
            .transpose()?;

        let raw = RawConfig {
            backend: lookup("RASK_LOG_BACKEND"),
            async_delivery,
            default_level: lookup("RASK_LOG_DEFAULT_LEVEL"),
            queue_capacity,
            submit_timeout_ms: parse_u64("RASK_LOG_SUBMIT_TIMEOUT_MS")?,
            file: Some(RawFileSection {
                path: lookup("RASK_LOG_FILE_PATH").map(PathBuf::from),
                max_size_mb: parse_u64("RASK_LOG_FILE_MAX_SIZE_MB")?,
            }),
            sql: Some(RawSqlSection {
                dsn: lookup_secret(&lookup, "RASK_LOG_SQL_DSN")?,
                table: lookup("RASK_LOG_SQL_TABLE"),
                driver: lookup("RASK_LOG_SQL_DRIVER"),
            }),
        };
        raw.resolve()
    }

    /// Parse a TOML document:
    ///
    /// ```toml
    /// backend = "file"
    /// async = true
    /// default_level = "info"
    /// queue_capacity = 1000
    /// submit_timeout_ms = 100
    ///
    /// [file]
    /// path = "./logs/app.log"
    /// max_size_mb = 10
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, LogError> {
        let raw: RawConfig =
            toml::from_str(document).map_err(|e| LogError::Config(e.to_string()))?;
        raw.resolve()
    }

    pub fn load_toml(path: &Path) -> Result<Self, LogError> {
        let document = fs::read_to_string(path)
            .map_err(|e| LogError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&document)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, LogError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(LogError::Config(format!("{key}: invalid boolean '{other}'"))),
    }
}

fn lookup_secret<F>(lookup: &F, key: &str) -> Result<Option<String>, LogError>
where
    F: Fn(&str) -> Option<String>,
{
    let file_key = format!("{key}_FILE");
    if let Some(file_path) = lookup(&file_key) {
        return fs::read_to_string(&file_path)
            .map(|content| Some(content.trim().to_string()))
            .map_err(|e| LogError::Config(format!("Failed to read {file_key}: {e}")));
    }
    Ok(lookup(key))
}

/// Loosely-typed form shared by the environment and TOML loaders.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    backend: Option<String>,
    #[serde(rename = "async")]
    async_delivery: Option<bool>,
    default_level: Option<String>,
    queue_capacity: Option<usize>,
    submit_timeout_ms: Option<u64>,
    file: Option<RawFileSection>,
    sql: Option<RawSqlSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileSection {
    path: Option<PathBuf>,
    max_size_mb: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSqlSection {
    dsn: Option<String>,
    table: Option<String>,
    driver: Option<String>,
}

impl RawConfig {
    fn resolve(self) -> Result<ManagerConfig, LogError> {
        let kind = match self.backend.as_deref() {
            Some(raw) => raw.parse::<BackendKind>()?,
            None => BackendKind::File,
        };

        let backend = match kind {
            BackendKind::File => {
                let section = self.file.unwrap_or_default();
                let defaults = FileSettings::default();
                BackendConfig::File(FileSettings {
                    path: section.path.unwrap_or(defaults.path),
                    max_size_mb: section.max_size_mb.unwrap_or(defaults.max_size_mb),
                })
            }
            BackendKind::Sql => {
                let section = self.sql.unwrap_or_default();
                let dsn = section.dsn.ok_or_else(|| {
                    LogError::InvalidSettings("sql backend requires a dsn".into())
                })?;
                let mut settings = SqlSettings::with_dsn(dsn);
                if let Some(table) = section.table {
                    settings.table = table;
                }
                if let Some(driver) = section.driver {
                    settings.driver = driver;
                }
                BackendConfig::Sql(settings)
            }
        };

        let default_level = self
            .default_level
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| raw.parse::<LogLevel>())
            .transpose()?;

        let config = ManagerConfig {
            backend,
            async_delivery: self.async_delivery.unwrap_or(false),
            default_level,
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            submit_timeout: self
                .submit_timeout_ms
                .map_or(DEFAULT_SUBMIT_TIMEOUT, Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }
}
