use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::buffer::{BufferError, FileSet, ReaderConfig, TimeBucket};
use crate::sender::ClientConfig;
use crate::shipper::ShipperConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Console verbosity of the shipper's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Directory holding buffer files, the bookmark and quarantine files
    #[arg(long, env = "BUFFER_DIR", default_value = "/tmp/frakt-log-shipper")]
    pub buffer_dir: PathBuf,

    /// Base name shared by all buffer files of this stream
    #[arg(long, env = "BUFFER_BASE", default_value = "buffer")]
    pub buffer_base: String,

    /// Time-bucket granularity encoded in buffer file names
    #[arg(long, env = "BUFFER_BUCKET", default_value = "day", value_enum)]
    pub bucket: TimeBucket,

    /// Bulk-ingest endpoint URL
    #[arg(long, env = "ELASTIC_ENDPOINT", default_value = "http://localhost:9200")]
    pub endpoint: String,

    /// strftime pattern producing the target index name from the bucket date
    #[arg(long, env = "INDEX_FORMAT", default_value = "logs-%Y.%m.%d")]
    pub index_format: String,

    /// Ingest pipeline named in every bulk action
    #[arg(long, env = "INGEST_PIPELINE")]
    pub pipeline: Option<String>,

    /// Maximum documents per batch
    #[arg(long, env = "BATCH_POSTING_LIMIT", default_value = "50")]
    pub batch_limit: usize,

    /// Per-event byte ceiling; larger events are dropped, never sent
    #[arg(long, env = "EVENT_SIZE_LIMIT_BYTES")]
    pub event_size_limit_bytes: Option<usize>,

    /// Base interval between ship attempts, in seconds
    #[arg(long, env = "SHIP_PERIOD_SECS", default_value = "2")]
    pub period_secs: u64,

    /// Cumulative size cap on live buffer files, in MB (unset: unbounded)
    #[arg(long, env = "BUFFER_SIZE_LIMIT_MB")]
    pub buffer_size_limit_mb: Option<u64>,

    /// Size at which the active buffer file rolls to a _NNN successor, in MB
    #[arg(long, env = "FILE_SIZE_LIMIT_MB", default_value = "100")]
    pub file_size_limit_mb: u64,

    /// Cumulative size retained across quarantine files, in MB
    #[arg(long, env = "QUARANTINE_RETENTION_MB", default_value = "100")]
    pub quarantine_retention_mb: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// HTTP connection timeout in seconds
    #[arg(long, env = "CONNECTION_TIMEOUT_SECS", default_value = "10")]
    pub connection_timeout_secs: u64,

    /// Read NDJSON documents from stdin and append them to the buffer
    #[arg(long, env = "INGEST_STDIN")]
    pub ingest_stdin: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_enum)]
    pub log_level: LogLevel,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub period: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub connection_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_dir: PathBuf::from("/tmp/frakt-log-shipper"),
            buffer_base: "buffer".to_string(),
            bucket: TimeBucket::Day,
            endpoint: "http://localhost:9200".to_string(),
            index_format: "logs-%Y.%m.%d".to_string(),
            pipeline: None,
            batch_limit: 50,
            event_size_limit_bytes: None,
            period_secs: 2,
            buffer_size_limit_mb: None,
            file_size_limit_mb: 100,
            quarantine_retention_mb: 100,
            timeout_secs: 30,
            connection_timeout_secs: 10,
            ingest_stdin: false,
            log_level: LogLevel::Info,
            config_file: None,
            period: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment-only construction: `FRAKT_CONFIG` may carry a whole TOML
    /// document; otherwise the per-field environment variables apply.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(inline) = std::env::var("FRAKT_CONFIG") {
            return Self::from_toml_str(&inline);
        }
        Self::from_args(["frakt-log-shipper"])
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.period = Duration::from_secs(self.period_secs);
        self.timeout = Duration::from_secs(self.timeout_secs);
        self.connection_timeout = Duration::from_secs(self.connection_timeout_secs);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_base.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "buffer base name must not be empty".to_string(),
            ));
        }
        if self.buffer_base.contains(['/', '\\']) {
            return Err(ConfigError::InvalidConfig(
                "buffer base name must not contain path separators".to_string(),
            ));
        }
        Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        if self.batch_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch posting limit must be at least 1".to_string(),
            ));
        }
        if self.period_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "ship period must be at least 1 second".to_string(),
            ));
        }
        if self.file_size_limit_mb == 0 {
            return Err(ConfigError::InvalidConfig(
                "buffer file size limit must be at least 1 MB".to_string(),
            ));
        }
        if StrftimeItems::new(&self.index_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidConfig(format!(
                "index format {:?} is not a valid strftime pattern",
                self.index_format
            )));
        }
        Ok(())
    }

    pub fn file_set(&self) -> Result<FileSet, BufferError> {
        FileSet::new(&self.buffer_dir, &self.buffer_base, self.bucket)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            batch_limit: self.batch_limit,
            max_event_bytes: self.event_size_limit_bytes,
            index_format: self.index_format.clone(),
            pipeline: self.pipeline.clone(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
            connection_timeout: self.connection_timeout,
            ..ClientConfig::default()
        }
    }

    pub fn shipper_config(&self) -> ShipperConfig {
        ShipperConfig {
            period: self.period,
            buffer_size_limit_bytes: self.buffer_size_limit_mb.map(|mb| mb * 1024 * 1024),
            retained_quarantine_bytes: self.quarantine_retention_mb * 1024 * 1024,
            ..ShipperConfig::default()
        }
    }

    pub fn file_size_limit_bytes(&self) -> Option<u64> {
        Some(self.file_size_limit_mb * 1024 * 1024)
    }
}
