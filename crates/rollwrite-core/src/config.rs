//! Writer configuration
//!
//! A [`Config`] can be built in code with the `with_*` methods or loaded from
//! a file in any of the supported formats:
//! - JSON (.json)
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//!
//! The writer never trusts a `Config` directly. [`Config::resolve`] clamps
//! sizes, fills in permission bits and parses the rotation policy into a
//! [`ResolvedConfig`], which is what the writer and trigger consume.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{parse_volume_size, FileFormatter, Policy, RollingPolicy};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Rolling writer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the active log file. Backups are written next to it as
    /// `<file_path>.<tag>`, or `<file_path>.gz.<tag>` when compressing.
    pub file_path: PathBuf,
    /// strftime pattern used to render the backup time tag
    pub time_tag_format: String,
    /// Overrides the backup naming rule when set
    #[serde(skip)]
    pub file_formatter: Option<FileFormatter>,
    /// Permission bits for created log files
    pub file_mode: u32,
    /// Permission bits for created directories
    pub dir_mode: u32,
    /// Number of backups to keep; 0 keeps everything
    pub max_backups: usize,
    pub rolling_policy: RollingPolicy,
    /// Cron expression with a leading seconds field
    pub rolling_time_pattern: String,
    /// Size threshold such as "500M" or "1gb"
    pub rolling_volume_size: String,
    /// Gzip backups after rotation
    pub compress: bool,
    /// Do not rotate while the active file is empty
    #[serde(rename = "filter_empty_backup")]
    pub skip_empty_backups: bool,
    #[serde(rename = "max_buffer_size")]
    pub buffer_size: usize,
    #[serde(rename = "max_queue_size")]
    pub queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            time_tag_format: DEFAULT_TIME_TAG_FORMAT.to_string(),
            file_formatter: None,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            max_backups: 0,
            rolling_policy: RollingPolicy::Time,
            rolling_time_pattern: DEFAULT_ROLLING_TIME_PATTERN.to_string(),
            rolling_volume_size: DEFAULT_ROLLING_VOLUME_SIZE.to_string(),
            compress: false,
            skip_empty_backups: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl Config {
    /// Default config writing to the given path
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self::default().with_file_path(file_path)
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = path.into();
        self
    }

    pub fn with_time_tag_format(mut self, format: impl Into<String>) -> Self {
        self.time_tag_format = format.into();
        self
    }

    pub fn with_file_formatter(mut self, formatter: FileFormatter) -> Self {
        self.file_formatter = Some(formatter);
        self
    }

    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Gzip every backup once it has been rotated out
    pub fn with_compress(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Keep at most `max` backups, deleting the oldest first
    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.max_backups = max;
        self
    }

    pub fn without_rolling(mut self) -> Self {
        self.rolling_policy = RollingPolicy::None;
        self
    }

    /// Rotate on a cron schedule, e.g. "0 0 0 * * *" for daily at midnight
    pub fn with_rolling_time_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rolling_policy = RollingPolicy::Time;
        self.rolling_time_pattern = pattern.into();
        self
    }

    /// Rotate once the active file grows past `size`, e.g. "100mb"
    pub fn with_rolling_volume_size(mut self, size: impl Into<String>) -> Self {
        self.rolling_policy = RollingPolicy::Volume;
        self.rolling_volume_size = size.into();
        self
    }

    pub fn with_skip_empty_backups(mut self) -> Self {
        self.skip_empty_backups = true;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::config(format!(
                "Unsupported config file extension: {}. Expected .json, .toml, .yaml, or .yml",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content, format)?;
        debug!("Loaded writer config from {:?}", path);
        Ok(config)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: Config = match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(config)
    }

    /// Validate and normalize this config for the writer.
    ///
    /// Sizes below the documented minimums are raised, zero permission bits
    /// take the defaults, and an unparsable volume size falls back to 1 GiB.
    /// The cron pattern is carried as-is and parsed by the trigger.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.file_path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("file path is empty"));
        }
        if self.file_path.file_name().is_none() {
            return Err(Error::invalid_argument(format!(
                "file path has no file name: {}",
                self.file_path.display()
            )));
        }
        validate_time_tag_format(&self.time_tag_format)?;

        let file_path = if self.file_path.is_absolute() {
            self.file_path.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::invalid_argument(format!("cannot resolve cwd: {}", e)))?
                .join(&self.file_path)
        };

        let policy = match self.rolling_policy {
            RollingPolicy::None => Policy::None,
            RollingPolicy::Time => Policy::Schedule(self.rolling_time_pattern.clone()),
            RollingPolicy::Volume => Policy::Volume(parse_volume_size(&self.rolling_volume_size)),
        };

        let buffer_size = self.buffer_size.max(MIN_BUFFER_SIZE);

        Ok(ResolvedConfig {
            file_path,
            time_tag_format: self.time_tag_format.clone(),
            file_formatter: self.file_formatter.clone(),
            file_mode: non_zero_or(self.file_mode, DEFAULT_FILE_MODE),
            dir_mode: non_zero_or(self.dir_mode, DEFAULT_DIR_MODE),
            max_backups: self.max_backups,
            policy,
            compress: self.compress,
            skip_empty_backups: self.skip_empty_backups,
            buffer_size,
            queue_size: self.queue_size.max(MIN_QUEUE_SIZE),
            direct_write_size: buffer_size / DIRECT_WRITE_DIVISOR,
            flush_interval: FLUSH_INTERVAL,
            poll_interval: POLL_INTERVAL,
            close_timeout: CLOSE_TIMEOUT,
        })
    }
}

fn non_zero_or(mode: u32, default: u32) -> u32 {
    if mode == 0 {
        default
    } else {
        mode
    }
}

/// Reject strftime patterns chrono cannot render, or that would put a
/// path separator into a backup file name.
fn validate_time_tag_format(format: &str) -> Result<()> {
    if format.is_empty() {
        return Err(Error::invalid_argument("time tag format is empty"));
    }
    if format.contains('/') {
        return Err(Error::invalid_argument(format!(
            "time tag format must not contain '/': {}",
            format
        )));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::invalid_argument(format!(
            "invalid time tag format: {}",
            format
        )));
    }
    Ok(())
}

/// Config after validation, as consumed by the writer and the trigger
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path of the active file
    pub file_path: PathBuf,
    pub time_tag_format: String,
    pub file_formatter: Option<FileFormatter>,
    pub file_mode: u32,
    pub dir_mode: u32,
    pub max_backups: usize,
    pub policy: Policy,
    pub compress: bool,
    pub skip_empty_backups: bool,
    pub buffer_size: usize,
    pub queue_size: usize,
    /// Payloads above this size skip the buffer once it has been flushed
    pub direct_write_size: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    pub close_timeout: Duration,
}

impl ResolvedConfig {
    /// Backup path for a window that started at `start`.
    ///
    /// The `.gz` segment is reserved here even though compression happens
    /// later, so the final name is known at rotation time.
    pub fn backup_path(&self, start: DateTime<Local>) -> PathBuf {
        if let Some(formatter) = &self.file_formatter {
            let path = formatter.format(start);
            if self.compress && path.extension().map_or(true, |e| e != GZIP_EXTENSION) {
                let mut name = path.into_os_string();
                name.push(".");
                name.push(GZIP_EXTENSION);
                return PathBuf::from(name);
            }
            return path;
        }

        let tag = start.format(&self.time_tag_format).to_string();
        let mut name: OsString = self.file_path.as_os_str().to_owned();
        if self.compress {
            name.push(".");
            name.push(GZIP_EXTENSION);
        }
        name.push(".");
        name.push(tag);
        PathBuf::from(name)
    }

    /// File name prefix shared by every backup produced by the default rule
    pub fn backup_prefix(&self) -> OsString {
        let mut prefix = self
            .file_path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_default();
        prefix.push(".");
        if self.compress {
            prefix.push(GZIP_EXTENSION);
            prefix.push(".");
        }
        prefix
    }

    /// Whether rotation is driven by anything at all
    pub fn rolls(&self) -> bool {
        self.policy != Policy::None
    }
}
