//! CLI argument definitions

use clap::Parser;
use rollwrite_core::{Config, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rollwrite")]
#[command(version, about = "Copy stdin into a self-rotating log file")]
pub struct Cli {
    /// Active file to write (overrides the config file)
    pub path: Option<PathBuf>,

    /// Config file (.json, .toml, .yaml or .yml)
    #[arg(short, long, env = "ROLLWRITE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Rotate on a 6-field cron schedule, e.g. "0 0 0 * * *"
    #[arg(long, conflicts_with_all = ["size", "no_rotate"])]
    pub schedule: Option<String>,

    /// Rotate once the file grows past this size, e.g. "100M"
    #[arg(long, conflicts_with = "no_rotate")]
    pub size: Option<String>,

    /// Never rotate
    #[arg(long)]
    pub no_rotate: bool,

    /// Gzip backups after rotation
    #[arg(long)]
    pub compress: bool,

    /// Keep at most this many backups (0 keeps all)
    #[arg(long)]
    pub max_backups: Option<usize>,

    /// strftime format of the backup time tag
    #[arg(long)]
    pub time_tag_format: Option<String>,

    /// Do not create backups of empty files
    #[arg(long)]
    pub skip_empty: bool,

    /// Permission bits of the active file, in octal
    #[arg(long, value_parser = parse_mode)]
    pub file_mode: Option<u32>,

    /// Permission bits of created directories, in octal
    #[arg(long, value_parser = parse_mode)]
    pub dir_mode: Option<u32>,

    /// In-memory buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Write queue capacity in payloads
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Writer config: the config file if given, then flags on top
    pub fn writer_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: Config) -> Config {
        if let Some(path) = &self.path {
            config = config.with_file_path(path);
        }
        if self.no_rotate {
            config = config.without_rolling();
        }
        if let Some(pattern) = &self.schedule {
            config = config.with_rolling_time_pattern(pattern);
        }
        if let Some(size) = &self.size {
            config = config.with_rolling_volume_size(size);
        }
        if self.compress {
            config = config.with_compress();
        }
        if let Some(max) = self.max_backups {
            config = config.with_max_backups(max);
        }
        if let Some(format) = &self.time_tag_format {
            config = config.with_time_tag_format(format);
        }
        if self.skip_empty {
            config = config.with_skip_empty_backups();
        }
        if let Some(mode) = self.file_mode {
            config = config.with_file_mode(mode);
        }
        if let Some(mode) = self.dir_mode {
            config = config.with_dir_mode(mode);
        }
        if let Some(size) = self.buffer_size {
            config = config.with_buffer_size(size);
        }
        if let Some(size) = self.queue_size {
            config = config.with_queue_size(size);
        }
        config
    }
}

/// Parse permission bits like "644", "0644" or "0o644"
fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| format!("Invalid octal mode: {}", s))?;
    if mode > 0o7777 {
        return Err(format!("Mode out of range: {}", s));
    }
    Ok(mode)
}
