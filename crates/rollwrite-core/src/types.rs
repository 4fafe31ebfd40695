//! Core types for rollwrite

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::DEFAULT_VOLUME_SIZE;
use crate::error::{Error, Result};

/// Human size grammar: digits followed by K, M, G or T with an optional B
static VOLUME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*([KMGT])B?\s*$").expect("Invalid volume regex")
});

/// Rotation policy as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RollingPolicy {
    /// Never rotate
    None,
    /// Rotate on a cron schedule
    #[default]
    Time,
    /// Rotate once the active file exceeds a size threshold
    Volume,
}

impl fmt::Display for RollingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollingPolicy::None => write!(f, "none"),
            RollingPolicy::Time => write!(f, "time"),
            RollingPolicy::Volume => write!(f, "volume"),
        }
    }
}

impl FromStr for RollingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "without" => Ok(RollingPolicy::None),
            "time" | "schedule" => Ok(RollingPolicy::Time),
            "volume" | "size" => Ok(RollingPolicy::Volume),
            _ => Err(Error::invalid_argument(format!(
                "Unknown rolling policy: {}. Use none, time, or volume",
                s
            ))),
        }
    }
}

/// Rotation policy after resolution, carrying its parsed parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    None,
    /// 6-field cron expression (seconds resolution)
    Schedule(String),
    /// Size threshold in bytes
    Volume(u64),
}

/// Parse a human size string ("500M", "1gb", "20k") into bytes.
///
/// Units are binary multiples. Anything that does not match the grammar,
/// including a bare number or a zero size, yields [`DEFAULT_VOLUME_SIZE`].
pub fn parse_volume_size(s: &str) -> u64 {
    let Some(caps) = VOLUME_REGEX.captures(s) else {
        return DEFAULT_VOLUME_SIZE;
    };

    let Ok(count) = caps[1].parse::<u64>() else {
        return DEFAULT_VOLUME_SIZE;
    };

    let shift = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 10,
        "M" => 20,
        "G" => 30,
        _ => 40,
    };

    match count.checked_mul(1u64 << shift) {
        Some(0) | None => DEFAULT_VOLUME_SIZE,
        Some(bytes) => bytes,
    }
}

/// Custom backup path formatter, called with the start of the rotated window
#[derive(Clone)]
pub struct FileFormatter(Arc<dyn Fn(DateTime<Local>) -> PathBuf + Send + Sync>);

impl FileFormatter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(DateTime<Local>) -> PathBuf + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn format(&self, start: DateTime<Local>) -> PathBuf {
        (self.0)(start)
    }
}

impl fmt::Debug for FileFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileFormatter(..)")
    }
}

impl PartialEq for FileFormatter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume_units() {
        assert_eq!(parse_volume_size("1K"), 1024);
        assert_eq!(parse_volume_size("2M"), 2 * 1024 * 1024);
        assert_eq!(parse_volume_size("1G"), 1024 * 1024 * 1024);
        assert_eq!(parse_volume_size("3TB"), 3 * 1024u64.pow(4));
    }

    #[test]
    fn test_parse_volume_case_and_suffix() {
        assert_eq!(parse_volume_size("1mb"), 1024 * 1024);
        assert_eq!(parse_volume_size("20k"), 20 * 1024);
        assert_eq!(parse_volume_size("100Mb"), 100 * 1024 * 1024);
        assert_eq!(parse_volume_size(" 5 G "), 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_volume_fallback() {
        assert_eq!(parse_volume_size("abc"), DEFAULT_VOLUME_SIZE);
        assert_eq!(parse_volume_size("500"), DEFAULT_VOLUME_SIZE);
        assert_eq!(parse_volume_size(""), DEFAULT_VOLUME_SIZE);
        assert_eq!(parse_volume_size("0M"), DEFAULT_VOLUME_SIZE);
        assert_eq!(parse_volume_size("10P"), DEFAULT_VOLUME_SIZE);
        assert_eq!(parse_volume_size("99999999999999999999T"), DEFAULT_VOLUME_SIZE);
    }

    #[test]
    fn test_rolling_policy_from_str() {
        assert_eq!("none".parse::<RollingPolicy>().unwrap(), RollingPolicy::None);
        assert_eq!("Time".parse::<RollingPolicy>().unwrap(), RollingPolicy::Time);
        assert_eq!("size".parse::<RollingPolicy>().unwrap(), RollingPolicy::Volume);
        assert!("hourly".parse::<RollingPolicy>().is_err());
    }

    #[test]
    fn test_rolling_policy_serde() {
        let json = serde_json::to_string(&RollingPolicy::Volume).unwrap();
        assert_eq!(json, "\"volume\"");
        let policy: RollingPolicy = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(policy, RollingPolicy::None);
    }

    #[test]
    fn test_file_formatter() {
        let formatter = FileFormatter::new(|start| {
            PathBuf::from(format!("/tmp/app-{}.log", start.format("%Y")))
        });
        let path = formatter.format(Local::now());
        assert!(path.to_string_lossy().starts_with("/tmp/app-20"));
        assert_eq!(formatter, formatter.clone());
    }
}
