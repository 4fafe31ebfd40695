//! Error types for rollwrite

use std::path::PathBuf;

/// rollwrite error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid rotation schedule '{pattern}': {reason}")]
    InvalidSchedule { pattern: String, reason: String },

    #[error("Failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write on closed writer")]
    Closed,

    #[error("Write queue full")]
    QueueFull,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for rollwrite
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn file_open<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Error::FileOpen {
            path: path.into(),
            source,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IoError(e) => e,
            Error::Closed => std::io::Error::new(std::io::ErrorKind::BrokenPipe, err),
            Error::QueueFull => std::io::Error::new(std::io::ErrorKind::WouldBlock, err),
            Error::Timeout(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, err),
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
