//! Constants and default values for rollwrite

use std::time::Duration;

/// Default active log file path
pub const DEFAULT_FILE_PATH: &str = "./log/log.log";

/// Default time tag format for backup names (chrono strftime syntax)
pub const DEFAULT_TIME_TAG_FORMAT: &str = "%Y%m%d%H%M";

/// Default rotation schedule: every day at 00:00:00
pub const DEFAULT_ROLLING_TIME_PATTERN: &str = "0 0 0 * * *";

/// Default rotation size threshold, as written in config files
pub const DEFAULT_ROLLING_VOLUME_SIZE: &str = "1G";

/// Threshold used when a volume size string cannot be parsed (1 GiB)
pub const DEFAULT_VOLUME_SIZE: u64 = 1024 * 1024 * 1024;

/// Default permission bits for log files (rw-r--r--)
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permission bits for created directories (rwx------)
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Default in-memory buffer size (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default write queue capacity (entries)
pub const DEFAULT_QUEUE_SIZE: usize = 8 * 1024;

/// Smallest buffer the writer will run with
pub const MIN_BUFFER_SIZE: usize = 2048;

/// Smallest write queue the writer will run with
pub const MIN_QUEUE_SIZE: usize = 64;

/// Payloads larger than buffer / DIRECT_WRITE_DIVISOR bypass the buffer
pub const DIRECT_WRITE_DIVISOR: usize = 4;

/// Interval at which a non-empty buffer is flushed to disk
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Interval at which the size trigger stats the active file
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long `close` waits for the writer loop to acknowledge shutdown
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(4);

/// Suffix used for the transient file during compression
pub const COMPRESS_TMP_SUFFIX: &str = "tmp";

/// Extension inserted into backup names when compression is enabled
pub const GZIP_EXTENSION: &str = "gz";

/// Capacity of the channel carrying background rotation outcomes
pub const OUTCOME_CHANNEL_SIZE: usize = 64;
