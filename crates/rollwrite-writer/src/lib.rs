//! rollwrite Writer - Concurrent self-rotating file writer
//!
//! ```no_run
//! use rollwrite_core::Config;
//! use rollwrite_writer::RollingWriter;
//!
//! let writer = RollingWriter::new(
//!     Config::new("/var/log/app/app.log")
//!         .with_rolling_volume_size("100M")
//!         .with_compress()
//!         .with_max_backups(7),
//! )?;
//! writer.write(b"hello\n")?;
//! writer.close()?;
//! # Ok::<(), rollwrite_core::Error>(())
//! ```

mod capture;
mod compress;
mod file;
mod retention;
mod schedule;
mod trigger;
mod writer;

pub use capture::spawn_capture;
pub use compress::{compress_backup, compress_file};
pub use retention::Retention;
pub use schedule::{parse_schedule, FireSchedule};
pub use trigger::{BackupNamer, RotationTrigger};
pub use writer::{EventWriter, RollingWriter, RotationOutcome};
