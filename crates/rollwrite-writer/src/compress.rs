//! Gzip compression of rotated backups

use flate2::write::GzEncoder;
use flate2::Compression;
use rollwrite_core::{Result, COMPRESS_TMP_SUFFIX};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::file::open_truncate;

/// Path of the transient file used while `backup` is being compressed
pub fn tmp_path(backup: &Path) -> PathBuf {
    let mut name: OsString = backup.as_os_str().to_owned();
    name.push(".");
    name.push(COMPRESS_TMP_SUFFIX);
    PathBuf::from(name)
}

/// Gzip `src` into a new file at `dst`, returning the uncompressed size
pub fn compress_file(src: &Path, dst: &Path, mode: u32) -> io::Result<u64> {
    let mut input = File::open(src)?;
    let output = open_truncate(dst, mode)?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let copied = io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(copied)
}

/// Compress a rotated backup in place.
///
/// The backup is moved to `<backup>.tmp`, gzipped back into `<backup>`, and
/// the tmp file removed. If compression fails the partial output is deleted
/// and the tmp file is moved back, so the rotated bytes survive uncompressed.
pub fn compress_backup(backup: &Path, mode: u32) -> Result<u64> {
    let tmp = tmp_path(backup);
    fs::rename(backup, &tmp)?;

    match compress_file(&tmp, backup, mode) {
        Ok(copied) => {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("Failed to remove {}: {}", tmp.display(), e);
            }
            debug!("Compressed {} ({} bytes)", backup.display(), copied);
            Ok(copied)
        }
        Err(e) => {
            let _ = fs::remove_file(backup);
            if let Err(restore) = fs::rename(&tmp, backup) {
                warn!(
                    "Failed to restore {} after compression error: {}",
                    tmp.display(),
                    restore
                );
            }
            Err(e.into())
        }
    }
}
