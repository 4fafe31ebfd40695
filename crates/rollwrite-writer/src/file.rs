//! File and directory creation with configured permission bits

use rollwrite_core::{Error, ResolvedConfig, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

pub(crate) fn create_dirs(dir: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(dir)
}

fn open_with(options: &mut OpenOptions, path: &Path, mode: u32) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

pub(crate) fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    open_with(OpenOptions::new().create(true).append(true), path, mode)
}

pub(crate) fn open_truncate(path: &Path, mode: u32) -> io::Result<File> {
    open_with(
        OpenOptions::new().create(true).write(true).truncate(true),
        path,
        mode,
    )
}

/// Create the parent directories and open the active file for appending
pub(crate) fn open_active(config: &ResolvedConfig) -> Result<File> {
    if let Some(parent) = config.file_path.parent() {
        create_dirs(parent, config.dir_mode).map_err(|e| Error::file_open(parent, e))?;
    }
    open_append(&config.file_path, config.file_mode)
        .map_err(|e| Error::file_open(&config.file_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollwrite_core::Config;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_active_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/app.log");
        let config = Config::new(&path).resolve().unwrap();

        let mut file = open_active(&config).unwrap();
        file.write_all(b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_open_active_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"first\n").unwrap();
        let config = Config::new(&path).resolve().unwrap();

        let mut file = open_active(&config).unwrap();
        file.write_all(b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_open_active_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/app.log");
        let config = Config::new(&path)
            .with_file_mode(0o600)
            .with_dir_mode(0o750)
            .resolve()
            .unwrap();

        open_active(&config).unwrap();
        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(dir.path().join("logs")).unwrap().permissions().mode() & 0o777;
        // The process umask can only clear bits
        assert_eq!(file_mode & !0o600, 0);
        assert_eq!(dir_mode & !0o750, 0);
    }

    #[test]
    fn test_open_active_fails_on_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::create_dir(&path).unwrap();
        let config = Config::new(&path).resolve().unwrap();

        let result = open_active(&config);
        assert!(matches!(result, Err(Error::FileOpen { .. })));
    }
}
