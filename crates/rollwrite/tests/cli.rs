//! Binary tests: stdin in, rolling file out

use assert_cmd::Command;
use flate2::read::GzDecoder;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::Read;
use tempfile::TempDir;

fn rollwrite() -> Command {
    let mut cmd = Command::cargo_bin("rollwrite").unwrap();
    cmd.env_remove("ROLLWRITE_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_copies_stdin() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs/app.log");

    rollwrite()
        .arg(&path)
        .arg("--no-rotate")
        .write_stdin("one\ntwo\nthree")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree");
}

#[test]
fn test_appends_to_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "old\n").unwrap();

    rollwrite()
        .arg(&path)
        .write_stdin("new\n")
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
}

#[test]
fn test_size_rotation_with_compression() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    // Over the threshold before the writer even starts
    fs::write(&path, vec![b'x'; 4096]).unwrap();

    let input: String = (0..100).map(|i| format!("line {}\n", i)).collect();
    rollwrite()
        .arg(&path)
        .args(["--size", "1K", "--compress", "--time-tag-format", "%Y%m%d%H%M%S%.f"])
        .write_stdin(input)
        .assert()
        .success();

    // The size check runs on a one-second poll; a backup may not exist if
    // stdin closed first, but nothing may be lost either way
    let mut total = fs::metadata(&path).unwrap().len();
    for entry in fs::read_dir(dir.path()).unwrap() {
        let backup = entry.unwrap().path();
        if backup == path || backup.to_string_lossy().ends_with(".tmp") {
            continue;
        }
        assert!(backup.to_string_lossy().contains("app.log.gz."));
        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&backup).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        total += decoded.len() as u64;
    }
    assert!(total >= 4096);
}

#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("from-config.log");
    let config = dir.path().join("rollwrite.json");
    fs::write(
        &config,
        format!(
            r#"{{"file_path": {:?}, "rolling_policy": "none"}}"#,
            path.to_str().unwrap()
        ),
    )
    .unwrap();

    rollwrite()
        .arg("--config")
        .arg(&config)
        .write_stdin("configured\n")
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&path).unwrap(), "configured\n");
}

#[test]
fn test_invalid_schedule_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");

    rollwrite()
        .arg(&path)
        .args(["--schedule", "not a cron"])
        .write_stdin("ignored\n")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_config_fails() {
    rollwrite()
        .args(["--config", "/nonexistent/rollwrite.toml"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_conflicting_flags() {
    rollwrite()
        .args(["--size", "1M", "--no-rotate"])
        .assert()
        .failure();
}
