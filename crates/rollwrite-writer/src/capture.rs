//! Async capture: forward any `AsyncRead` into a rolling writer

use rollwrite_core::{Error, Result};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::writer::RollingWriter;

/// Spawn a task that copies `reader` into `writer` line by line.
///
/// Each line, newline included, becomes one payload; a trailing partial
/// line is forwarded as is. The task ends at EOF and yields the number of
/// bytes forwarded. It does not close the writer.
pub fn spawn_capture<R>(reader: R, writer: Arc<RollingWriter>) -> JoinHandle<Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut forwarded = 0u64;

        loop {
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                break;
            }
            let payload = std::mem::take(&mut line);
            forward(&writer, payload).await?;
            forwarded += n as u64;
        }

        debug!("Capture reached EOF after {} bytes", forwarded);
        Ok::<u64, Error>(forwarded)
    })
}

/// Queue without blocking the runtime; a full queue moves the blocking
/// send onto the blocking pool.
async fn forward(writer: &Arc<RollingWriter>, payload: Vec<u8>) -> Result<()> {
    match writer.try_write(&payload) {
        Ok(_) => Ok(()),
        Err(Error::QueueFull) => {
            let writer = Arc::clone(writer);
            tokio::task::spawn_blocking(move || writer.write(&payload))
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollwrite_core::Config;
    use std::fs;
    use tempfile::TempDir;

    fn writer(path: &std::path::Path) -> Arc<RollingWriter> {
        Arc::new(RollingWriter::new(Config::new(path).without_rolling()).unwrap())
    }

    #[tokio::test]
    async fn test_capture_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        let writer = writer(&path);

        let input: &[u8] = b"first\nsecond\nno newline";
        let forwarded = spawn_capture(input, Arc::clone(&writer))
            .await
            .unwrap()
            .unwrap();
        writer.close().unwrap();

        assert_eq!(forwarded, input.len() as u64);
        assert_eq!(fs::read(&path).unwrap(), input);
    }

    #[tokio::test]
    async fn test_capture_empty_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        let writer = writer(&path);

        let forwarded = spawn_capture(tokio::io::empty(), Arc::clone(&writer))
            .await
            .unwrap()
            .unwrap();
        writer.close().unwrap();

        assert_eq!(forwarded, 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capture_many_lines_small_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        let writer = Arc::new(
            RollingWriter::new(Config::new(&path).without_rolling().with_queue_size(64)).unwrap(),
        );

        let input: Vec<u8> = (0..5000)
            .flat_map(|i| format!("line {}\n", i).into_bytes())
            .collect();
        let forwarded = spawn_capture(std::io::Cursor::new(input.clone()), Arc::clone(&writer))
            .await
            .unwrap()
            .unwrap();
        writer.close().unwrap();

        assert_eq!(forwarded, input.len() as u64);
        assert_eq!(fs::read(&path).unwrap(), input);
    }

    #[tokio::test]
    async fn test_capture_after_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        let writer = writer(&path);
        writer.close().unwrap();

        let input: &[u8] = b"late\n";
        let result = spawn_capture(input, writer).await.unwrap();
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_child_stdout() {
        use std::process::Stdio;
        use tokio::process::Command;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("child.log");
        let writer = writer(&path);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo one; echo two")
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();

        spawn_capture(stdout, Arc::clone(&writer))
            .await
            .unwrap()
            .unwrap();
        child.wait().await.unwrap();
        writer.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
