//! Buffered rolling writer
//!
//! A single writer-loop thread owns the active file and the in-memory
//! buffer. Producers only ever talk to it through a bounded queue, so the
//! hot path takes no locks and a full queue blocks the caller instead of
//! growing without bound.

use crossbeam_channel::{
    bounded, never, select, tick, Receiver, RecvTimeoutError, Sender, TrySendError,
};
use parking_lot::Mutex;
use rollwrite_core::{Config, Error, ResolvedConfig, Result, OUTCOME_CHANNEL_SIZE};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::compress::compress_backup;
use crate::file::{create_dirs, open_active};
use crate::retention::Retention;
use crate::trigger::RotationTrigger;

/// Result of the background work that follows a rotation
#[derive(Debug)]
pub struct RotationOutcome {
    /// Final path of the backup
    pub backup: PathBuf,
    /// Whether the backup was gzipped
    pub compressed: bool,
    /// Old backups deleted to make room for this one
    pub evicted: Vec<PathBuf>,
    pub result: Result<()>,
}

/// Everything producers send to the writer loop. Rotation and flush
/// requests share the queue with payloads so they apply in call order.
enum Message {
    Write(Vec<u8>),
    Rotate(PathBuf),
    Flush(Sender<()>),
}

/// Concurrent, self-rotating file writer.
///
/// `RollingWriter` is `Send + Sync`; share it between producers with an
/// `Arc`. Dropping it closes it.
pub struct RollingWriter {
    config: Arc<ResolvedConfig>,
    queue_tx: Sender<Message>,
    shutdown_tx: Sender<()>,
    ack_rx: Receiver<()>,
    outcome_rx: Receiver<RotationOutcome>,
    trigger: Mutex<RotationTrigger>,
    retention: Option<Arc<Retention>>,
    closed: AtomicBool,
    /// Sends that passed the closed check and have not finished yet
    in_flight: AtomicUsize,
    degraded: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl RollingWriter {
    /// Create a writer from a config, validating it first
    pub fn new(config: Config) -> Result<Self> {
        Self::from_resolved(config.resolve()?)
    }

    /// Create a writer from a JSON, TOML or YAML config file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(Config::load(path)?)
    }

    /// Open the active file, start the trigger and the writer loop.
    ///
    /// Fails without leaving anything running if the file cannot be opened
    /// or the rotation schedule does not parse.
    pub fn from_resolved(config: ResolvedConfig) -> Result<Self> {
        let config = Arc::new(config);
        let file = open_active(&config)?;
        let trigger = RotationTrigger::start(Arc::clone(&config))?;

        let retention = (config.max_backups > 0).then(|| Arc::new(Retention::seeded(&config)));
        let degraded = Arc::new(AtomicBool::new(false));

        let (queue_tx, queue_rx) = bounded(config.queue_size);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (ack_tx, ack_rx) = bounded(1);
        let (outcome_tx, outcome_rx) = bounded(OUTCOME_CHANNEL_SIZE);

        let writer_loop = WriterLoop {
            config: Arc::clone(&config),
            file: Some(file),
            buffer: Vec::with_capacity(config.buffer_size),
            retention: retention.clone(),
            outcome_tx,
            degraded: Arc::clone(&degraded),
        };
        let channels = LoopChannels {
            queue: queue_rx,
            events: trigger.events(),
            shutdown: shutdown_rx,
            ack: ack_tx,
        };

        thread::Builder::new()
            .name("rollwrite-writer".to_string())
            .spawn(move || writer_loop.run(channels))?;

        if config.rolls() {
            info!("Writing to {}", config.file_path.display());
        } else {
            info!("Writing to {} without rotation", config.file_path.display());
        }

        Ok(Self {
            config,
            queue_tx,
            shutdown_tx,
            ack_rx,
            outcome_rx,
            trigger: Mutex::new(trigger),
            retention,
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            degraded,
            dropped: AtomicU64::new(0),
        })
    }

    /// Queue a payload for writing.
    ///
    /// Returns as soon as the payload is queued; blocks while the queue is
    /// full. Disk errors are never reported here, only [`Error::Closed`].
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return if self.is_closed() {
                Err(Error::Closed)
            } else {
                Ok(0)
            };
        }
        self.enqueue(Message::Write(buf.to_vec()), true)?;
        Ok(buf.len())
    }

    /// Queue a payload without blocking; [`Error::QueueFull`] if there is no room
    pub fn try_write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return if self.is_closed() {
                Err(Error::Closed)
            } else {
                Ok(0)
            };
        }
        self.enqueue(Message::Write(buf.to_vec()), false)?;
        Ok(buf.len())
    }

    /// Wait until everything queued before this call has been written to disk
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = bounded(1);
        self.enqueue(Message::Flush(done_tx), true)?;

        match done_rx.recv_timeout(self.config.close_timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout("flush".to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Closed),
        }
    }

    /// Rotate the active file to `backup` once the payloads queued so far
    /// have been written
    pub fn rotate(&self, backup: impl Into<PathBuf>) -> Result<()> {
        self.enqueue(Message::Rotate(backup.into()), true)
    }

    /// Hand a message to the loop unless the writer is closed.
    ///
    /// The in-flight count is raised before the closed check so `close`
    /// can wait for every send that got past it; nothing accepted here is
    /// left behind in the queue after the loop's final drain.
    fn enqueue(&self, message: Message, block: bool) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if self.is_closed() {
            Err(Error::Closed)
        } else if block {
            self.queue_tx.send(message).map_err(|_| Error::Closed)
        } else {
            match self.queue_tx.try_send(message) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(Error::QueueFull),
                Err(TrySendError::Disconnected(_)) => Err(Error::Closed),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Rotate now, naming the backup by the configured rule.
    /// Returns the backup path that was requested.
    pub fn rotate_now(&self) -> Result<PathBuf> {
        let backup = self.trigger.lock().namer().next_backup();
        self.rotate(backup.clone())?;
        Ok(backup)
    }

    /// Shut the writer down.
    ///
    /// Waits up to the close timeout for the loop to drain the queue, flush
    /// and close the file, then stops the trigger. Returns even if the loop
    /// never acknowledged. Compression of earlier rotations may still be
    /// running afterwards. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Producers already past the closed check finish their sends first;
        // the loop keeps consuming, so blocked sends complete
        let deadline = Instant::now() + self.config.close_timeout;
        while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            thread::yield_now();
        }

        let _ = self.shutdown_tx.try_send(());
        match self.ack_rx.recv_deadline(deadline) {
            Ok(()) => debug!("Writer for {} closed", self.config.file_path.display()),
            Err(RecvTimeoutError::Timeout) => warn!(
                "Timed out after {:?} waiting for {} to close",
                self.config.close_timeout,
                self.config.file_path.display()
            ),
            Err(RecvTimeoutError::Disconnected) => {}
        }

        self.trigger.lock().stop();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// True while the active file could not be reopened after a rotation.
    /// Buffered data is dropped until a later flush manages to reopen it.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Outcomes of background compression and pruning, one per rotation.
    /// Outcomes nobody reads are discarded once the channel is full.
    pub fn outcomes(&self) -> Receiver<RotationOutcome> {
        self.outcome_rx.clone()
    }

    /// Backups currently tracked for retention, oldest first
    pub fn retained_backups(&self) -> Vec<PathBuf> {
        self.retention
            .as_ref()
            .map(|r| r.backups())
            .unwrap_or_default()
    }

    /// Events discarded by the `tracing` writer because the queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for RollingWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RollingWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingWriter::flush(self).map_err(Into::into)
    }
}

impl Write for &RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RollingWriter::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingWriter::flush(*self).map_err(Into::into)
    }
}

/// Writer handed to `tracing_subscriber`. It never blocks: when the queue
/// is full the event is dropped and counted, so the writer loop's own
/// diagnostics cannot deadlock against it.
pub struct EventWriter<'a> {
    writer: &'a RollingWriter,
}

impl Write for EventWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.try_write(buf) {
            Ok(n) => Ok(n),
            Err(Error::QueueFull) => {
                self.writer.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(buf.len())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = EventWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter { writer: self }
    }
}

struct LoopChannels {
    queue: Receiver<Message>,
    events: Receiver<PathBuf>,
    shutdown: Receiver<()>,
    ack: Sender<()>,
}

/// State owned by the writer-loop thread
struct WriterLoop {
    config: Arc<ResolvedConfig>,
    file: Option<File>,
    buffer: Vec<u8>,
    retention: Option<Arc<Retention>>,
    outcome_tx: Sender<RotationOutcome>,
    degraded: Arc<AtomicBool>,
}

impl WriterLoop {
    fn run(mut self, channels: LoopChannels) {
        let LoopChannels {
            queue,
            events,
            shutdown,
            ack,
        } = channels;
        let ticker = tick(self.config.flush_interval);
        let idle_events = never();
        let mut events_open = true;

        loop {
            select! {
                recv(queue) -> msg => match msg {
                    Ok(message) => self.handle(message),
                    // Every producer handle is gone
                    Err(_) => break,
                },
                recv(if events_open { &events } else { &idle_events }) -> msg => match msg {
                    Ok(backup) => self.rotate_file(backup),
                    // Trigger stopped
                    Err(_) => events_open = false,
                },
                recv(ticker) -> _ => self.flush(),
                recv(shutdown) -> _ => break,
            }
        }

        self.drain(&queue);
        self.flush();
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                debug!("Failed to sync {}: {}", self.config.file_path.display(), e);
            }
        }
        let _ = ack.send(());
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Write(payload) => self.push(payload),
            Message::Rotate(backup) => self.rotate_file(backup),
            Message::Flush(done) => {
                self.flush();
                let _ = done.send(());
            }
        }
    }

    /// Handle every message already queued, in order
    fn drain(&mut self, queue: &Receiver<Message>) {
        while let Ok(message) = queue.try_recv() {
            self.handle(message);
        }
    }

    fn push(&mut self, payload: Vec<u8>) {
        if payload.len() + self.buffer.len() < self.config.buffer_size {
            self.buffer.extend_from_slice(&payload);
            return;
        }

        self.flush();
        if payload.len() > self.config.direct_write_size {
            self.write_to_file(&payload);
        } else {
            self.buffer.extend_from_slice(&payload);
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            if self.file.is_none() {
                self.reopen();
            }
            return;
        }
        let buffer = std::mem::take(&mut self.buffer);
        self.write_to_file(&buffer);
        self.buffer = buffer;
        self.buffer.clear();
    }

    fn write_to_file(&mut self, data: &[u8]) {
        if self.file.is_none() {
            self.reopen();
        }
        let path = &self.config.file_path;
        let Some(file) = self.file.as_mut() else {
            error!("Dropping {} bytes, {} is not open", data.len(), path.display());
            return;
        };
        if let Err(e) = file.write_all(data) {
            warn!("Failed to write {} bytes to {}: {}", data.len(), path.display(), e);
        }
    }

    fn reopen(&mut self) {
        match open_active(&self.config) {
            Ok(file) => {
                self.file = Some(file);
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("Reopened {}", self.config.file_path.display());
                }
            }
            Err(e) => {
                error!("Failed to reopen log file: {}", e);
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
    }

    fn current_size(&self) -> io::Result<u64> {
        match &self.file {
            Some(file) => file.metadata().map(|m| m.len()),
            None => fs::metadata(&self.config.file_path).map(|m| m.len()),
        }
    }

    /// Swap the active file out to `backup` and hand it to a background task
    fn rotate_file(&mut self, backup: PathBuf) {
        let active = self.config.file_path.clone();
        if backup == active {
            warn!("Refusing to rotate {} onto itself", active.display());
            return;
        }

        self.flush();

        if self.config.skip_empty_backups {
            match self.current_size() {
                Ok(0) => {
                    debug!("Skipping rotation of empty {}", active.display());
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to stat {}: {}", active.display(), e);
                    return;
                }
            }
        }

        if let Some(parent) = backup.parent() {
            if let Err(e) = create_dirs(parent, self.config.dir_mode) {
                warn!("Failed to create {}: {}", parent.display(), e);
            }
        }

        // Close before renaming
        drop(self.file.take());
        if let Err(e) = fs::rename(&active, &backup) {
            error!(
                "Failed to rotate {} to {}: {}",
                active.display(),
                backup.display(),
                e
            );
            self.reopen();
            return;
        }
        info!("Rotated {} to {}", active.display(), backup.display());
        self.reopen();

        self.spawn_post_rotation(backup);
    }

    /// Compress and prune off the hot path. Nothing waits for this task.
    fn spawn_post_rotation(&self, backup: PathBuf) {
        let config = Arc::clone(&self.config);
        let retention = self.retention.clone();
        let outcome_tx = self.outcome_tx.clone();

        let spawned = thread::Builder::new()
            .name("rollwrite-compress".to_string())
            .spawn(move || {
                let outcome = post_rotation(&config, retention.as_deref(), backup);
                // Nobody may be listening; never block on it
                let _ = outcome_tx.try_send(outcome);
            });

        if let Err(e) = spawned {
            error!("Failed to spawn post-rotation task: {}", e);
        }
    }
}

fn post_rotation(
    config: &ResolvedConfig,
    retention: Option<&Retention>,
    backup: PathBuf,
) -> RotationOutcome {
    let result = if config.compress {
        compress_backup(&backup, config.file_mode).map(|_| ())
    } else {
        Ok(())
    };
    if let Err(e) = &result {
        warn!("Failed to compress {}: {}", backup.display(), e);
    }

    // An uncompressed backup left by a failed compression still counts
    let evicted = retention
        .map(|r| r.admit(backup.clone()))
        .unwrap_or_default();

    RotationOutcome {
        compressed: config.compress && result.is_ok(),
        backup,
        evicted,
        result,
    }
}
