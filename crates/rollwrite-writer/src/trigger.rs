//! Rotation trigger: decides when the active file must be rotated
//!
//! The trigger runs on its own thread and never touches the active file
//! handle. Each decision is a backup path sent over a rendezvous channel;
//! the writer loop performs the actual swap.

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, never, select, tick, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rollwrite_core::{Policy, ResolvedConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::schedule::{parse_schedule, FireSchedule};

/// Produces backup paths from the start of the current rotation window
pub struct BackupNamer {
    config: Arc<ResolvedConfig>,
    window_start: Mutex<DateTime<Local>>,
}

impl BackupNamer {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self {
            config,
            window_start: Mutex::new(Local::now()),
        }
    }

    /// Name the window that is closing and start a new one
    pub fn next_backup(&self) -> PathBuf {
        let mut start = self.window_start.lock();
        let path = self.config.backup_path(*start);
        *start = Local::now();
        path
    }

    pub fn window_start(&self) -> DateTime<Local> {
        *self.window_start.lock()
    }
}

/// Emits rotation events according to the configured policy
pub struct RotationTrigger {
    events: Receiver<PathBuf>,
    namer: Arc<BackupNamer>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RotationTrigger {
    /// Start the trigger. Fails with `InvalidSchedule` if a time policy's
    /// cron expression does not parse.
    pub fn start(config: Arc<ResolvedConfig>) -> Result<Self> {
        let namer = Arc::new(BackupNamer::new(Arc::clone(&config)));

        match config.policy.clone() {
            Policy::None => Ok(Self {
                events: never(),
                namer,
                stop_tx: None,
                handle: None,
            }),
            Policy::Schedule(pattern) => {
                let schedule = parse_schedule(&pattern)?;
                info!("Rotating {} on schedule '{}'", config.file_path.display(), pattern);
                Self::spawn(namer, "rollwrite-schedule", move |namer, events, stop| {
                    run_schedule(schedule, &namer, &events, &stop)
                })
            }
            Policy::Volume(threshold) => {
                info!(
                    "Rotating {} above {} bytes",
                    config.file_path.display(),
                    threshold
                );
                Self::spawn(namer, "rollwrite-volume", move |namer, events, stop| {
                    run_volume(&config, threshold, &namer, &events, &stop)
                })
            }
        }
    }

    fn spawn<F>(namer: Arc<BackupNamer>, name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<BackupNamer>, Sender<PathBuf>, Receiver<()>) + Send + 'static,
    {
        let (events_tx, events_rx) = bounded(0);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread_namer = Arc::clone(&namer);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_namer, events_tx, stop_rx))?;

        Ok(Self {
            events: events_rx,
            namer,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Channel of backup paths, one per rotation decision
    pub fn events(&self) -> Receiver<PathBuf> {
        self.events.clone()
    }

    /// Shared namer, used for manual rotations so they follow the same rule
    pub fn namer(&self) -> &Arc<BackupNamer> {
        &self.namer
    }

    /// Stop the trigger thread. Safe to call more than once.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel and wakes the thread
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Rotation trigger thread panicked");
            }
        }
    }
}

impl Drop for RotationTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hand a backup path to the writer, giving up if the trigger is stopped first
fn send_event(events: &Sender<PathBuf>, stop: &Receiver<()>, backup: PathBuf) -> bool {
    select! {
        send(events, backup) -> res => res.is_ok(),
        recv(stop) -> _ => false,
    }
}

fn run_schedule<S: FireSchedule>(
    schedule: S,
    namer: &BackupNamer,
    events: &Sender<PathBuf>,
    stop: &Receiver<()>,
) {
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            info!("Rotation schedule has no further fire times");
            return;
        };

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }

        let backup = namer.next_backup();
        debug!("Schedule fired, rotating to {}", backup.display());
        if !send_event(events, stop, backup) {
            return;
        }
    }
}

fn run_volume(
    config: &ResolvedConfig,
    threshold: u64,
    namer: &BackupNamer,
    events: &Sender<PathBuf>,
    stop: &Receiver<()>,
) {
    let mut ticker = tick(config.poll_interval);

    loop {
        select! {
            recv(stop) -> _ => return,
            recv(ticker) -> _ => {}
        }
        if !exceeds_threshold(config, threshold) {
            continue;
        }

        let backup = namer.next_backup();
        debug!("Size threshold reached, rotating to {}", backup.display());
        if !send_event(events, stop, backup) {
            return;
        }
        // A tick stored while the send was blocked would stat the file
        // before the writer has renamed it
        ticker = tick(config.poll_interval);
    }
}

/// A failed stat counts as "not yet" and is retried on the next tick
fn exceeds_threshold(config: &ResolvedConfig, threshold: u64) -> bool {
    match std::fs::metadata(&config.file_path) {
        Ok(meta) => meta.len() > threshold,
        Err(e) => {
            debug!("Failed to stat {}: {}", config.file_path.display(), e);
            false
        }
    }
}
