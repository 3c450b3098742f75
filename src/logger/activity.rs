//! Activity logger: a dedicated thread owns the JSONL writer and the console.
//!
//! The driver and stager send `ActivityEvent`s through a bounded crossbeam
//! channel. `send()` uses `try_send()` so a slow disk never stalls a poll.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{FixtureError, Result};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};

// ──────────────────── public event type ────────────────────

/// Events produced over one fixture run.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    FixtureStarted {
        job: String,
        invocation: String,
        version: String,
        config_hash: String,
    },
    FixtureStopped {
        job: String,
        outcome: String,
        uptime_secs: u64,
    },
    Listening {
        job: String,
        addr: String,
    },
    ClientConnected {
        peer: String,
    },
    RequestReceived {
        message: String,
    },
    ResponseSent {
        step: u8,
        message: String,
    },
    ResponseWithheld {
        step: u8,
    },
    FileStaged {
        source: PathBuf,
        dest: PathBuf,
        bytes: u64,
        sha256: String,
    },
    ResultOmitted {
        job: String,
    },
    DirectoryCopied {
        source: PathBuf,
        dest: PathBuf,
        files: usize,
        source_removed: bool,
    },
    DirectoryDeleted {
        path: PathBuf,
        files: usize,
    },
    SessionEnded {
        outcome: String,
        polls: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking; drops when full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Request graceful shutdown. Blocks only until the sentinel is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for building the activity logger.
#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    /// JSONL destination. `None` keeps console output only.
    pub jsonl_path: Option<PathBuf>,
    /// Echo a human-readable line per event to stdout.
    pub console: bool,
    pub channel_capacity: usize,
}

impl From<&LoggingConfig> for ActivityLoggerConfig {
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            jsonl_path: Some(cfg.activity_log.clone()),
            console: cfg.console,
            channel_capacity: cfg.channel_capacity,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The thread runs until `handle.shutdown()` is called or every sender is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("modeler-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped_clone))
        .map_err(|e| FixtureError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

/// Wait for the logger thread after `shutdown()`.
///
/// A panicked logger is reported on stderr; returns `false` in that case.
pub fn join_logger(join: thread::JoinHandle<()>) -> bool {
    if join.join().is_ok() {
        return true;
    }
    let _ = writeln!(
        io::stderr(),
        "[MDL-LOGGER] activity logger thread panicked; activity log may be incomplete"
    );
    false
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(
    rx: &Receiver<ActivityEvent>,
    config: ActivityLoggerConfig,
    dropped: &AtomicU64,
) {
    let mut jsonl = config.jsonl_path.map(JsonlWriter::open);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0
            && let Some(w) = jsonl.as_mut()
        {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            w.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        if let Some(w) = jsonl.as_mut() {
            w.write_entry(&event_to_log_entry(&event));
        }
        if config.console {
            echo_console(&event);
        }
    }

    if let Some(w) = jsonl.as_mut() {
        w.flush();
    }
}

fn echo_console(event: &ActivityEvent) {
    let Some(line) = console_line(event) else {
        return;
    };
    if matches!(event, ActivityEvent::Error { .. }) {
        let _ = writeln!(io::stderr(), "{line}");
    } else {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Human-readable console rendering of an event.
pub fn console_line(event: &ActivityEvent) -> Option<String> {
    let line = match event {
        ActivityEvent::FixtureStarted {
            job, invocation, ..
        } => format!("{invocation}\n\nModeler simulator started for job {job}..."),
        ActivityEvent::FixtureStopped {
            job,
            outcome,
            uptime_secs,
        } => format!("Modeler simulator for job {job} stopped: {outcome} (uptime={uptime_secs}s)"),
        ActivityEvent::Listening { job, addr } => {
            format!("Waiting for a TCP/IP connection for job {job} on {addr}...")
        }
        ActivityEvent::ClientConnected { peer } => format!("Connected! ({peer})"),
        ActivityEvent::RequestReceived { message } => format!("Received: {message}"),
        ActivityEvent::ResponseSent { message, .. } => format!("Sent: {message}"),
        ActivityEvent::ResponseWithheld { step } => {
            format!("Withheld terminal response at step {step}")
        }
        ActivityEvent::FileStaged { source, dest, .. } => {
            format!("Copied {} -> {}", source.display(), dest.display())
        }
        ActivityEvent::ResultOmitted { job } => format!("No final result staged for job {job}"),
        ActivityEvent::DirectoryCopied {
            source,
            dest,
            files,
            ..
        } => format!(
            "Copied directory {} -> {} ({files} files)",
            source.display(),
            dest.display()
        ),
        ActivityEvent::DirectoryDeleted { path, .. } => {
            format!("Deleted Directory {}", path.display())
        }
        ActivityEvent::SessionEnded { outcome, polls } => {
            format!("Session ended: {outcome} after {polls} polls")
        }
        ActivityEvent::Error { code, message } => format!("[{code}] {message}"),
        ActivityEvent::Shutdown => return None,
    };
    Some(line)
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::FixtureStarted {
            job,
            invocation,
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::FixtureStart, Severity::Info);
            e.job = Some(job.clone());
            e.message = Some(invocation.clone());
            e.details = Some(format!("version={version}, config_hash={config_hash}"));
            e
        }
        ActivityEvent::FixtureStopped {
            job,
            outcome,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::FixtureStop, Severity::Info);
            e.job = Some(job.clone());
            e.details = Some(format!("outcome={outcome}, uptime={uptime_secs}s"));
            e
        }
        ActivityEvent::Listening { job, addr } => {
            let mut e = LogEntry::new(EventType::Listening, Severity::Info);
            e.job = Some(job.clone());
            e.details = Some(addr.clone());
            e
        }
        ActivityEvent::ClientConnected { peer } => {
            let mut e = LogEntry::new(EventType::ClientConnected, Severity::Info);
            e.details = Some(peer.clone());
            e
        }
        ActivityEvent::RequestReceived { message } => {
            let mut e = LogEntry::new(EventType::RequestReceived, Severity::Info);
            e.message = Some(message.clone());
            e
        }
        ActivityEvent::ResponseSent { step, message } => {
            let mut e = LogEntry::new(EventType::ResponseSent, Severity::Info);
            e.step = Some(*step);
            e.message = Some(message.clone());
            e
        }
        ActivityEvent::ResponseWithheld { step } => {
            let mut e = LogEntry::new(EventType::ResponseWithheld, Severity::Warning);
            e.step = Some(*step);
            e
        }
        ActivityEvent::FileStaged {
            source,
            dest,
            bytes,
            sha256,
        } => {
            let mut e = LogEntry::new(EventType::FileStaged, Severity::Info);
            e.path = Some(source.to_string_lossy().to_string());
            e.dest = Some(dest.to_string_lossy().to_string());
            e.bytes = Some(*bytes);
            e.sha256 = Some(sha256.clone());
            e
        }
        ActivityEvent::ResultOmitted { job } => {
            let mut e = LogEntry::new(EventType::ResultOmitted, Severity::Warning);
            e.job = Some(job.clone());
            e
        }
        ActivityEvent::DirectoryCopied {
            source,
            dest,
            files,
            source_removed,
        } => {
            let mut e = LogEntry::new(EventType::DirectoryCopied, Severity::Info);
            e.path = Some(source.to_string_lossy().to_string());
            e.dest = Some(dest.to_string_lossy().to_string());
            e.details = Some(format!("files={files}, source_removed={source_removed}"));
            e
        }
        ActivityEvent::DirectoryDeleted { path, files } => {
            let mut e = LogEntry::new(EventType::DirectoryDeleted, Severity::Info);
            e.path = Some(path.to_string_lossy().to_string());
            e.details = Some(format!("files={files}"));
            e
        }
        ActivityEvent::SessionEnded { outcome, polls } => {
            let mut e = LogEntry::new(EventType::SessionEnded, Severity::Info);
            e.details = Some(format!("outcome={outcome}, polls={polls}"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.details = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::FixtureStop, Severity::Info),
    }
}
