//! Signal handling: SIGTERM/SIGINT request shutdown while the fixture waits
//! for its session to finish.
//!
//! Uses the `signal-hook` crate for safe signal registration. The waiting
//! loop polls `SignalHandler` between slices instead of blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::driver::server::ServerHandle;

/// Slice the entry point waits on the done signal between flag checks.
pub const WAIT_SLICE: Duration = Duration::from_millis(250);

// ──────────────────── signal handler ────────────────────

/// Shutdown flag shared between the OS signal hook and the waiting loop.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register SIGTERM/SIGINT.
    ///
    /// Registration is best-effort; failures are reported on stderr.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// A handler no OS signal can trip; only `request_shutdown` sets it.
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[MDL-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[MDL-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── waiting ────────────────────

/// How waiting on a running server ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Finished,
    Interrupted,
}

/// Block until the server thread finishes or a shutdown is requested.
pub fn wait_for_server(
    handle: &ServerHandle,
    signals: &SignalHandler,
    slice: Duration,
) -> WaitOutcome {
    loop {
        if signals.should_shutdown() {
            return WaitOutcome::Interrupted;
        }
        if handle.wait_done(slice) {
            return WaitOutcome::Finished;
        }
    }
}
