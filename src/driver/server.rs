//! Fixture server: setup staging, bind, accept one client, serve the session.
//!
//! `run` does the whole lifecycle on the calling thread. `spawn` moves it to a
//! named `modeler-driver` thread and hands back a [`ServerHandle`] carrying a
//! ready signal (the bound address) and a done signal raised from a drop guard.

#![allow(missing_docs)]

use std::fs;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::config::Config;
use crate::core::errors::{FixtureError, Result};
use crate::core::job::JobContext;
use crate::driver::quirks::{QuirkSource, RandomQuirks};
use crate::driver::session::{ConnectionSession, SessionDeps, SessionOutcome, SessionReport};
use crate::driver::step::JobStep;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::stager::files::{CopyOptions, Stager};
use crate::stager::plan::FixtureTree;

/// One fixture run for one job.
pub struct FixtureServer {
    job: JobContext,
    config: Config,
    stager: Stager,
    quirks: Box<dyn QuirkSource>,
    logger: Option<ActivityLoggerHandle>,
}

impl FixtureServer {
    /// Build a server whose terminal quirks are drawn from `config.quirks`.
    #[must_use]
    pub fn new(job: JobContext, config: Config, logger: Option<ActivityLoggerHandle>) -> Self {
        let quirks = RandomQuirks::new(&config.quirks, &config.timing);
        Self {
            job,
            stager: Stager::new(logger.clone()),
            config,
            quirks: Box::new(quirks),
            logger,
        }
    }

    /// Replace the random quirk source.
    #[must_use]
    pub fn with_quirks(mut self, quirks: impl QuirkSource + 'static) -> Self {
        self.quirks = Box::new(quirks);
        self
    }

    #[must_use]
    pub fn tree(&self) -> FixtureTree {
        FixtureTree::new(&self.config.fixture.test_root, &self.job.job_id)
    }

    /// Run setup, serve exactly one connection, and report how it ended.
    ///
    /// The bound address is sent on `ready` once the listener is open.
    /// Errors are logged before being returned.
    pub fn run(self, ready: Option<&Sender<SocketAddr>>) -> Result<SessionReport> {
        let logger = self.logger.clone();
        let result = self.run_inner(ready);
        if let (Err(e), Some(logger)) = (&result, &logger) {
            logger.send(ActivityEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
        }
        result
    }

    /// Run on a background `modeler-driver` thread.
    pub fn spawn(self) -> Result<ServerHandle> {
        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let thread = thread::Builder::new()
            .name("modeler-driver".to_string())
            .spawn(move || {
                let _done = DoneGuard(done_tx);
                self.run(Some(&ready_tx))
            })
            .map_err(|source| FixtureError::Runtime {
                details: format!("failed to spawn driver thread: {source}"),
            })?;

        Ok(ServerHandle {
            ready_rx,
            done_rx,
            thread,
        })
    }

    // ──────────────────── lifecycle ────────────────────

    fn run_inner(self, ready: Option<&Sender<SocketAddr>>) -> Result<SessionReport> {
        let tree = self.tree();
        self.prepare_staging()?;

        thread::sleep(self.config.timing.setup_delay());
        let setup = JobStep::setup_action(&tree, &self.job.staging_dir);
        self.stager.copy_file(&setup.source, &setup.dest)?;

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.job.listen_port))
            .map_err(|e| FixtureError::socket("bind", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| FixtureError::socket("local_addr", e))?;
        self.emit(ActivityEvent::Listening {
            job: self.job.job_id.clone(),
            addr: addr.to_string(),
        });
        if let Some(tx) = ready {
            let _ = tx.try_send(addr);
        }

        let (stream, peer) = listener
            .accept()
            .map_err(|e| FixtureError::socket("accept", e))?;
        // Single client: stop listening as soon as it is connected.
        drop(listener);
        self.emit(ActivityEvent::ClientConnected {
            peer: peer.to_string(),
        });

        let deps = SessionDeps {
            tree,
            staging_dir: self.job.staging_dir.clone(),
            stager: self.stager.clone(),
            quirks: self.quirks,
            step_delay: self.config.timing.step_delay(),
            read_buffer_bytes: self.config.server.read_buffer_bytes,
            logger: self.logger.clone(),
        };
        let mut session = ConnectionSession::new(stream, deps);
        let report = session.run()?;
        drop(session);

        if let SessionOutcome::Completed { .. } = report.outcome
            && let Some(archive) = &self.config.fixture.archive_dir
        {
            self.stager.copy_directory(
                &self.job.staging_dir,
                &archive.join(&self.job.job_id),
                CopyOptions {
                    remove_source: false,
                    overwrite: true,
                },
            )?;
        }

        if let Some(logger) = &self.logger {
            logger.send(ActivityEvent::SessionEnded {
                outcome: report.outcome.label().to_string(),
                polls: report.polls,
            });
        }
        Ok(report)
    }

    fn prepare_staging(&self) -> Result<()> {
        let dir = &self.job.staging_dir;
        if self.config.fixture.reset_staging && dir.is_dir() {
            self.stager.delete_directory(dir)?;
        }
        fs::create_dir_all(dir).map_err(|e| FixtureError::io(dir, e))
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

// ──────────────────── background handle ────────────────────

/// Raises the done signal however the driver thread exits.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Handle to a server running on its own thread.
pub struct ServerHandle {
    ready_rx: Receiver<SocketAddr>,
    done_rx: Receiver<()>,
    thread: JoinHandle<Result<SessionReport>>,
}

impl ServerHandle {
    /// The bound address, or `None` if setup failed or `timeout` elapsed.
    pub fn wait_ready(&self, timeout: Duration) -> Option<SocketAddr> {
        self.ready_rx.recv_timeout(timeout).ok()
    }

    /// `true` once the driver thread has finished.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        matches!(
            self.done_rx.recv_timeout(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Wait for the driver thread and return its result.
    pub fn join(self) -> Result<SessionReport> {
        self.thread.join().map_err(|_| FixtureError::Runtime {
            details: "driver thread panicked".to_string(),
        })?
    }
}
