//! Protocol state machine for the one accepted connection.
//!
//! Each read is treated as one message. Only the exact text `status` drives
//! the machine; anything else is logged and left unanswered. For a
//! non-terminal step the session stages that step's files, writes
//! `Step {n} in process.` for the step it is leaving, then advances. At
//! `Complete` it runs the terminal quirk policy and is only marked complete
//! once a terminal message has actually been written.
//!
//! Staging for a poll always finishes before its response is written.

#![allow(missing_docs)]

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::core::errors::{FixtureError, Result};
use crate::driver::quirks::{QuirkSource, ResultOutcome};
use crate::driver::step::JobStep;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::stager::files::Stager;
use crate::stager::plan::{FixtureTree, FixtureVariant, StagingOp};

/// The only command the Modeler answers.
pub const STATUS_REQUEST: &str = "status";

/// Wire text for a non-terminal step.
#[must_use]
pub fn step_message(step: JobStep) -> String {
    format!("Step {} in process.", step.ordinal())
}

/// What a single message produced on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollReply {
    Sent(String),
    /// Terminal poll answered with silence.
    Withheld,
    /// Not a status request.
    Ignored,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { result: ResultOutcome },
    /// Peer closed the connection before a terminal message was sent.
    PeerClosed,
}

impl SessionOutcome {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed {
                result: ResultOutcome::Pass,
            } => "completed (pass)",
            Self::Completed {
                result: ResultOutcome::Fail,
            } => "completed (fail)",
            Self::Completed {
                result: ResultOutcome::Omitted,
            } => "completed (no result)",
            Self::PeerClosed => "peer closed",
        }
    }
}

/// Summary of one served connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub polls: u64,
    pub final_step: JobStep,
}

/// Everything the session needs besides the stream.
pub struct SessionDeps {
    pub tree: FixtureTree,
    pub staging_dir: PathBuf,
    pub stager: Stager,
    pub quirks: Box<dyn QuirkSource>,
    pub step_delay: Duration,
    pub read_buffer_bytes: usize,
    pub logger: Option<ActivityLoggerHandle>,
}

/// The single accepted connection plus its protocol state.
pub struct ConnectionSession<S> {
    stream: S,
    deps: SessionDeps,
    step: JobStep,
    completed: Option<ResultOutcome>,
    polls: u64,
}

impl<S: Read + Write> ConnectionSession<S> {
    /// A freshly accepted connection starts at `Step1`.
    pub fn new(stream: S, deps: SessionDeps) -> Self {
        Self {
            stream,
            deps,
            step: JobStep::Step1,
            completed: None,
            polls: 0,
        }
    }

    #[must_use]
    pub fn step(&self) -> JobStep {
        self.step
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }

    /// Number of status polls processed so far.
    #[must_use]
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read and answer messages until the session completes or the peer closes.
    pub fn run(&mut self) -> Result<SessionReport> {
        let mut buf = vec![0u8; self.deps.read_buffer_bytes.max(1)];
        loop {
            if let Some(result) = self.completed {
                return Ok(self.report(SessionOutcome::Completed { result }));
            }
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Ok(self.report(SessionOutcome::PeerClosed)),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FixtureError::socket("read", e)),
            };
            let message = String::from_utf8_lossy(&buf[..n]).into_owned();
            self.handle_message(&message)?;
        }
    }

    /// Interpret one message.
    pub fn handle_message(&mut self, message: &str) -> Result<PollReply> {
        self.emit(ActivityEvent::RequestReceived {
            message: message.to_string(),
        });
        if message != STATUS_REQUEST || self.completed.is_some() {
            return Ok(PollReply::Ignored);
        }
        self.polls += 1;
        thread::sleep(self.deps.step_delay);

        let current = self.step;
        let ops = current.staging_action(&self.deps.tree, &self.deps.staging_dir);
        self.deps.stager.stage(&ops)?;

        if current.is_terminal() {
            return self.terminal_poll();
        }

        let reply = step_message(current);
        self.write_reply(current, &reply)?;
        self.step = current.next();
        Ok(PollReply::Sent(reply))
    }

    fn terminal_poll(&mut self) -> Result<PollReply> {
        let decision = self.deps.quirks.decide();
        if !decision.send {
            self.emit(ActivityEvent::ResponseWithheld {
                step: self.step.ordinal(),
            });
            return Ok(PollReply::Withheld);
        }

        let reply = decision.message.text().to_string();
        self.write_reply(self.step, &reply)?;

        thread::sleep(decision.result_delay);
        let variant = match decision.outcome {
            ResultOutcome::Pass => Some(FixtureVariant::Pass),
            ResultOutcome::Fail => Some(FixtureVariant::Fail),
            ResultOutcome::Omitted => None,
        };
        if let Some(variant) = variant {
            let op = StagingOp::same_name(
                &self.deps.tree,
                variant,
                "Data.xml",
                &self.deps.staging_dir,
            );
            self.deps.stager.copy_file(&op.source, &op.dest)?;
        } else {
            self.emit(ActivityEvent::ResultOmitted {
                job: self.deps.tree.job().to_string(),
            });
        }

        self.completed = Some(decision.outcome);
        Ok(PollReply::Sent(reply))
    }

    fn write_reply(&mut self, step: JobStep, reply: &str) -> Result<()> {
        self.stream
            .write_all(reply.as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| FixtureError::socket("write", e))?;
        self.emit(ActivityEvent::ResponseSent {
            step: step.ordinal(),
            message: reply.to_string(),
        });
        Ok(())
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            outcome,
            polls: self.polls,
            final_step: self.step,
        }
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.deps.logger {
            logger.send(event);
        }
    }
}
