//! Terminal quirk policy: randomized send/skip, message shape, result lag and outcome.
//!
//! The real Modeler sometimes never sends its final message, sometimes glues
//! a stale step line onto it, deposits its result file seconds after saying
//! it is done, and now and then never reports an outcome at all. Each of
//! these is drawn independently every time the terminal step is processed.
//!
//! Ratios are expressed as "1 in N": `0` disables the quirk, `1` makes it
//! unconditional, `N` fires with probability `1/N`.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::config::TimingConfig;
use crate::core::errors::{FixtureError, Result};

/// Plain terminal message.
pub const DONE_MESSAGE: &str = "Whole process done, socket closed.";
/// Terminal message merged with a stale step line, as the tool occasionally sends it.
pub const COMBINED_DONE_MESSAGE: &str = "Step 1 in process. Whole process done, socket closed.";

/// Ratios for the terminal draws.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuirkConfig {
    /// Terminal polls answered with silence.
    pub skip_send_one_in: u32,
    /// Terminal messages sent in the combined shape.
    pub combined_message_one_in: u32,
    /// Runs that never stage a final Data.xml.
    pub omit_result_one_in: u32,
    /// Staged results that are Fail rather than Pass.
    pub fail_result_one_in: u32,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for QuirkConfig {
    fn default() -> Self {
        Self {
            skip_send_one_in: 6,
            combined_message_one_in: 5,
            omit_result_one_in: 5,
            fail_result_one_in: 5,
            seed: None,
        }
    }
}

impl QuirkConfig {
    /// No quirks: always send the plain message and stage Pass.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            skip_send_one_in: 0,
            combined_message_one_in: 0,
            omit_result_one_in: 0,
            fail_result_one_in: 0,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        // A guaranteed skip would withhold the terminal message forever.
        if self.skip_send_one_in == 1 {
            return Err(FixtureError::InvalidConfig {
                details: "quirks.skip_send_one_in must be 0 (never) or >= 2".to_string(),
            });
        }
        Ok(())
    }
}

/// Which terminal string is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMessage {
    Plain,
    Combined,
}

impl TerminalMessage {
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Plain => DONE_MESSAGE,
            Self::Combined => COMBINED_DONE_MESSAGE,
        }
    }
}

/// Final result deposited after the terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Pass,
    Fail,
    /// Nothing staged; the tool never reports an outcome.
    Omitted,
}

/// One terminal-poll decision. Not persisted; drawn again on every terminal poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuirkDecision {
    pub send: bool,
    pub message: TerminalMessage,
    pub result_delay: Duration,
    pub outcome: ResultOutcome,
}

impl QuirkDecision {
    /// Send `message`, then stage `outcome` with no lag.
    #[must_use]
    pub const fn deliver(message: TerminalMessage, outcome: ResultOutcome) -> Self {
        Self {
            send: true,
            message,
            result_delay: Duration::ZERO,
            outcome,
        }
    }

    /// Send nothing this poll.
    #[must_use]
    pub const fn withheld() -> Self {
        Self {
            send: false,
            message: TerminalMessage::Plain,
            result_delay: Duration::ZERO,
            outcome: ResultOutcome::Omitted,
        }
    }
}

/// Source of terminal decisions. Swapped for a scripted source in tests.
pub trait QuirkSource: Send {
    fn decide(&mut self) -> QuirkDecision;
}

/// Draws decisions from an RNG according to a [`QuirkConfig`].
pub struct RandomQuirks {
    config: QuirkConfig,
    delay_ms: RangeInclusive<u64>,
    rng: StdRng,
}

impl RandomQuirks {
    #[must_use]
    pub fn new(config: &QuirkConfig, timing: &TimingConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let min = timing.result_delay_min_ms.min(timing.result_delay_max_ms);
        Self {
            config: config.clone(),
            delay_ms: min..=timing.result_delay_max_ms,
            rng,
        }
    }

    fn one_in(&mut self, n: u32) -> bool {
        n != 0 && self.rng.random_range(0..n) == 0
    }
}

impl QuirkSource for RandomQuirks {
    fn decide(&mut self) -> QuirkDecision {
        let send = !self.one_in(self.config.skip_send_one_in);
        let message = if self.one_in(self.config.combined_message_one_in) {
            TerminalMessage::Combined
        } else {
            TerminalMessage::Plain
        };
        let result_delay = Duration::from_millis(self.rng.random_range(self.delay_ms.clone()));
        let omitted = self.one_in(self.config.omit_result_one_in);
        let fail = self.one_in(self.config.fail_result_one_in);
        let outcome = match (omitted, fail) {
            (true, _) => ResultOutcome::Omitted,
            (false, true) => ResultOutcome::Fail,
            (false, false) => ResultOutcome::Pass,
        };
        QuirkDecision {
            send,
            message,
            result_delay,
            outcome,
        }
    }
}

/// Replays a fixed queue of decisions, then delivers plain Pass.
#[derive(Debug, Clone)]
pub struct ScriptedQuirks {
    queue: VecDeque<QuirkDecision>,
    fallback: QuirkDecision,
}

impl ScriptedQuirks {
    pub fn new(decisions: impl IntoIterator<Item = QuirkDecision>) -> Self {
        Self {
            queue: decisions.into_iter().collect(),
            fallback: QuirkDecision::deliver(TerminalMessage::Plain, ResultOutcome::Pass),
        }
    }
}

impl QuirkSource for ScriptedQuirks {
    fn decide(&mut self) -> QuirkDecision {
        self.queue.pop_front().unwrap_or(self.fallback)
    }
}
