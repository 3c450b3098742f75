//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use modeler_fixture::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FixtureError, Result};
pub use crate::core::job::JobContext;

// Driver
pub use crate::driver::quirks::{
    QuirkConfig, QuirkDecision, QuirkSource, RandomQuirks, ResultOutcome, ScriptedQuirks,
    TerminalMessage,
};
pub use crate::driver::server::{FixtureServer, ServerHandle};
pub use crate::driver::session::{ConnectionSession, SessionOutcome, SessionReport};
pub use crate::driver::step::JobStep;

// Stager
pub use crate::stager::files::{CopyOptions, Stager};
pub use crate::stager::plan::{FixtureTree, FixtureVariant};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
