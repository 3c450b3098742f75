#![forbid(unsafe_code)]

//! Modeler fixture: a stand-in for the Modeler tool's TCP status interface.
//!
//! The fixture listens on a loopback port, answers `status` polls with the
//! tool's step messages, and deposits canned result files into the job's
//! staging directory as the job "progresses". Terminal behavior reproduces
//! the real tool's quirks at configurable rates so the client under test has
//! to cope with them.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use modeler_fixture::prelude::*;
//!
//! # fn main() -> modeler_fixture::core::errors::Result<()> {
//! let job = JobContext::from_staging_dir("/srv/buffer/780200XXC00".as_ref(), 5000, 4)?;
//! let report = FixtureServer::new(job, Config::load(None)?, None).run(None)?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod driver;
pub mod logger;
pub mod stager;
