//! Process-level plumbing around a running fixture: signal handling.

#[cfg(feature = "daemon")]
pub mod signals;
