//! Fixture file stager: the sole writer into the shared staging directory.

pub mod files;
pub mod plan;
