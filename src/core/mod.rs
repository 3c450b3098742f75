//! Core types: errors, configuration, job identity.

pub mod config;
pub mod errors;
pub mod job;
pub mod paths;
