//! Activity logging: JSONL file plus console echo on a dedicated thread.

pub mod activity;
pub mod jsonl;
