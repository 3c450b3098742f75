//! Job-step protocol driver: step table, terminal quirks, the per-connection
//! state machine, and the single-client TCP server.

pub mod quirks;
pub mod server;
pub mod session;
pub mod step;
