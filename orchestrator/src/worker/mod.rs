//! # Worker
//!
//! Everything that runs inside one worker process: the driver that pulls
//! frames through the sink chain, the command dispatcher that
//! answers the Supervisor over stdio, the process-side main loop,
//! and the Supervisor-side helper that spawns a fresh worker (`spawn`).

pub mod dispatcher;
pub mod pipeline;
pub mod process;
pub mod spawn;

pub use spawn::{spawn_worker, WORKER_SUBCOMMAND};
