//! Reencode Core - bridge between a host plugin and a native re-encode engine
//!
//! This crate contains the boundary logic with zero UI dependencies:
//! - `abi`: the C ABI shared with the engine library
//! - `result`: owned engine results that are freed exactly once
//! - `engine`: the single-owner engine handle
//! - `progress`: the progress sink handed across the boundary
//! - `background`: the continuing-background-task scheduler seam
//! - `dispatch`: the UI-affine serial context for event delivery
//! - `coordinator`: the job state machine tying it all together
//! - `models`: requests, progress events and job records
//! - `config`: TOML settings shared by host and engine
//! - `logging`: tracing setup and per-job log files

pub mod abi;
pub mod background;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod logging;
pub mod models;
pub mod progress;
pub mod result;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
