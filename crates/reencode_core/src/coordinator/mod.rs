//! Job coordinator for re-encode requests.
//!
//! Drives each accepted request through the background task lifecycle:
//!
//! ```text
//! Idle ──submit──▶ Registered ──launch──▶ Running ──▶ Completed
//!                      │                     │
//!                      └──── refused ────────┴──────▶ Failed
//! ```
//!
//! Progress samples update the OS task's unit counter and are posted to the
//! UI context as `"progress"` events in engine order. The job settles
//! exactly once, after its last event, also on the UI context.
//!
//! # Example
//!
//! ```ignore
//! use reencode_core::coordinator::{CoordinatorOptions, JobCoordinator};
//!
//! let coordinator = JobCoordinator::new(engine, scheduler, ui, listener, CoordinatorOptions::default());
//! let pending = coordinator.submit(request)?;
//! pending.wait()?;
//! ```

mod errors;
mod job_coordinator;
mod pending;

pub use errors::{CoordinatorError, CoordinatorResult, BUDGET_EXPIRED_MESSAGE, CANCELLED_MESSAGE};
pub use job_coordinator::{CoordinatorOptions, EventListener, JobCoordinator, SettleHandler};
pub use pending::PendingReencode;
