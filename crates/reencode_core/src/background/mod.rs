//! Continuing-background-task scheduler seam.
//!
//! The coordinator talks to the OS scheduler only through
//! [`BackgroundScheduler`] and [`BackgroundTask`]. A launch handler is
//! registered once per identifier; each submission later causes the
//! scheduler to call that handler on a context of its choosing with the
//! task it created.
//!
//! # Architecture
//!
//! ```text
//! JobCoordinator
//!     ├── register(identifier, handler)   once, idempotent
//!     └── submit(descriptor)              per job
//!             │
//!             ▼
//!     scheduler thread ── handler(task) ── engine.reencode(...)
//!             │
//!             └── budget watchdog ── task expiration handler
//! ```

mod thread_scheduler;

use std::io;
use std::sync::Arc;

use thiserror::Error;

pub use thread_scheduler::{TaskSnapshot, ThreadScheduler};

/// Descriptor of a task to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Fixed identifier the launch handler was registered under.
    pub identifier: String,
    /// Title shown by the OS while the task runs.
    pub title: String,
    /// Mutable line under the title (the file being re-encoded).
    pub subtitle: String,
}

impl TaskDescriptor {
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }
}

/// One running continuing task, handed to the launch handler.
///
/// All methods may be called from any thread.
pub trait BackgroundTask: Send + Sync {
    /// Descriptor the task was submitted with.
    fn descriptor(&self) -> &TaskDescriptor;

    /// Total unit count of the progress indicator.
    fn set_total_units(&self, units: u64);

    /// Completed unit count of the progress indicator.
    fn set_completed_units(&self, units: u64);

    /// Replace the subtitle line.
    fn set_subtitle(&self, subtitle: &str);

    /// Mark the task finished. Only the first call has an effect.
    fn set_completed(&self, success: bool);

    /// Install the closure the scheduler calls when the task's time budget
    /// runs out. If the budget already ran out, it is called right away.
    fn set_expiration_handler(&self, handler: Box<dyn FnOnce() + Send>);
}

/// Handler invoked by the scheduler for each launched task.
pub type LaunchHandler = Arc<dyn Fn(Arc<dyn BackgroundTask>) + Send + Sync>;

/// Errors from the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("No launch handler registered for '{0}'")]
    NotRegistered(String),

    #[error("Scheduler refused task '{0}'")]
    Rejected(String),

    #[error("Failed to start background task: {0}")]
    Spawn(#[from] io::Error),
}

/// OS-level scheduler of continuing background tasks.
pub trait BackgroundScheduler: Send + Sync {
    /// Register the launch handler for `identifier`.
    ///
    /// Registering an identifier twice keeps the first handler and returns
    /// false.
    fn register(&self, identifier: &str, handler: LaunchHandler) -> bool;

    /// Ask the scheduler to launch a task for `descriptor`.
    fn submit(&self, descriptor: TaskDescriptor) -> Result<(), SchedulerError>;
}
