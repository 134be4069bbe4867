//! Error types for the job coordinator.

use thiserror::Error;

use crate::background::SchedulerError;
use crate::engine::EngineError;

/// Failure text when the OS budget ran out while the job was running.
pub const BUDGET_EXPIRED_MESSAGE: &str = "background task budget expired";

/// Failure text when the job was cancelled on request.
pub const CANCELLED_MESSAGE: &str = "re-encode cancelled";

/// Why a submission was refused or a job did not succeed.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Another job is registered or running on this engine.
    #[error("A re-encode is already running")]
    Busy,

    /// The background scheduler did not accept the task.
    #[error("Failed to schedule re-encode: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The call never produced an engine result.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The job ran and failed; carries the engine's message verbatim.
    #[error("{0}")]
    Failed(String),

    /// The coordinator went away before settling the job.
    #[error("Re-encode was abandoned before it finished")]
    Abandoned,
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
