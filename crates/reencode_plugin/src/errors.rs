//! Error types for the plugin facade.

use std::io;

use reencode_core::coordinator::CoordinatorError;
use reencode_core::engine::EngineError;
use reencode_core::models::ValidationError;
use thiserror::Error;

/// Why a plugin call was rejected.
///
/// The `Display` text is exactly what the caller's promise is rejected with.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A required option was absent or had the wrong type.
    #[error("{0} is required")]
    MissingOption(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Engine creation failed on first use.
    #[error(transparent)]
    Initialization(EngineError),

    /// Engine creation failed on an earlier call.
    #[error("engine unavailable")]
    EngineUnavailable,

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Failed to start UI context: {0}")]
    UiContext(#[source] io::Error),

    /// The call was dropped without an answer.
    #[error("Call was dropped without a response")]
    Unanswered,
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
