//! Error types for the engine side.

use std::io;

use thiserror::Error;

/// Failures of a transcode run.
///
/// These end up as the text of a failed `CResult`, usually wrapped in
/// `anyhow` context describing the step that failed.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Bitrate {bitrate} is too low. Minimum is {min} bps")]
    BitrateTooLow { bitrate: i32, min: i32 },

    #[error("Bitrate {bitrate} is too high. Maximum is {max} bps")]
    BitrateTooHigh { bitrate: i32, max: i32 },

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Video re-encoding was cancelled")]
    Cancelled,

    #[error("Engine is busy with another re-encode")]
    Busy,
}
