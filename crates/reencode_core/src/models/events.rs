//! Outbound plugin events.

use serde::{Deserialize, Serialize};

/// Name of the only event the plugin emits.
pub const PROGRESS_EVENT: &str = "progress";

/// Payload of a `"progress"` event.
///
/// Serializes as `{"progress": 0.5, "fileId": "..."}` for regular progress
/// and `{"progress": 0.5, "message": "..."}` when the job failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: f64,
    #[serde(flatten)]
    pub detail: EventDetail,
}

/// Second field of a progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventDetail {
    /// Identifier of the file being re-encoded.
    FileId(String),
    /// Error text for a failed job.
    Message(String),
}

impl ProgressEvent {
    pub fn progress(progress: f64, file_id: impl Into<String>) -> Self {
        Self {
            progress,
            detail: EventDetail::FileId(file_id.into()),
        }
    }

    pub fn error(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress,
            detail: EventDetail::Message(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.detail, EventDetail::Message(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_uses_file_id_key() {
        let json = serde_json::to_value(ProgressEvent::progress(0.25, "job-1")).unwrap();
        assert_eq!(json, serde_json::json!({"progress": 0.25, "fileId": "job-1"}));
    }

    #[test]
    fn error_event_uses_message_key() {
        let event = ProgressEvent::error(0.5, "unsupported codec");
        assert!(event.is_error());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"progress": 0.5, "message": "unsupported codec"})
        );
    }
}
