//! Data types shared across the bridge.

mod events;
mod job;
mod request;

pub use events::{EventDetail, ProgressEvent, PROGRESS_EVENT};
pub use job::{BackgroundJob, JobOutcome, JobPhase, TOTAL_UNITS};
pub use request::{ReencodeRequest, ValidationError};
