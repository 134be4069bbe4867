//! Caller side of one submitted job.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::errors::{CoordinatorError, CoordinatorResult};

/// Settles exactly once with the job's outcome.
///
/// Can be awaited, or waited on synchronously with [`PendingReencode::wait`]
/// from a thread that is not driving an async runtime.
#[derive(Debug)]
pub struct PendingReencode {
    job_id: String,
    rx: oneshot::Receiver<CoordinatorResult<()>>,
}

impl PendingReencode {
    pub(crate) fn new(job_id: String, rx: oneshot::Receiver<CoordinatorResult<()>>) -> Self {
        Self { job_id, rx }
    }

    /// Identifier of the job, also the `fileId` of its progress events.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Block until the job settles.
    ///
    /// # Panics
    /// Panics if called from within an async runtime; await instead.
    pub fn wait(self) -> CoordinatorResult<()> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(CoordinatorError::Abandoned))
    }
}

impl Future for PendingReencode {
    type Output = CoordinatorResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CoordinatorError::Abandoned)))
    }
}
