//! Background job bookkeeping.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Unit count of a background task (percentage points).
pub const TOTAL_UNITS: u64 = 100;

/// Lifecycle of one re-encode job.
///
/// `Idle → Registered → Running → {Completed | Failed}`. A job may also go
/// from `Registered` straight to `Failed` if it never got launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobPhase {
    #[default]
    Idle,
    Registered,
    Running,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }

    fn can_move_to(self, next: JobPhase) -> bool {
        matches!(
            (self, next),
            (JobPhase::Idle, JobPhase::Registered)
                | (JobPhase::Registered, JobPhase::Running)
                | (JobPhase::Registered, JobPhase::Failed)
                | (JobPhase::Running, JobPhase::Completed)
                | (JobPhase::Running, JobPhase::Failed)
        )
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// One OS-scheduled continuing task, as seen by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    /// Unique job identifier (also the event `fileId`).
    pub job_id: String,
    /// Scheduler identifier the task is bound to.
    pub identifier: String,
    /// Current lifecycle phase.
    pub phase: JobPhase,
    /// Always [`TOTAL_UNITS`].
    pub total_units: u64,
    /// Latest progress in units, never decreases.
    pub completed_units: u64,
    /// When the job was accepted.
    pub submitted_at: String,
    /// Failure text, set when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackgroundJob {
    pub fn new(job_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            identifier: identifier.into(),
            phase: JobPhase::Idle,
            total_units: TOTAL_UNITS,
            completed_units: 0,
            submitted_at: Local::now().to_rfc3339(),
            error: None,
        }
    }

    /// Move to `next`, returning false if the transition is not allowed.
    pub fn advance(&mut self, next: JobPhase) -> bool {
        if !self.phase.can_move_to(next) {
            tracing::warn!(
                job_id = %self.job_id,
                "Ignoring job transition {:?} -> {:?}",
                self.phase,
                next
            );
            return false;
        }
        self.phase = next;
        true
    }

    /// Record a progress fraction and return the resulting unit count.
    ///
    /// Units only move forward, and only while the job is running.
    pub fn record_progress(&mut self, fraction: f64) -> u64 {
        if self.phase == JobPhase::Running && fraction.is_finite() {
            let units = (fraction.clamp(0.0, 1.0) * TOTAL_UNITS as f64).round() as u64;
            self.completed_units = self.completed_units.max(units);
        }
        self.completed_units
    }

    /// Mark the job as successfully finished.
    pub fn complete(&mut self) -> bool {
        if !self.advance(JobPhase::Completed) {
            return false;
        }
        self.completed_units = TOTAL_UNITS;
        true
    }

    /// Mark the job as failed with the given reason.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.advance(JobPhase::Failed) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.phase {
            JobPhase::Completed => Some(JobOutcome::Succeeded),
            JobPhase::Failed => Some(JobOutcome::Failed),
            _ => None,
        }
    }
}
