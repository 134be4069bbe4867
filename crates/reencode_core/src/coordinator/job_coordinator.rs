//! Drives one re-encode job at a time through the background task lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::errors::{
    CoordinatorError, CoordinatorResult, BUDGET_EXPIRED_MESSAGE, CANCELLED_MESSAGE,
};
use super::pending::PendingReencode;
use crate::background::{BackgroundScheduler, BackgroundTask, LaunchHandler, TaskDescriptor};
use crate::config::Settings;
use crate::dispatch::UiContext;
use crate::engine::EngineHandle;
use crate::logging::{job_line_forwarder, JobLogger, LogConfig};
use crate::models::{BackgroundJob, JobPhase, ProgressEvent, ReencodeRequest, TOTAL_UNITS};
use crate::progress::{CancelHandle, ProgressSample, ProgressSink, SampleHandler};

/// Receives every progress event, always on the UI context.
pub type EventListener = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Receives the job's outcome once, on the UI context.
pub type SettleHandler = Box<dyn FnOnce(CoordinatorResult<()>) + Send>;

/// Static parameters of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Identifier the launch handler is registered under.
    pub task_identifier: String,
    /// Title of the OS task.
    pub title: String,
    /// Where per-job logs go; `None` disables them.
    pub job_logs_dir: Option<PathBuf>,
    pub log_config: LogConfig,
}

impl CoordinatorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            task_identifier: settings.background.task_identifier.clone(),
            title: settings.background.title.clone(),
            job_logs_dir: settings.logging.job_logs_dir(),
            log_config: settings.logging.to_log_config(),
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

struct ActiveJob {
    job: BackgroundJob,
    request: ReencodeRequest,
    cancel: CancelHandle,
    expired: Arc<AtomicBool>,
    settle: Option<SettleHandler>,
}

#[derive(Default)]
struct JobSlot {
    active: Option<ActiveJob>,
    last: Option<BackgroundJob>,
}

struct Shared {
    engine: EngineHandle,
    scheduler: Arc<dyn BackgroundScheduler>,
    ui: UiContext,
    listener: EventListener,
    options: CoordinatorOptions,
    slot: Mutex<JobSlot>,
}

/// Owns the engine and runs re-encodes as background tasks.
///
/// At most one job is registered or running at a time; further submissions
/// are rejected with [`CoordinatorError::Busy`] until the job settles. The
/// engine is released when the coordinator and any running job are gone.
///
/// One coordinator should own a task identifier per scheduler, since the
/// scheduler keeps the first handler registered for it.
pub struct JobCoordinator {
    shared: Arc<Shared>,
}

impl JobCoordinator {
    pub fn new(
        engine: EngineHandle,
        scheduler: Arc<dyn BackgroundScheduler>,
        ui: UiContext,
        listener: EventListener,
        options: CoordinatorOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            engine,
            scheduler,
            ui,
            listener,
            options,
            slot: Mutex::new(JobSlot::default()),
        });

        let weak = Arc::downgrade(&shared);
        let handler: LaunchHandler = Arc::new(move |task: Arc<dyn BackgroundTask>| {
            match weak.upgrade() {
                Some(shared) => shared.run(task),
                None => {
                    tracing::warn!(
                        identifier = %task.descriptor().identifier,
                        "Task launched after its coordinator was dropped"
                    );
                    task.set_completed(false);
                }
            }
        });
        let identifier = shared.options.task_identifier.clone();
        if !shared.scheduler.register(&identifier, handler) {
            tracing::debug!(%identifier, "Reusing existing launch handler registration");
        }

        Self { shared }
    }

    /// Accept `request` and hand it to the background scheduler.
    ///
    /// The returned value settles on the UI context once the job completes
    /// or fails.
    pub fn submit(&self, request: ReencodeRequest) -> CoordinatorResult<PendingReencode> {
        let (tx, rx) = oneshot::channel();
        let job_id = self.submit_with(
            request,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        )?;
        Ok(PendingReencode::new(job_id, rx))
    }

    /// Like [`JobCoordinator::submit`], but hands the outcome to `on_settle`
    /// on the UI context instead. Returns the job id.
    ///
    /// `on_settle` is dropped without being called when the submission
    /// itself is rejected; the error is returned here instead.
    pub fn submit_with(
        &self,
        request: ReencodeRequest,
        on_settle: SettleHandler,
    ) -> CoordinatorResult<String> {
        let shared = &self.shared;
        let job_id = Uuid::new_v4().to_string();

        {
            let mut slot = shared.slot.lock();
            if slot.active.is_some() || shared.engine.is_busy() {
                tracing::warn!(input = request.input_path(), "Rejecting re-encode, job in progress");
                return Err(CoordinatorError::Busy);
            }
            let mut job = BackgroundJob::new(&job_id, &shared.options.task_identifier);
            job.advance(JobPhase::Registered);
            slot.active = Some(ActiveJob {
                job,
                request: request.clone(),
                cancel: CancelHandle::new(),
                expired: Arc::new(AtomicBool::new(false)),
                settle: Some(on_settle),
            });
        }

        let descriptor = TaskDescriptor::new(
            &shared.options.task_identifier,
            &shared.options.title,
            request.display_name(),
        );
        if let Err(err) = shared.scheduler.submit(descriptor) {
            tracing::error!(%job_id, "Background scheduler refused the job: {}", err);
            let mut slot = shared.slot.lock();
            if let Some(mut active) = slot.active.take() {
                active.job.fail(err.to_string());
                slot.last = Some(active.job);
            }
            return Err(err.into());
        }

        tracing::info!(%job_id, input = request.input_path(), "Re-encode registered");
        Ok(job_id)
    }

    /// Ask the current job to stop. Returns false when nothing is running.
    ///
    /// The engine sees the request on its next progress report.
    pub fn cancel(&self) -> bool {
        match self.shared.slot.lock().active.as_ref() {
            Some(active) => {
                tracing::info!(job_id = %active.job.job_id, "Cancellation requested");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a job is registered or running.
    pub fn is_busy(&self) -> bool {
        self.shared.slot.lock().active.is_some()
    }

    /// Snapshot of the job in progress.
    pub fn current_job(&self) -> Option<BackgroundJob> {
        self.shared
            .slot
            .lock()
            .active
            .as_ref()
            .map(|active| active.job.clone())
    }

    /// The most recently settled job.
    pub fn last_job(&self) -> Option<BackgroundJob> {
        self.shared.slot.lock().last.clone()
    }
}

impl Shared {
    /// Launch handler body. Runs on the scheduler's context.
    fn run(self: &Arc<Self>, task: Arc<dyn BackgroundTask>) {
        let started = {
            let mut slot = self.slot.lock();
            match slot.active.as_mut() {
                Some(active) => active.job.advance(JobPhase::Running).then(|| {
                    (
                        active.job.job_id.clone(),
                        active.request.clone(),
                        active.cancel.clone(),
                        Arc::clone(&active.expired),
                    )
                }),
                None => None,
            }
        };
        let Some((job_id, request, cancel, expired)) = started else {
            tracing::warn!("Background task launched without a registered job");
            task.set_completed(false);
            return;
        };

        let _span = tracing::info_span!("reencode", %job_id).entered();
        task.set_total_units(TOTAL_UNITS);
        task.set_completed_units(0);
        {
            let cancel = cancel.clone();
            let expired = Arc::clone(&expired);
            task.set_expiration_handler(Box::new(move || {
                expired.store(true, Ordering::SeqCst);
                cancel.cancel();
            }));
        }

        let logger = self.open_job_logger(&job_id);
        if let Some(logger) = &logger {
            logger.phase("Re-encode");
            logger.info(&format!(
                "{} -> {} at {}x{}, bitrate {}",
                request.input_path(),
                request.output_path(),
                request.target_width(),
                request.target_height(),
                if request.uses_default_bitrate() {
                    "default".to_string()
                } else {
                    request.bitrate().to_string()
                }
            ));
        }

        let sink = ProgressSink::new(
            job_id.clone(),
            cancel.clone(),
            self.sample_handler(&job_id, &task, logger.clone()),
        );
        tracing::info!(input = request.input_path(), "Re-encode running");

        let outcome = match self.engine.reencode(&request, &sink) {
            Ok(result) => result.into_outcome().map_err(CoordinatorError::Failed),
            Err(err) => Err(CoordinatorError::Engine(err)),
        };
        let outcome = classify(outcome, &sink, &cancel, &expired);

        self.finish(&job_id, task.as_ref(), &sink, logger, outcome);
    }

    fn sample_handler(
        self: &Arc<Self>,
        job_id: &str,
        task: &Arc<dyn BackgroundTask>,
        logger: Option<Arc<JobLogger>>,
    ) -> SampleHandler {
        let shared = Arc::clone(self);
        let task = Arc::clone(task);
        let job_id = job_id.to_string();

        Box::new(move |sample: &ProgressSample| {
            let units = shared
                .slot
                .lock()
                .active
                .as_mut()
                .map(|active| active.job.record_progress(sample.fraction));
            if let Some(units) = units {
                task.set_completed_units(units);
                if let Some(logger) = &logger {
                    logger.engine_line(&format!("progress {:.4}", sample.fraction));
                    logger.progress(units as u32);
                }
            }
            tracing::trace!(fraction = sample.fraction, "Progress");

            shared.emit(ProgressEvent::progress(sample.fraction, job_id.clone()));
        })
    }

    /// Record the terminal state, free the slot, then notify the UI context.
    fn finish(
        &self,
        job_id: &str,
        task: &dyn BackgroundTask,
        sink: &ProgressSink,
        logger: Option<Arc<JobLogger>>,
        outcome: CoordinatorResult<()>,
    ) {
        let settle = {
            let mut slot = self.slot.lock();
            let Some(mut active) = slot.active.take() else {
                tracing::error!("Job slot emptied while the job was running");
                return;
            };
            match &outcome {
                Ok(()) => active.job.complete(),
                Err(err) => active.job.fail(err.to_string()),
            };
            let settle = active.settle.take();
            slot.last = Some(active.job);
            settle
        };

        let last_fraction = sink.last_fraction();
        match &outcome {
            Ok(()) => {
                task.set_completed_units(TOTAL_UNITS);
                task.set_completed(true);
                // The engine's own 1.0 sample already served as the completion event
                if last_fraction != Some(1.0) {
                    self.emit(ProgressEvent::progress(1.0, job_id));
                }
                tracing::info!("Re-encode completed");
                if let Some(logger) = &logger {
                    logger.success("Re-encode completed");
                }
            }
            Err(err) => {
                task.set_completed(false);
                self.emit(ProgressEvent::error(last_fraction.unwrap_or(0.0), err.to_string()));
                tracing::error!("Re-encode failed: {}", err);
                if let Some(logger) = &logger {
                    logger.error(&err.to_string());
                    logger.show_tail("engine");
                }
            }
        }
        if let Some(logger) = logger {
            logger.close();
        }

        if let Some(settle) = settle {
            self.ui.post(move || settle(outcome));
        }
    }

    fn emit(&self, event: ProgressEvent) {
        let listener = Arc::clone(&self.listener);
        if !self.ui.post(move || listener(&event)) {
            tracing::warn!("UI context stopped; dropping progress event");
        }
    }

    fn open_job_logger(&self, job_id: &str) -> Option<Arc<JobLogger>> {
        let dir = self.options.job_logs_dir.as_ref()?;
        let logger = JobLogger::new(
            job_id,
            dir,
            self.options.log_config.clone(),
            Some(job_line_forwarder()),
        );
        match logger {
            Ok(logger) => Some(Arc::new(logger)),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), "Cannot open job log: {}", err);
                None
            }
        }
    }
}

/// Map a cancelled or expired run onto its failure reason.
///
/// An expired budget always fails the job. A user cancel replaces the
/// outcome only once the sink has handed it to the engine; otherwise the
/// engine's own result, success or error text, stands.
fn classify(
    outcome: CoordinatorResult<()>,
    sink: &ProgressSink,
    cancel: &CancelHandle,
    expired: &AtomicBool,
) -> CoordinatorResult<()> {
    if expired.load(Ordering::SeqCst) {
        return Err(CoordinatorError::Failed(BUDGET_EXPIRED_MESSAGE.to_string()));
    }
    if cancel.is_cancelled() && sink.cancel_acknowledged() {
        return Err(CoordinatorError::Failed(CANCELLED_MESSAGE.to_string()));
    }
    outcome
}
