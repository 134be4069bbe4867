//! Thread-backed scheduler used on desktop hosts and in tests.
//!
//! Each submitted task runs its launch handler on a dedicated named thread.
//! With a budget configured, a watchdog thread fires the task's expiration
//! handler if the task has not finished when the budget runs out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{BackgroundScheduler, BackgroundTask, LaunchHandler, SchedulerError, TaskDescriptor};

/// Point-in-time view of a task, for status displays and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub identifier: String,
    pub title: String,
    pub subtitle: String,
    pub total_units: u64,
    pub completed_units: u64,
    /// `None` while running, then the value passed to `set_completed`.
    pub success: Option<bool>,
    pub expired: bool,
}

#[derive(Default)]
struct TaskState {
    subtitle: String,
    total_units: u64,
    completed_units: u64,
    success: Option<bool>,
    /// Budget ran out; late expiration handlers run immediately.
    out_of_budget: bool,
    /// The expiration handler has run (or there was none).
    expired: bool,
    on_expire: Option<Box<dyn FnOnce() + Send>>,
}

struct ThreadTask {
    descriptor: TaskDescriptor,
    state: Mutex<TaskState>,
    finished: Condvar,
}

impl ThreadTask {
    fn new(descriptor: TaskDescriptor) -> Self {
        let state = TaskState {
            subtitle: descriptor.subtitle.clone(),
            ..TaskState::default()
        };
        Self {
            descriptor,
            state: Mutex::new(state),
            finished: Condvar::new(),
        }
    }

    fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        TaskSnapshot {
            identifier: self.descriptor.identifier.clone(),
            title: self.descriptor.title.clone(),
            subtitle: state.subtitle.clone(),
            total_units: state.total_units,
            completed_units: state.completed_units,
            success: state.success,
            expired: state.expired,
        }
    }

    fn is_finished(&self) -> bool {
        self.state.lock().success.is_some()
    }

    /// Block until the task finishes or `deadline` passes, then expire it
    /// if it is still running.
    fn watch(&self, deadline: Instant) {
        let mut state = self.state.lock();
        while state.success.is_none() {
            if self.finished.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.success.is_some() {
            return;
        }
        state.out_of_budget = true;
        let handler = state.on_expire.take();
        drop(state);

        tracing::warn!(identifier = %self.descriptor.identifier, "Background task budget expired");
        if let Some(handler) = handler {
            handler();
        }
        self.state.lock().expired = true;
    }
}

impl BackgroundTask for ThreadTask {
    fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    fn set_total_units(&self, units: u64) {
        self.state.lock().total_units = units;
    }

    fn set_completed_units(&self, units: u64) {
        self.state.lock().completed_units = units;
    }

    fn set_subtitle(&self, subtitle: &str) {
        self.state.lock().subtitle = subtitle.to_string();
    }

    fn set_completed(&self, success: bool) {
        let mut state = self.state.lock();
        if state.success.is_some() {
            tracing::warn!(
                identifier = %self.descriptor.identifier,
                "Ignoring second completion of background task"
            );
            return;
        }
        state.success = Some(success);
        state.on_expire = None;
        self.finished.notify_all();
    }

    fn set_expiration_handler(&self, handler: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock();
        if state.out_of_budget && state.success.is_none() {
            drop(state);
            handler();
        } else {
            state.on_expire = Some(handler);
        }
    }
}

/// Scheduler running each task on its own thread.
pub struct ThreadScheduler {
    handlers: Mutex<HashMap<String, LaunchHandler>>,
    tasks: Mutex<Vec<Arc<ThreadTask>>>,
    budget: Option<Duration>,
    accepting: AtomicBool,
}

impl ThreadScheduler {
    /// Scheduler without a time budget.
    pub fn new() -> Self {
        Self::with_budget(None)
    }

    /// Scheduler that expires tasks still running after `budget`.
    pub fn with_budget(budget: Option<Duration>) -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            budget,
            accepting: AtomicBool::new(true),
        }
    }

    /// Build from `[background] budget_secs` (0 means no budget).
    pub fn from_budget_secs(budget_secs: u64) -> Self {
        Self::with_budget((budget_secs > 0).then(|| Duration::from_secs(budget_secs)))
    }

    /// Refuse (or accept again) new submissions, as an OS scheduler does
    /// under resource pressure.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Snapshots of the tasks still tracked, oldest first. Finished tasks
    /// are kept until the next submission.
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.tasks.lock().iter().map(|task| task.snapshot()).collect()
    }

    /// Number of submitted tasks that have not finished yet.
    pub fn running(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("identifiers", &self.handlers.lock().keys().collect::<Vec<_>>())
            .field("budget", &self.budget)
            .field("running", &self.running())
            .finish()
    }
}

impl BackgroundScheduler for ThreadScheduler {
    fn register(&self, identifier: &str, handler: LaunchHandler) -> bool {
        let mut handlers = self.handlers.lock();
        if handlers.contains_key(identifier) {
            tracing::debug!(identifier, "Launch handler already registered");
            return false;
        }
        handlers.insert(identifier.to_string(), handler);
        tracing::debug!(identifier, "Registered launch handler");
        true
    }

    fn submit(&self, descriptor: TaskDescriptor) -> Result<(), SchedulerError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::Rejected(descriptor.identifier));
        }
        let handler = self
            .handlers
            .lock()
            .get(&descriptor.identifier)
            .cloned()
            .ok_or_else(|| SchedulerError::NotRegistered(descriptor.identifier.clone()))?;

        let task = Arc::new(ThreadTask::new(descriptor));
        let name = format!("bg-{}", task.descriptor.identifier);

        // Watchdog first: once the handler thread is up, submit has succeeded
        if let Some(budget) = self.budget {
            let watched = Arc::clone(&task);
            let deadline = Instant::now() + budget;
            thread::Builder::new()
                .name(format!("bg-watchdog-{}", task.descriptor.identifier))
                .spawn(move || watched.watch(deadline))?;
        }

        let worker_task = Arc::clone(&task);
        let spawned = thread::Builder::new().name(name).spawn(move || {
            let as_dyn: Arc<dyn BackgroundTask> = worker_task.clone();
            handler(as_dyn);
            if !worker_task.is_finished() {
                tracing::warn!(
                    identifier = %worker_task.descriptor.identifier,
                    "Launch handler returned without completing its task"
                );
                worker_task.set_completed(false);
            }
        });
        if let Err(err) = spawned {
            // Releases the watchdog
            task.set_completed(false);
            return Err(err.into());
        }

        tracing::info!(identifier = %task.descriptor.identifier, "Submitted background task");
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor::new("app.reencode", "Re-encoding video", "a.mov")
    }

    #[test]
    fn register_is_idempotent() {
        let scheduler = ThreadScheduler::new();
        let first: LaunchHandler = Arc::new(|_| {});
        let second: LaunchHandler = Arc::new(|_| panic!("replaced"));
        assert!(scheduler.register("app.reencode", first));
        assert!(!scheduler.register("app.reencode", second));
    }

    #[test]
    fn submit_without_handler_fails() {
        let scheduler = ThreadScheduler::new();
        let err = scheduler.submit(descriptor()).unwrap_err();
        assert!(matches!(err, SchedulerError::NotRegistered(id) if id == "app.reencode"));
    }

    #[test]
    fn handler_runs_with_submitted_descriptor() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        scheduler.register(
            "app.reencode",
            Arc::new(move |task: Arc<dyn BackgroundTask>| {
                task.set_total_units(100);
                task.set_completed_units(40);
                task.set_completed(true);
                task.set_completed(false);
                let _ = tx.lock().send(task.descriptor().clone());
            }),
        );

        scheduler.submit(descriptor()).unwrap();

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, descriptor());
        let snapshot = scheduler.snapshots().pop().unwrap();
        assert_eq!(snapshot.total_units, 100);
        assert_eq!(snapshot.completed_units, 40);
        assert_eq!(snapshot.success, Some(true));
    }

    #[test]
    fn refused_submission_is_reported() {
        let scheduler = ThreadScheduler::new();
        scheduler.register("app.reencode", Arc::new(|_: Arc<dyn BackgroundTask>| {}));
        scheduler.set_accepting(false);
        assert!(matches!(
            scheduler.submit(descriptor()),
            Err(SchedulerError::Rejected(_))
        ));
        assert!(scheduler.snapshots().is_empty());
    }

    #[test]
    fn budget_expiry_calls_expiration_handler() {
        let scheduler = ThreadScheduler::with_budget(Some(Duration::from_millis(20)));
        let (tx, rx) = mpsc::channel::<()>();
        let tx = Mutex::new(Some(tx));
        scheduler.register(
            "app.reencode",
            Arc::new(move |task: Arc<dyn BackgroundTask>| {
                let (expired_tx, expired_rx) = mpsc::channel();
                task.set_expiration_handler(Box::new(move || {
                    let _ = expired_tx.send(());
                }));
                expired_rx.recv_timeout(Duration::from_secs(5)).unwrap();
                task.set_completed(false);
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
            }),
        );

        scheduler.submit(descriptor()).unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.snapshots()[0].expired && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        let snapshot = scheduler.snapshots().pop().unwrap();
        assert!(snapshot.expired);
        assert_eq!(snapshot.success, Some(false));
    }

    #[test]
    fn finished_task_never_expires() {
        let scheduler = ThreadScheduler::with_budget(Some(Duration::from_millis(20)));
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_handler = Arc::clone(&fired);
        scheduler.register(
            "app.reencode",
            Arc::new(move |task: Arc<dyn BackgroundTask>| {
                let fired = Arc::clone(&fired_in_handler);
                task.set_expiration_handler(Box::new(move || fired.store(true, Ordering::SeqCst)));
                task.set_completed(true);
            }),
        );

        scheduler.submit(descriptor()).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert!(!fired.load(Ordering::SeqCst));
        assert!(!scheduler.snapshots()[0].expired);
    }

    #[test]
    fn handler_returning_early_fails_the_task() {
        let scheduler = ThreadScheduler::new();
        scheduler.register("app.reencode", Arc::new(|_: Arc<dyn BackgroundTask>| {}));
        scheduler.submit(descriptor()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.running() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(scheduler.snapshots()[0].success, Some(false));
    }

    #[test]
    fn finished_tasks_are_dropped_on_next_submit() {
        let scheduler = ThreadScheduler::new();
        scheduler.register(
            "app.reencode",
            Arc::new(|task: Arc<dyn BackgroundTask>| task.set_completed(true)),
        );

        for _ in 0..50 {
            scheduler.submit(descriptor()).unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while scheduler.running() > 0 {
                assert!(Instant::now() < deadline, "task did not finish");
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(scheduler.snapshots().len(), 1);
        }
        assert_eq!(scheduler.snapshots()[0].success, Some(true));
    }

    #[test]
    fn running_task_survives_later_submit() {
        let scheduler = ThreadScheduler::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        scheduler.register(
            "app.reencode",
            Arc::new(move |task: Arc<dyn BackgroundTask>| {
                if task.descriptor().subtitle == "slow.mov" {
                    let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
                }
                task.set_completed(true);
            }),
        );

        scheduler
            .submit(TaskDescriptor::new("app.reencode", "Re-encoding video", "slow.mov"))
            .unwrap();
        scheduler.submit(descriptor()).unwrap();

        let subtitles: Vec<String> = scheduler.snapshots().into_iter().map(|s| s.subtitle).collect();
        assert!(subtitles.contains(&"slow.mov".to_string()));
        release_tx.send(()).unwrap();
    }

    #[test]
    fn zero_budget_secs_means_unlimited() {
        assert_eq!(ThreadScheduler::from_budget_secs(0).budget, None);
        assert_eq!(
            ThreadScheduler::from_budget_secs(30).budget,
            Some(Duration::from_secs(30))
        );
    }
}
