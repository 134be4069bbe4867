//! UI-affine serial execution context.
//!
//! Hosts deliver events and settle promises on one designated context. On
//! desktop hosts and in tests that context is a dedicated thread draining a
//! FIFO queue; work posted from any thread runs there in posting order.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::{mpsc, oneshot};

type UiJob = Box<dyn FnOnce() + Send>;

struct Inner {
    name: String,
    tx: mpsc::UnboundedSender<UiJob>,
    thread_id: ThreadId,
}

/// Handle to the UI-affine context. Cheap to clone.
///
/// The context thread exits once every handle is dropped and the queue has
/// drained.
#[derive(Clone)]
pub struct UiContext {
    inner: Arc<Inner>,
}

impl UiContext {
    /// Start a context on a new thread called `name`.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<UiJob>();
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(context = %thread_name, "UI job panicked");
                }
            }
            tracing::debug!(context = %thread_name, "UI context stopped");
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                tx,
                thread_id: handle.thread().id(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue `job` to run on the context. Returns false if the context has
    /// stopped.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.tx.send(Box::new(job)).is_ok()
    }

    /// Whether the caller is running on this context.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Block until everything posted before this call has run.
    ///
    /// Returns immediately when called on the context itself.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        if self.post(move || {
            let _ = tx.send(());
        }) {
            let _ = rx.blocking_recv();
        }
    }
}

impl std::fmt::Debug for UiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiContext")
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn runs_jobs_in_posting_order_on_one_thread() {
        let ui = UiContext::new("ui-test").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let seen = Arc::clone(&seen);
            let ui_in_job = ui.clone();
            assert!(ui.post(move || seen.lock().push((i, ui_in_job.is_current()))));
        }
        ui.flush();

        let seen = seen.lock();
        assert_eq!(seen.len(), 20);
        assert!(seen.iter().enumerate().all(|(n, (i, on_ui))| n == *i && *on_ui));
        assert!(!ui.is_current());
    }

    #[test]
    fn panicking_job_does_not_stop_the_context() {
        let ui = UiContext::new("ui-test").unwrap();
        let ran = Arc::new(Mutex::new(false));

        ui.post(|| panic!("listener blew up"));
        let ran_clone = Arc::clone(&ran);
        ui.post(move || *ran_clone.lock() = true);
        ui.flush();

        assert!(*ran.lock());
    }

    #[test]
    fn flush_from_context_does_not_deadlock() {
        let ui = UiContext::new("ui-test").unwrap();
        let done = Arc::new(Mutex::new(false));
        let inner_ui = ui.clone();
        let done_clone = Arc::clone(&done);
        ui.post(move || {
            inner_ui.flush();
            *done_clone.lock() = true;
        });
        ui.flush();
        assert!(*done.lock());
    }
}
