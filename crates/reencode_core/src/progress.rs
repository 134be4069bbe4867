//! Progress sink handed to the engine.
//!
//! The engine gets two things: a plain `extern "C"` function pointer
//! ([`progress_trampoline`]) and an opaque context pointer to the sink's
//! shared state. The state is reference counted; [`ProgressSink::retain`]
//! takes an extra strong reference for the duration of an engine call so
//! the pointer the engine holds can never dangle.
//!
//! Samples are forwarded to a handler that must not block. Handlers post UI
//! work elsewhere (see `dispatch`) rather than doing it inline.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::abi::{ProgressCallback, SINK_CANCEL, SINK_CONTINUE};

/// A fraction above this counts as "done" for UI purposes.
pub const COMPLETION_THRESHOLD: f64 = 0.99;

/// One progress update from the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSample {
    /// Fraction in `[0.0, 1.0]`.
    pub fraction: f64,
    /// Label of the job the sample belongs to.
    pub label: String,
}

impl ProgressSample {
    /// Whether this sample is an early "finished" cue.
    ///
    /// Only the engine call returning marks a job complete; this is for UI.
    pub fn is_complete(&self) -> bool {
        self.fraction > COMPLETION_THRESHOLD
    }
}

/// Handler receiving accepted samples. Called on the engine's thread.
pub type SampleHandler = Box<dyn Fn(&ProgressSample) + Send + Sync>;

/// Handle for requesting cooperative cancellation of an engine call.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop. It sees the request on its next sink call.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// State the engine reaches through the context pointer.
struct SinkState {
    label: String,
    cancel: CancelHandle,
    on_sample: SampleHandler,
    /// Last forwarded fraction; the lock also serializes concurrent calls.
    last: Mutex<Option<f64>>,
    calls: AtomicU64,
    cancel_acknowledged: AtomicBool,
}

impl SinkState {
    fn accept(&self, fraction: f64) -> i32 {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if fraction.is_nan() {
            tracing::warn!(label = %self.label, "Dropping NaN progress from engine");
        } else {
            let fraction = fraction.clamp(0.0, 1.0);
            let mut last = self.last.lock();
            match *last {
                Some(prev) if fraction <= prev => {
                    tracing::trace!(label = %self.label, prev, fraction, "Dropping non-advancing progress");
                }
                _ => {
                    *last = Some(fraction);
                    let sample = ProgressSample {
                        fraction,
                        label: self.label.clone(),
                    };
                    (self.on_sample)(&sample);
                }
            }
        }

        if self.cancel.is_cancelled() {
            self.cancel_acknowledged.store(true, Ordering::SeqCst);
            SINK_CANCEL
        } else {
            SINK_CONTINUE
        }
    }
}

/// Host-side end of the progress channel for one engine call.
pub struct ProgressSink {
    state: Arc<SinkState>,
}

impl ProgressSink {
    pub fn new(label: impl Into<String>, cancel: CancelHandle, on_sample: SampleHandler) -> Self {
        Self {
            state: Arc::new(SinkState {
                label: label.into(),
                cancel,
                on_sample,
                last: Mutex::new(None),
                calls: AtomicU64::new(0),
                cancel_acknowledged: AtomicBool::new(false),
            }),
        }
    }

    /// Function pointer to pass as the engine's progress callback.
    pub fn callback(&self) -> ProgressCallback {
        progress_trampoline
    }

    /// Take a strong reference for the duration of an engine call.
    pub fn retain(&self) -> RetainedContext {
        RetainedContext {
            state: Arc::clone(&self.state),
        }
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.state.cancel.clone()
    }

    /// Last fraction forwarded to the handler, if any.
    pub fn last_fraction(&self) -> Option<f64> {
        *self.state.last.lock()
    }

    /// Number of times the engine called the sink.
    pub fn calls(&self) -> u64 {
        self.state.calls.load(Ordering::Relaxed)
    }

    /// Whether the sink has told the engine to cancel.
    pub fn cancel_acknowledged(&self) -> bool {
        self.state.cancel_acknowledged.load(Ordering::SeqCst)
    }
}

/// Strong reference to sink state, exposing the raw context pointer.
///
/// Keep this alive until the engine call that received
/// [`RetainedContext::as_ptr`] has returned.
pub struct RetainedContext {
    state: Arc<SinkState>,
}

impl RetainedContext {
    pub fn as_ptr(&self) -> *mut c_void {
        Arc::as_ptr(&self.state) as *mut c_void
    }
}

/// The C-callable sink.
///
/// # Safety
/// `context` must be NULL or a pointer obtained from
/// [`RetainedContext::as_ptr`] whose `RetainedContext` is still alive.
pub unsafe extern "C" fn progress_trampoline(progress: f64, context: *mut c_void) -> i32 {
    if context.is_null() {
        tracing::warn!("Engine reported progress with a null context");
        return SINK_CONTINUE;
    }
    // SAFETY: the caller keeps the `RetainedContext` alive for the call.
    let state = &*(context as *const SinkState);
    match panic::catch_unwind(AssertUnwindSafe(|| state.accept(progress))) {
        Ok(code) => code,
        Err(_) => {
            tracing::error!(label = %state.label, "Progress handler panicked; asking engine to stop");
            SINK_CANCEL
        }
    }
}
