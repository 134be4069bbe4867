//! Scripted C-ABI engine for tests.
//!
//! `ScriptedEngine::api()` returns real `extern "C"` entry points. Each
//! engine instance carries its own [`EngineCounters`], so tests running in
//! parallel never share state. The script for the next `init` on the
//! current thread is staged with [`ScriptedEngine::prepare`].

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::abi::{CResult, EngineApi, ProgressCallback, SINK_CONTINUE};

/// Text returned when the script honors a cancellation request.
pub const SCRIPTED_CANCEL_MESSAGE: &str = "Video re-encoding was cancelled";

/// What the scripted engine returns once its samples are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScriptOutcome {
    #[default]
    Ok,
    Err(String),
    /// Breaks the contract: failure with a NULL message.
    ErrWithoutMessage,
}

/// Behaviour of one scripted engine instance.
#[derive(Debug, Clone, Default)]
pub struct EngineScript {
    /// Fractions reported through the sink, in order.
    pub samples: Vec<f64>,
    /// If set, `reencode` blocks on entry until the gate opens.
    pub gate: Option<Gate>,
    /// Stop with [`SCRIPTED_CANCEL_MESSAGE`] when the sink asks to.
    pub honor_cancel: bool,
    /// Make `init` return NULL.
    pub fail_init: bool,
    pub outcome: ScriptOutcome,
}

/// Arguments seen by one `reencode` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub input_path: String,
    pub output_path: String,
    pub width: i32,
    pub height: i32,
    pub bitrate: i32,
}

/// Allocation and call counters for one engine instance.
#[derive(Debug, Default)]
pub struct EngineCounters {
    inits: AtomicUsize,
    deinits: AtomicUsize,
    reencodes: AtomicUsize,
    results_allocated: AtomicUsize,
    results_freed: AtomicUsize,
    messages_allocated: AtomicUsize,
    messages_freed: AtomicUsize,
    cancels_seen: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl EngineCounters {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn deinits(&self) -> usize {
        self.deinits.load(Ordering::SeqCst)
    }

    pub fn reencodes(&self) -> usize {
        self.reencodes.load(Ordering::SeqCst)
    }

    pub fn results_allocated(&self) -> usize {
        self.results_allocated.load(Ordering::SeqCst)
    }

    pub fn results_freed(&self) -> usize {
        self.results_freed.load(Ordering::SeqCst)
    }

    pub fn messages_allocated(&self) -> usize {
        self.messages_allocated.load(Ordering::SeqCst)
    }

    pub fn messages_freed(&self) -> usize {
        self.messages_freed.load(Ordering::SeqCst)
    }

    /// Number of sink calls that asked the engine to cancel.
    pub fn cancels_seen(&self) -> usize {
        self.cancels_seen.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[derive(Debug, Default)]
struct GateState {
    entered: bool,
    open: bool,
}

/// Blocks a scripted `reencode` until the test opens it.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the blocked engine continue.
    pub fn open(&self) {
        let (state, cv) = &*self.inner;
        state.lock().open = true;
        cv.notify_all();
    }

    /// Wait until the engine is parked at the gate.
    pub fn wait_until_entered(&self) {
        let (state, cv) = &*self.inner;
        let mut guard = state.lock();
        while !guard.entered {
            cv.wait(&mut guard);
        }
    }

    fn enter_and_wait(&self) {
        let (state, cv) = &*self.inner;
        let mut guard = state.lock();
        guard.entered = true;
        cv.notify_all();
        while !guard.open {
            cv.wait(&mut guard);
        }
    }
}

struct ScriptedHandle {
    script: EngineScript,
    counters: Arc<EngineCounters>,
}

/// Result record with the counters tucked behind it.
///
/// `CResult` is the first field of a `repr(C)` struct, so a pointer to the
/// whole record is also a valid `*mut CResult`.
#[repr(C)]
struct TrackedResult {
    result: CResult,
    counters: Arc<EngineCounters>,
}

thread_local! {
    static NEXT_SCRIPT: RefCell<Option<(EngineScript, Arc<EngineCounters>)>> =
        const { RefCell::new(None) };
}

/// Namespace for the scripted entry points.
pub struct ScriptedEngine;

impl ScriptedEngine {
    pub fn api() -> EngineApi {
        EngineApi {
            init: scripted_init,
            deinit: scripted_deinit,
            reencode: scripted_reencode,
            free_result: scripted_free_result,
        }
    }

    /// Stage `script` for the next `init` on this thread.
    pub fn prepare(script: EngineScript) -> Arc<EngineCounters> {
        let counters = Arc::new(EngineCounters::default());
        NEXT_SCRIPT.with(|slot| {
            *slot.borrow_mut() = Some((script, Arc::clone(&counters)));
        });
        counters
    }
}

/// Allocate a result record the way the scripted engine does.
pub fn tracked_result(counters: &Arc<EngineCounters>, outcome: &ScriptOutcome) -> NonNull<CResult> {
    let error_message = match outcome {
        ScriptOutcome::Ok | ScriptOutcome::ErrWithoutMessage => ptr::null_mut(),
        ScriptOutcome::Err(message) => {
            counters.messages_allocated.fetch_add(1, Ordering::SeqCst);
            CString::new(message.as_str())
                .unwrap_or_default()
                .into_raw()
        }
    };
    counters.results_allocated.fetch_add(1, Ordering::SeqCst);
    let tracked = Box::new(TrackedResult {
        result: CResult {
            ok: matches!(outcome, ScriptOutcome::Ok),
            error_message,
        },
        counters: Arc::clone(counters),
    });
    // SAFETY: Box::into_raw never returns null.
    unsafe { NonNull::new_unchecked(Box::into_raw(tracked).cast::<CResult>()) }
}

unsafe extern "C" fn scripted_init() -> *mut c_void {
    let (script, counters) = NEXT_SCRIPT
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| (EngineScript::default(), Arc::new(EngineCounters::default())));
    counters.inits.fetch_add(1, Ordering::SeqCst);
    if script.fail_init {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(ScriptedHandle { script, counters })).cast::<c_void>()
}

unsafe extern "C" fn scripted_deinit(engine: *mut c_void) {
    if engine.is_null() {
        return;
    }
    let handle = Box::from_raw(engine.cast::<ScriptedHandle>());
    handle.counters.deinits.fetch_add(1, Ordering::SeqCst);
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn scripted_reencode(
    engine: *mut c_void,
    input_path: *const c_char,
    output_path: *const c_char,
    target_width: i32,
    target_height: i32,
    bitrate: i32,
    context: *mut c_void,
    inform_about_progress: ProgressCallback,
) -> *mut CResult {
    let handle = &*engine.cast::<ScriptedHandle>();
    let counters = &handle.counters;
    counters.reencodes.fetch_add(1, Ordering::SeqCst);
    counters.calls.lock().push(RecordedCall {
        input_path: CStr::from_ptr(input_path).to_string_lossy().into_owned(),
        output_path: CStr::from_ptr(output_path).to_string_lossy().into_owned(),
        width: target_width,
        height: target_height,
        bitrate,
    });

    if let Some(gate) = &handle.script.gate {
        gate.enter_and_wait();
    }

    for &fraction in &handle.script.samples {
        if inform_about_progress(fraction, context) != SINK_CONTINUE {
            counters.cancels_seen.fetch_add(1, Ordering::SeqCst);
            if handle.script.honor_cancel {
                let cancelled = ScriptOutcome::Err(SCRIPTED_CANCEL_MESSAGE.to_string());
                return tracked_result(counters, &cancelled).as_ptr();
            }
        }
    }

    tracked_result(counters, &handle.script.outcome).as_ptr()
}

unsafe extern "C" fn scripted_free_result(result: *mut CResult) {
    if result.is_null() {
        return;
    }
    let tracked = Box::from_raw(result.cast::<TrackedResult>());
    tracked.counters.results_freed.fetch_add(1, Ordering::SeqCst);
    if !tracked.result.error_message.is_null() {
        drop(CString::from_raw(tracked.result.error_message));
        tracked.counters.messages_freed.fetch_add(1, Ordering::SeqCst);
    }
}
