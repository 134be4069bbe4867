//! Single-owner handle to an initialized engine.
//!
//! [`EngineHandle::initialize`] calls the engine's `init` entry point once
//! and `Drop` calls `deinit` once. The handle cannot be cloned, so double
//! deinit and use-after-deinit do not type-check. Re-encodes are serialized
//! by an in-flight flag: a second call while one is running is rejected
//! with [`EngineError::Busy`] instead of reaching the engine.

use std::ffi::{c_void, CString};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::abi::EngineApi;
use crate::models::ReencodeRequest;
use crate::progress::ProgressSink;
use crate::result::OperationResult;

/// Errors raised on the host side of the engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine initialization failed")]
    Initialization,

    #[error("Engine is busy with another re-encode")]
    Busy,

    #[error("Invalid argument for engine: {0}")]
    InvalidArgument(String),

    #[error("Engine returned no result")]
    NullResult,
}

/// Exclusively owned, initialized engine instance.
pub struct EngineHandle {
    raw: NonNull<c_void>,
    api: EngineApi,
    in_flight: AtomicBool,
}

// SAFETY: the engine pointer is only touched through `reencode` (serialized
// by `in_flight`) and `Drop` (exclusive access).
unsafe impl Send for EngineHandle {}
unsafe impl Sync for EngineHandle {}

impl EngineHandle {
    /// Initialize the engine. A NULL return from `init` is fatal for this
    /// handle; nothing needs to be released in that case.
    pub fn initialize(api: EngineApi) -> Result<Self, EngineError> {
        // SAFETY: `init` takes no arguments and returns an owned pointer.
        let raw = unsafe { (api.init)() };
        let raw = NonNull::new(raw).ok_or_else(|| {
            tracing::error!("Engine init returned a null handle");
            EngineError::Initialization
        })?;
        tracing::debug!("Engine initialized at {:p}", raw);

        Ok(Self {
            raw,
            api,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Release the engine now rather than at end of scope.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Whether a re-encode is currently running on this handle.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one re-encode, blocking until the engine returns.
    ///
    /// Must not be called from the UI-affine context. The sink's context is
    /// retained until the engine call has returned.
    pub fn reencode(
        &self,
        request: &ReencodeRequest,
        sink: &ProgressSink,
    ) -> Result<OperationResult, EngineError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        let input = path_arg("input", request.input_path())?;
        let output = path_arg("output", request.output_path())?;
        let context = sink.retain();

        tracing::debug!(
            input = request.input_path(),
            output = request.output_path(),
            width = request.target_width(),
            height = request.target_height(),
            bitrate = request.bitrate(),
            "Calling engine reencode"
        );

        // SAFETY: `raw` is a live engine, the strings and the context outlive
        // the call, and the callback matches the ABI.
        let raw_result = unsafe {
            (self.api.reencode)(
                self.raw.as_ptr(),
                input.as_ptr(),
                output.as_ptr(),
                request.target_width(),
                request.target_height(),
                request.bitrate(),
                context.as_ptr(),
                sink.callback(),
            )
        };
        drop(context);

        let raw_result = NonNull::new(raw_result).ok_or(EngineError::NullResult)?;
        // SAFETY: returned by this engine's reencode, not freed yet.
        Ok(unsafe { OperationResult::from_raw(raw_result, self.api.free_result) })
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        tracing::debug!("Releasing engine at {:p}", self.raw);
        // SAFETY: `raw` came from `init` and this is the only deinit.
        unsafe { (self.api.deinit)(self.raw.as_ptr()) };
    }
}

struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn path_arg(which: &str, path: &str) -> Result<CString, EngineError> {
    CString::new(path)
        .map_err(|_| EngineError::InvalidArgument(format!("{} path contains a NUL byte", which)))
}
