//! C ABI shared between the host and the engine library.
//!
//! The engine exports four entry points (init, deinit, reencode, free) with
//! the signatures below. The host never looks inside the engine pointer; it
//! only threads it back into the other entry points.

use std::ffi::{c_char, c_void};

/// Sink return value asking the engine to keep going.
pub const SINK_CONTINUE: i32 = 0;

/// Sink return value asking the engine to stop as soon as it can.
pub const SINK_CANCEL: i32 = 1;

/// Result record returned by the engine's re-encode entry point.
///
/// `error_message` is NULL when `ok` is true, otherwise it points to a
/// NUL-terminated string owned by the engine. The whole record is released
/// by passing it to the engine's free entry point exactly once.
#[repr(C)]
#[derive(Debug)]
pub struct CResult {
    pub ok: bool,
    pub error_message: *mut c_char,
}

/// Progress sink called by the engine from any thread.
///
/// Arguments: (fraction in [0, 1], opaque context pointer). Returns
/// [`SINK_CONTINUE`] or a non-zero value to request cancellation.
pub type ProgressCallback = unsafe extern "C" fn(progress: f64, context: *mut c_void) -> i32;

/// `init` entry point: returns an opaque engine pointer, NULL on failure.
pub type InitFn = unsafe extern "C" fn() -> *mut c_void;

/// `deinit` entry point: releases everything behind the engine pointer.
pub type DeinitFn = unsafe extern "C" fn(engine: *mut c_void);

/// `reencode` entry point. Blocks until the job finished or failed.
pub type ReencodeFn = unsafe extern "C" fn(
    engine: *mut c_void,
    input_path: *const c_char,
    output_path: *const c_char,
    target_width: i32,
    target_height: i32,
    bitrate: i32,
    context: *mut c_void,
    inform_about_progress: ProgressCallback,
) -> *mut CResult;

/// `free` entry point for results returned by `reencode`. NULL-safe.
pub type FreeResultFn = unsafe extern "C" fn(result: *mut CResult);

/// The engine's entry points, resolved once by whoever links the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineApi {
    pub init: InitFn,
    pub deinit: DeinitFn,
    pub reencode: ReencodeFn,
    pub free_result: FreeResultFn,
}
