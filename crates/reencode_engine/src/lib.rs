//! Reencode Engine - native re-encode library behind the plugin C ABI
//!
//! Exports the four entry points the host resolves at link time:
//! - `init_ffmpeg_plugin`: create an engine, NULL on failure
//! - `deinit_ffmpeg_plugin`: release it
//! - `reencode_video`: run one blocking re-encode with progress callbacks
//! - `free_c_result`: release a result returned by `reencode_video`
//!
//! Encoder settings come from the file named by `REENCODE_CONFIG`, or the
//! defaults when it is unset.

pub mod errors;
pub mod ffmpeg;
pub mod transcoder;

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use reencode_core::abi::{CResult, EngineApi, ProgressCallback, SINK_CONTINUE};
use reencode_core::config::{settings_from_env, EngineSettings};

pub use errors::TranscodeError;
pub use transcoder::{Flow, ReencodeArgs, Transcoder};

/// Engine state behind the opaque pointer handed to the host.
pub struct ReencodeEngine {
    transcoder: Transcoder,
}

impl ReencodeEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            transcoder: Transcoder::new(settings),
        }
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }
}

/// Entry points of this library, for hosts linking it as a Rust crate.
pub fn engine_api() -> EngineApi {
    EngineApi {
        init: init_ffmpeg_plugin,
        deinit: deinit_ffmpeg_plugin,
        reencode: reencode_video,
        free_result: free_c_result,
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create an engine.
///
/// Returns NULL if the configuration cannot be loaded or is invalid.
#[no_mangle]
pub extern "C" fn init_ffmpeg_plugin() -> *mut c_void {
    match panic::catch_unwind(create_engine) {
        Ok(Some(engine)) => Box::into_raw(engine) as *mut c_void,
        Ok(None) => ptr::null_mut(),
        Err(_) => {
            tracing::error!("Engine creation panicked");
            ptr::null_mut()
        }
    }
}

fn create_engine() -> Option<Box<ReencodeEngine>> {
    let settings = match settings_from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load engine settings: {}", e);
            return None;
        }
    };
    if let Err(message) = settings.engine.validate() {
        tracing::error!("Invalid engine settings: {}", message);
        return None;
    }

    tracing::debug!(
        ffmpeg = %settings.engine.ffmpeg_path,
        preset = %settings.engine.preset,
        "Engine created"
    );
    Some(Box::new(ReencodeEngine::new(settings.engine)))
}

/// Release an engine.
///
/// # Safety
/// - `plugin` must be NULL or a pointer from `init_ffmpeg_plugin`
/// - `plugin` must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn deinit_ffmpeg_plugin(plugin: *mut c_void) {
    if plugin.is_null() {
        return;
    }
    let engine = Box::from_raw(plugin as *mut ReencodeEngine);
    if panic::catch_unwind(AssertUnwindSafe(move || drop(engine))).is_err() {
        tracing::error!("Engine teardown panicked");
    }
}

// ============================================================================
// Re-encode
// ============================================================================

/// Re-encode `input_path` into `output_path`, blocking until done.
///
/// `inform_about_progress` is called with increasing fractions and
/// `context`; a non-zero return cancels the job. `bitrate <= 0` selects
/// the configured default. Never returns NULL.
///
/// # Safety
/// - `plugin` must be NULL or a live pointer from `init_ffmpeg_plugin`
/// - the paths must be NULL or NUL-terminated strings
/// - `context` must stay valid until this call returns
#[no_mangle]
pub unsafe extern "C" fn reencode_video(
    plugin: *mut c_void,
    input_path: *const c_char,
    output_path: *const c_char,
    target_width: i32,
    target_height: i32,
    bitrate: i32,
    context: *mut c_void,
    inform_about_progress: ProgressCallback,
) -> *mut CResult {
    if plugin.is_null() {
        return failure("Plugin pointer is null");
    }
    let Some(input) = path_str(input_path) else {
        return failure("Invalid input path");
    };
    let Some(output) = path_str(output_path) else {
        return failure("Invalid output path");
    };

    let engine = &*(plugin as *const ReencodeEngine);
    let args = ReencodeArgs {
        input_path: input,
        output_path: output,
        width: target_width,
        height: target_height,
        bitrate,
    };
    let mut report = |fraction: f64| {
        // SAFETY: the caller keeps `context` valid for the whole call.
        if unsafe { inform_about_progress(fraction, context) } == SINK_CONTINUE {
            Flow::Continue
        } else {
            Flow::Cancel
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        engine.transcoder.run(&args, &mut report)
    }));
    match outcome {
        Ok(Ok(())) => success(),
        Ok(Err(e)) => {
            tracing::warn!("Re-encode failed: {:#}", e);
            failure(&format!("{:#}", e))
        }
        Err(_) => failure("Re-encode panicked"),
    }
}

/// Release a result from `reencode_video`.
///
/// # Safety
/// - `result` must be NULL or a pointer from `reencode_video`
/// - `result` must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn free_c_result(result: *mut CResult) {
    if result.is_null() {
        return;
    }
    let result = Box::from_raw(result);
    let freed = panic::catch_unwind(AssertUnwindSafe(move || {
        if !result.error_message.is_null() {
            drop(CString::from_raw(result.error_message));
        }
    }));
    if freed.is_err() {
        tracing::error!("Freeing a result panicked");
    }
}

unsafe fn path_str<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        return None;
    }
    CStr::from_ptr(path).to_str().ok()
}

fn success() -> *mut CResult {
    Box::into_raw(Box::new(CResult {
        ok: true,
        error_message: ptr::null_mut(),
    }))
}

fn failure(message: &str) -> *mut CResult {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    Box::into_raw(Box::new(CResult {
        ok: false,
        error_message: message.into_raw(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe extern "C" fn count_progress(_progress: f64, context: *mut c_void) -> i32 {
        (*(context as *const AtomicUsize)).fetch_add(1, Ordering::SeqCst);
        SINK_CONTINUE
    }

    unsafe fn message_of(result: *mut CResult) -> Option<String> {
        let record = &*result;
        (!record.error_message.is_null())
            .then(|| CStr::from_ptr(record.error_message).to_string_lossy().into_owned())
    }

    fn engine_ptr() -> *mut c_void {
        Box::into_raw(Box::new(ReencodeEngine::new(EngineSettings::default()))) as *mut c_void
    }

    #[test]
    fn null_plugin_is_reported() {
        let input = CString::new("/tmp/in.mov").unwrap();
        let calls = AtomicUsize::new(0);
        unsafe {
            let result = reencode_video(
                ptr::null_mut(),
                input.as_ptr(),
                input.as_ptr(),
                640,
                360,
                0,
                &calls as *const _ as *mut c_void,
                count_progress,
            );
            assert!(!(*result).ok);
            assert_eq!(message_of(result).as_deref(), Some("Plugin pointer is null"));
            free_c_result(result);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn null_paths_are_reported() {
        let path = CString::new("/tmp/in.mov").unwrap();
        let calls = AtomicUsize::new(0);
        let ctx = &calls as *const _ as *mut c_void;
        let plugin = engine_ptr();
        unsafe {
            let result =
                reencode_video(plugin, ptr::null(), path.as_ptr(), 1, 1, 0, ctx, count_progress);
            assert_eq!(message_of(result).as_deref(), Some("Invalid input path"));
            free_c_result(result);

            let result =
                reencode_video(plugin, path.as_ptr(), ptr::null(), 1, 1, 0, ctx, count_progress);
            assert_eq!(message_of(result).as_deref(), Some("Invalid output path"));
            free_c_result(result);

            deinit_ffmpeg_plugin(plugin);
        }
    }

    #[test]
    fn bitrate_error_text_crosses_the_boundary() {
        let input = CString::new("/nonexistent/in.mov").unwrap();
        let output = CString::new("/tmp/out.mp4").unwrap();
        let calls = AtomicUsize::new(0);
        let plugin = engine_ptr();
        unsafe {
            let result = reencode_video(
                plugin,
                input.as_ptr(),
                output.as_ptr(),
                640,
                360,
                200_000_000,
                &calls as *const _ as *mut c_void,
                count_progress,
            );
            assert!(!(*result).ok);
            assert_eq!(
                message_of(result).as_deref(),
                Some("Bitrate 200000000 is too high. Maximum is 100000000 bps")
            );
            free_c_result(result);
            deinit_ffmpeg_plugin(plugin);
        }
    }

    #[test]
    fn free_and_deinit_accept_null() {
        unsafe {
            free_c_result(ptr::null_mut());
            deinit_ffmpeg_plugin(ptr::null_mut());
        }
    }

    #[test]
    fn failure_messages_never_contain_nul() {
        let result = failure("bad\0path");
        unsafe {
            assert_eq!(message_of(result).as_deref(), Some("bad path"));
            free_c_result(result);
        }
    }

    #[test]
    fn api_points_at_exports() {
        let api = engine_api();
        unsafe {
            let result = success();
            (api.free_result)(result);
        }
    }
}
