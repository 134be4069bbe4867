//! Drives the exported C ABI against shell-script stand-ins for ffmpeg and
//! ffprobe. Everything runs inside one test so the scripts are never
//! executed while another test thread is still writing one.

#![cfg(unix)]

use std::ffi::{c_void, CStr, CString};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use reencode_core::abi::{CResult, EngineApi, SINK_CANCEL, SINK_CONTINUE};
use reencode_core::config::CONFIG_ENV;
use reencode_engine::engine_api;

const FFPROBE: &str = r#"#!/bin/sh
echo '{"format": {"duration": "4.000000"}}'
"#;

const FFMPEG_OK: &str = r#"#!/bin/sh
for last; do :; done
echo "frame=1"
echo "out_time_us=1000000"
echo "progress=continue"
echo "out_time_us=2000000"
echo "out_time_ms=3000000"
echo "progress=end"
echo "encoded" > "$last"
"#;

const FFMPEG_FAIL: &str = r#"#!/bin/sh
echo "Input #0, mov, from 'in.mov':" >&2
echo "Unknown encoder 'libx264'" >&2
exit 1
"#;

const FFMPEG_SLOW: &str = r#"#!/bin/sh
echo "out_time_us=1000000"
echo "out_time_us=2000000"
exec sleep 30
"#;

struct Recorder {
    seen: Mutex<Vec<f64>>,
    cancel: bool,
}

unsafe extern "C" fn record(progress: f64, context: *mut c_void) -> i32 {
    let recorder = &*(context as *const Recorder);
    recorder.seen.lock().push(progress);
    if recorder.cancel {
        SINK_CANCEL
    } else {
        SINK_CONTINUE
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_config(dir: &Path, name: &str, ffmpeg: &Path, ffprobe: &Path) -> PathBuf {
    let path = dir.join(name);
    let toml = format!(
        "[engine]\nffmpeg_path = \"{}\"\nffprobe_path = \"{}\"\npreset = \"veryfast\"\n",
        ffmpeg.display(),
        ffprobe.display()
    );
    fs::write(&path, toml).unwrap();
    path
}

/// Returns (ok, error text, progress seen).
fn run(
    api: &EngineApi,
    config: &Path,
    input: &Path,
    output: &Path,
    bitrate: i32,
    cancel: bool,
) -> (bool, Option<String>, Vec<f64>) {
    std::env::set_var(CONFIG_ENV, config);
    let recorder = Recorder {
        seen: Mutex::new(Vec::new()),
        cancel,
    };
    let input = CString::new(format!("file://{}", input.display())).unwrap();
    let output = CString::new(output.to_str().unwrap()).unwrap();

    unsafe {
        let engine = (api.init)();
        assert!(!engine.is_null());

        let result: *mut CResult = (api.reencode)(
            engine,
            input.as_ptr(),
            output.as_ptr(),
            1280,
            720,
            bitrate,
            &recorder as *const Recorder as *mut c_void,
            record,
        );
        assert!(!result.is_null());
        let ok = (*result).ok;
        let message = (!(*result).error_message.is_null())
            .then(|| CStr::from_ptr((*result).error_message).to_string_lossy().into_owned());
        (api.free_result)(result);
        (api.deinit)(engine);

        (ok, message, recorder.seen.into_inner())
    }
}

#[test]
fn reencode_through_c_abi_with_fake_tools() {
    let dir = tempfile::tempdir().unwrap();
    let ffprobe = write_script(dir.path(), "ffprobe", FFPROBE);
    let ok_cfg = write_config(
        dir.path(),
        "ok.toml",
        &write_script(dir.path(), "ffmpeg-ok", FFMPEG_OK),
        &ffprobe,
    );
    let fail_cfg = write_config(
        dir.path(),
        "fail.toml",
        &write_script(dir.path(), "ffmpeg-fail", FFMPEG_FAIL),
        &ffprobe,
    );
    let slow_cfg = write_config(
        dir.path(),
        "slow.toml",
        &write_script(dir.path(), "ffmpeg-slow", FFMPEG_SLOW),
        &ffprobe,
    );
    let bad_cfg = dir.path().join("bad.toml");
    fs::write(&bad_cfg, "[engine]\nmin_bitrate = 0\n").unwrap();

    let input = dir.path().join("in.mov");
    fs::write(&input, b"not really a movie").unwrap();
    let output = dir.path().join("out.mp4");
    let api = engine_api();

    // Success: fractions follow out_time over the probed duration
    let (ok, message, seen) = run(&api, &ok_cfg, &input, &output, 0, false);
    assert!(ok, "unexpected failure: {:?}", message);
    assert_eq!(message, None);
    assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(fs::read_to_string(&output).unwrap().trim(), "encoded");

    // ffmpeg failure carries the last stderr line
    let (ok, message, seen) = run(&api, &fail_cfg, &input, &output, 2_000_000, false);
    assert!(!ok);
    let message = message.unwrap();
    assert!(message.contains("exited with code 1"), "{}", message);
    assert!(message.contains("Unknown encoder 'libx264'"), "{}", message);
    assert!(seen.is_empty());

    // Cancel on the first sample kills ffmpeg
    let (ok, message, seen) = run(&api, &slow_cfg, &input, &output, 0, true);
    assert!(!ok);
    assert!(
        message.as_deref().unwrap().ends_with("Video re-encoding was cancelled"),
        "{:?}",
        message
    );
    assert_eq!(seen, vec![0.25]);

    // Invalid configuration makes init fail
    std::env::set_var(CONFIG_ENV, &bad_cfg);
    assert!(unsafe { (api.init)() }.is_null());
    std::env::remove_var(CONFIG_ENV);
}
