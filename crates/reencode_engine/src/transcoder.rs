//! One ffmpeg re-encode at a time.
//!
//! The [`Transcoder`] owns the encoder settings for the lifetime of the
//! engine pointer. A run probes the input duration, starts ffmpeg with
//! `-progress pipe:1`, turns the progress lines into fractions and hands
//! each new fraction to the caller's reporter. The reporter returning
//! [`Flow::Cancel`] kills ffmpeg.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reencode_core::config::EngineSettings;

use crate::errors::TranscodeError;
use crate::ffmpeg::{build_args, probe_duration, ProgressLine, ProgressParser, TranscodeJob};

/// Lines of ffmpeg stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// What the reporter wants after a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancel,
}

/// Arguments of one re-encode as received from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReencodeArgs<'a> {
    pub input_path: &'a str,
    pub output_path: &'a str,
    pub width: i32,
    pub height: i32,
    /// 0 or negative selects the configured default.
    pub bitrate: i32,
}

pub struct Transcoder {
    settings: EngineSettings,
    running: Mutex<()>,
}

impl Transcoder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            running: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one re-encode to completion, failure or cancellation.
    pub fn run(&self, args: &ReencodeArgs<'_>, report: &mut dyn FnMut(f64) -> Flow) -> Result<()> {
        let _running = self.running.try_lock().ok_or(TranscodeError::Busy)?;

        let job = TranscodeJob {
            input: strip_file_scheme(args.input_path).to_string(),
            output: strip_file_scheme(args.output_path).to_string(),
            width: args.width,
            height: args.height,
            bitrate: resolve_bitrate(args.bitrate, &self.settings)?,
            preset: self.settings.preset.clone(),
        };

        if !Path::new(&job.input).exists() {
            return Err(TranscodeError::InputNotFound(job.input).into());
        }

        tracing::info!(
            input = %job.input,
            output = %job.output,
            width = job.width,
            height = job.height,
            bitrate = job.bitrate,
            "Starting re-encode"
        );

        let duration = match probe_duration(&self.settings.ffprobe_path, Path::new(&job.input)) {
            Ok(duration) => duration,
            Err(e) => {
                tracing::warn!("Could not read input duration, progress limited to completion: {}", e);
                None
            }
        };

        let child = Command::new(&self.settings.ffmpeg_path)
            .args(build_args(&job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                tool: self.settings.ffmpeg_path.clone(),
                source,
            })?;

        self.drive(child, ProgressParser::new(duration), report)
            .with_context(|| format!("Failed to re-encode {}", job.input))?;

        tracing::info!(output = %job.output, "Re-encode finished");
        Ok(())
    }

    fn drive(
        &self,
        mut child: Child,
        parser: ProgressParser,
        report: &mut dyn FnMut(f64) -> Flow,
    ) -> Result<()> {
        let stderr = child.stderr.take().context("Failed to capture ffmpeg stderr")?;
        let stderr_tail = thread::Builder::new()
            .name("ffmpeg-stderr".to_string())
            .spawn(move || collect_tail(stderr))
            .context("Failed to start stderr reader")?;

        let stdout = child.stdout.take().context("Failed to capture ffmpeg stdout")?;
        let mut reporter = MonotonicReporter::new(report);
        let mut cancelled = false;

        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Stopped reading ffmpeg progress: {}", e);
                    break;
                }
            };
            let flow = match parser.parse_line(&line) {
                ProgressLine::Fraction(fraction) => reporter.report(fraction),
                ProgressLine::End => reporter.report(1.0),
                ProgressLine::Other => Flow::Continue,
            };
            if flow == Flow::Cancel {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            tracing::info!("Cancel requested, stopping ffmpeg");
            if let Err(e) = child.kill() {
                tracing::warn!("Failed to kill ffmpeg: {}", e);
            }
        }

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        let tail = stderr_tail.join().unwrap_or_default();

        if cancelled {
            return Err(TranscodeError::Cancelled.into());
        }
        if !status.success() {
            for line in &tail {
                tracing::debug!("[ffmpeg] {}", line);
            }
            return Err(TranscodeError::CommandFailed {
                tool: self.settings.ffmpeg_path.clone(),
                exit_code: status.code().unwrap_or(-1),
                message: tail.last().cloned().unwrap_or_default(),
            }
            .into());
        }

        if reporter.report(1.0) == Flow::Cancel {
            tracing::debug!("Cancel arrived after ffmpeg finished; keeping the output");
        }
        Ok(())
    }
}

/// Forwards only fractions above the last one reported.
struct MonotonicReporter<'a> {
    report: &'a mut dyn FnMut(f64) -> Flow,
    last: Option<f64>,
}

impl<'a> MonotonicReporter<'a> {
    fn new(report: &'a mut dyn FnMut(f64) -> Flow) -> Self {
        Self { report, last: None }
    }

    fn report(&mut self, fraction: f64) -> Flow {
        if self.last.is_some_and(|last| fraction <= last) {
            return Flow::Continue;
        }
        self.last = Some(fraction);
        (self.report)(fraction)
    }
}

fn collect_tail(stream: impl std::io::Read) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stream).lines().map_while(|l| l.ok()) {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Effective bitrate: non-positive selects the default, anything else
/// must lie within the configured bounds.
pub fn resolve_bitrate(requested: i32, settings: &EngineSettings) -> Result<i32, TranscodeError> {
    if requested <= 0 {
        return Ok(settings.default_bitrate);
    }
    if requested < settings.min_bitrate {
        return Err(TranscodeError::BitrateTooLow {
            bitrate: requested,
            min: settings.min_bitrate,
        });
    }
    if requested > settings.max_bitrate {
        return Err(TranscodeError::BitrateTooHigh {
            bitrate: requested,
            max: settings.max_bitrate,
        });
    }
    Ok(requested)
}

/// Paths may arrive as `file://` URLs from the host.
pub fn strip_file_scheme(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_defaults_and_bounds() {
        let settings = EngineSettings::default();
        assert_eq!(resolve_bitrate(0, &settings).unwrap(), 1_000_000);
        assert_eq!(resolve_bitrate(-5, &settings).unwrap(), 1_000_000);
        assert_eq!(resolve_bitrate(2_097_152, &settings).unwrap(), 2_097_152);
        assert_eq!(resolve_bitrate(100_000, &settings).unwrap(), 100_000);
        assert_eq!(resolve_bitrate(100_000_000, &settings).unwrap(), 100_000_000);

        assert_eq!(
            resolve_bitrate(99_999, &settings).unwrap_err().to_string(),
            "Bitrate 99999 is too low. Minimum is 100000 bps"
        );
        assert_eq!(
            resolve_bitrate(100_000_001, &settings).unwrap_err().to_string(),
            "Bitrate 100000001 is too high. Maximum is 100000000 bps"
        );
    }

    #[test]
    fn strips_file_urls_only() {
        assert_eq!(strip_file_scheme("file:///tmp/a.mov"), "/tmp/a.mov");
        assert_eq!(strip_file_scheme("/tmp/a.mov"), "/tmp/a.mov");
        assert_eq!(strip_file_scheme("http://x/a.mov"), "http://x/a.mov");
    }

    #[test]
    fn missing_input_fails_before_spawning() {
        let transcoder = Transcoder::new(EngineSettings {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..EngineSettings::default()
        });
        let args = ReencodeArgs {
            input_path: "file:///nonexistent/in.mov",
            output_path: "/tmp/out.mp4",
            width: 640,
            height: 360,
            bitrate: 0,
        };
        let mut calls = 0;
        let err = transcoder
            .run(&args, &mut |_| {
                calls += 1;
                Flow::Continue
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "Input file not found: /nonexistent/in.mov");
        assert_eq!(calls, 0);
    }

    #[test]
    fn bad_bitrate_fails_before_touching_input() {
        let transcoder = Transcoder::new(EngineSettings::default());
        let args = ReencodeArgs {
            input_path: "/nonexistent/in.mov",
            output_path: "/tmp/out.mp4",
            width: 640,
            height: 360,
            bitrate: 10,
        };
        let err = transcoder.run(&args, &mut |_| Flow::Continue).unwrap_err();
        assert!(err.to_string().contains("too low"));
    }

    #[test]
    fn reporter_skips_non_advancing_values() {
        let mut seen = Vec::new();
        let mut sink = |f: f64| {
            seen.push(f);
            Flow::Continue
        };
        let mut reporter = MonotonicReporter::new(&mut sink);
        for f in [0.1, 0.1, 0.05, 0.4, 1.0, 1.0] {
            reporter.report(f);
        }
        drop(reporter);
        assert_eq!(seen, vec![0.1, 0.4, 1.0]);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n\n", i)).collect();
        let tail = collect_tail(text.as_bytes());
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.first().map(String::as_str), Some("line 10"));
        assert_eq!(tail.last().map(String::as_str), Some("line 29"));
    }
}
