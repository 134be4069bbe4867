//! ffmpeg / ffprobe command lines and progress parsing.
//!
//! Video streams are re-encoded to H.264 at the target size and bitrate;
//! audio and subtitle streams are copied. ffmpeg writes machine-readable
//! progress (`key=value` lines) to stdout via `-progress pipe:1`.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde_json::Value;

use crate::errors::TranscodeError;

/// Parameters of one ffmpeg run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub input: String,
    pub output: String,
    pub width: i32,
    pub height: i32,
    pub bitrate: i32,
    pub preset: String,
}

/// Arguments for ffmpeg, without the program name.
pub fn build_args(job: &TranscodeJob) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-nostats", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    args.extend(["-i".to_string(), job.input.clone()]);
    // Same stream selection as a manual transcode: video, audio, subtitles
    args.extend(
        ["-map", "0:v", "-map", "0:a?", "-map", "0:s?", "-map_metadata", "0"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.extend([
        "-c".to_string(),
        "copy".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        job.preset.clone(),
        "-b:v".to_string(),
        job.bitrate.to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", job.width, job.height),
    ]);
    args.extend(["-progress".to_string(), "pipe:1".to_string()]);
    args.push(job.output.clone());
    args
}

/// Input duration according to ffprobe.
///
/// Returns `Ok(None)` if ffprobe ran but could not tell (live streams,
/// odd containers); progress is then only reported at the end.
pub fn probe_duration(ffprobe: &str, path: &Path) -> Result<Option<Duration>, TranscodeError> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
        .arg(path)
        .output()
        .map_err(|source| TranscodeError::Spawn {
            tool: ffprobe.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(TranscodeError::CommandFailed {
            tool: ffprobe.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_probe_duration(&output.stdout))
}

fn parse_probe_duration(stdout: &[u8]) -> Option<Duration> {
    let json: Value = serde_json::from_slice(stdout).ok()?;
    let seconds: f64 = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse().ok())?;

    (seconds.is_finite() && seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// What a single `-progress` line said.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Fraction of the input processed so far.
    Fraction(f64),
    /// ffmpeg reported `progress=end`.
    End,
    /// Anything else.
    Other,
}

/// Turns `-progress` output into fractions of the input duration.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_us: Option<f64>,
}

impl ProgressParser {
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            duration_us: duration.map(|d| d.as_secs_f64() * 1_000_000.0),
        }
    }

    pub fn parse_line(&self, line: &str) -> ProgressLine {
        let Some((key, value)) = line.trim().split_once('=') else {
            return ProgressLine::Other;
        };
        match key {
            // out_time_ms is also in microseconds, despite the name
            "out_time_us" | "out_time_ms" => {
                let (Some(total), Ok(done)) = (self.duration_us, value.parse::<f64>()) else {
                    return ProgressLine::Other;
                };
                ProgressLine::Fraction((done / total).clamp(0.0, 1.0))
            }
            "progress" if value == "end" => ProgressLine::End,
            _ => ProgressLine::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodeJob {
        TranscodeJob {
            input: "/tmp/a.mov".to_string(),
            output: "/tmp/b.mp4".to_string(),
            width: 960,
            height: 540,
            bitrate: 2_097_152,
            preset: "medium".to_string(),
        }
    }

    #[test]
    fn args_reencode_video_and_copy_the_rest() {
        let args = build_args(&job());
        let joined = args.join(" ");

        assert!(joined.contains("-i /tmp/a.mov"));
        assert!(joined.contains("-c copy -c:v libx264 -preset medium"));
        assert!(joined.contains("-b:v 2097152"));
        assert!(joined.contains("-vf scale=960:540"));
        assert!(joined.contains("-map 0:a? -map 0:s?"));
        assert!(joined.contains("-progress pipe:1"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/b.mp4"));
    }

    #[test]
    fn parses_probe_json() {
        let json = br#"{"format": {"duration": "12.500000"}}"#;
        assert_eq!(parse_probe_duration(json), Some(Duration::from_millis(12_500)));
    }

    #[test]
    fn probe_without_duration_is_unknown() {
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#), None);
        assert_eq!(parse_probe_duration(br#"{"format": {"duration": "N/A"}}"#), None);
        assert_eq!(parse_probe_duration(b"not json"), None);
    }

    #[test]
    fn progress_lines_become_fractions() {
        let parser = ProgressParser::new(Some(Duration::from_secs(2)));
        assert_eq!(parser.parse_line("out_time_us=500000"), ProgressLine::Fraction(0.25));
        assert_eq!(parser.parse_line("out_time_ms=1000000\n"), ProgressLine::Fraction(0.5));
        assert_eq!(parser.parse_line("out_time_us=9000000"), ProgressLine::Fraction(1.0));
        assert_eq!(parser.parse_line("out_time_us=N/A"), ProgressLine::Other);
        assert_eq!(parser.parse_line("progress=continue"), ProgressLine::Other);
        assert_eq!(parser.parse_line("progress=end"), ProgressLine::End);
        assert_eq!(parser.parse_line("frame=42"), ProgressLine::Other);
    }

    #[test]
    fn unknown_duration_yields_no_fractions() {
        let parser = ProgressParser::new(None);
        assert_eq!(parser.parse_line("out_time_us=500000"), ProgressLine::Other);
        assert_eq!(parser.parse_line("progress=end"), ProgressLine::End);
    }
}
