//! Per-job logger with file and callback output.
//!
//! Each re-encode job can get its own logger that:
//! - Writes to `<job_id>.log` in the logs folder
//! - Forwards unstamped lines to an optional callback
//! - Filters progress to step intervals in compact mode
//! - Keeps a tail of recent engine lines, dumped when the job fails

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, LogLineCallback};

/// Per-job logger with dual output (file + callback).
pub struct JobLogger {
    job_id: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LogLineCallback>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress percentage written, for compact filtering.
    last_progress: Mutex<Option<u32>>,
}

impl JobLogger {
    /// Create a logger writing to `<log_dir>/<job_id>.log`.
    pub fn new(
        job_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogLineCallback>,
    ) -> std::io::Result<Self> {
        let job_id = job_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&job_id)));
        let file = File::create(&log_path)?;

        Ok(Self {
            job_id,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(None),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        self.output(message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &format!("[WARNING] {}", message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &format!("[ERROR] {}", message));
    }

    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &format!("=== {} ===", phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &format!("[SUCCESS] {}", message));
    }

    /// Log a progress percentage.
    ///
    /// In compact mode only the first value in each `progress_step` band
    /// (and 100%) is written. Returns true if the line was written.
    pub fn progress(&self, percent: u32) -> bool {
        let mut last = self.last_progress.lock();
        if self.config.compact {
            let step = self.config.progress_step.max(1);
            let band = percent / step;
            let written = matches!(*last, Some(prev) if prev / step >= band);
            if written && percent < 100 {
                return false;
            }
        }
        if *last == Some(percent) {
            return false;
        }
        *last = Some(percent);
        drop(last);

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Record an engine-side line (raw sample, engine message).
    ///
    /// Always kept in the tail; only written out when not compact.
    pub fn engine_line(&self, line: &str) {
        {
            let mut buffer = self.tail_buffer.lock();
            if self.config.error_tail > 0 {
                if buffer.len() >= self.config.error_tail {
                    buffer.pop_front();
                }
                buffer.push_back(line.to_string());
            }
        }

        if !self.config.compact {
            self.output(&format!("[engine] {}", line));
        }
    }

    /// Write the tail buffer out under a header.
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&format!("[{}/tail]", header));
        for line in buffer.iter() {
            self.output(line);
        }
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release the file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    /// File gets the stamped line, the callback the bare one.
    fn output(&self, line: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", self.format_message(line));
        }
        if let Some(ref callback) = self.callback {
            callback(line);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
