// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only logger for per-job activity logs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::log_paths;

/// Append-only logger for per-job activity logs.
///
/// Writes human-readable timestamped lines to:
///   `<log_dir>/job/<job_id>.log`
///
/// The same file receives the worker's stdout and stderr, so lines from
/// both sources interleave in order of arrival. Each `append()` call opens,
/// writes, and closes the file.
#[derive(Debug, Clone)]
pub struct JobLogger {
    log_dir: PathBuf,
}

impl JobLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn path(&self, job_id: &str) -> PathBuf {
        log_paths::job_log_path(&self.log_dir, job_id)
    }

    /// Append a log line for the given job.
    ///
    /// Format: `2026-01-30T08:14:09Z [stage] message`
    ///
    /// Failures are logged via tracing but do not propagate.
    pub fn append(&self, job_id: &str, step: &str, message: &str) {
        let path = self.path(job_id);
        if let Err(e) = write_line(&path, step, message) {
            tracing::warn!(job_id, error = %e, "failed to write job log");
        }
    }
}

fn write_line(path: &Path, step: &str, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    writeln!(file, "{} [{}] {}", ts, step, message)?;
    Ok(())
}

#[cfg(test)]
#[path = "job_logger_tests.rs"]
mod tests;
