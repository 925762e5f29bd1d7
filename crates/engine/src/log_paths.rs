// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared path builders for the state directory.
//!
//! Used by the worker (writer) and the scheduler and CLI (readers) so every
//! party agrees on where things live:
//!   `<state_dir>/jobs/<job_id>/`
//!   `<state_dir>/logs/job/<job_id>.log`
//!   `<state_dir>/runner.lock`

use std::path::{Path, PathBuf};

/// Root of the per-job directories.
///
/// Structure: `{state_dir}/jobs`
pub fn jobs_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("jobs")
}

/// Base logs directory.
///
/// Structure: `{state_dir}/logs`
pub fn logs_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

/// Build the path to a job log file.
///
/// Structure: `{logs_dir}/job/{job_id}.log`
///
/// # Arguments
/// * `logs_dir` - Base logs directory (e.g., `~/.local/state/rj/logs`)
/// * `job_id` - Job identifier
pub fn job_log_path(logs_dir: &Path, job_id: &str) -> PathBuf {
    logs_dir.join("job").join(format!("{}.log", job_id))
}

/// Log file of the in-process runner.
///
/// Structure: `{logs_dir}/runner.log`
pub fn runner_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("runner.log")
}

/// Pid file of the last worker spawned for a job.
///
/// Structure: `{job_dir}/worker.pid`
pub fn pid_path(job_dir: &Path) -> PathBuf {
    job_dir.join("worker.pid")
}

/// Config snapshot taken when the job was submitted.
///
/// Structure: `{job_dir}/config.json`
pub fn config_snapshot_path(job_dir: &Path) -> PathBuf {
    job_dir.join("config.json")
}

/// Single-instance guard of the in-process runner.
///
/// Structure: `{state_dir}/runner.lock`
pub fn guard_path(state_dir: &Path) -> PathBuf {
    state_dir.join("runner.lock")
}

/// Optional configuration file.
///
/// Structure: `{state_dir}/rj.toml`
pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join("rj.toml")
}

#[cfg(test)]
#[path = "log_paths_tests.rs"]
mod tests;
