// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution backend interface shared by the process-per-job and in-process
//! runners.

use crate::error::SchedulerError;
use rj_core::{JobId, OwnerId};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    Completed,
    Failed,
    NotFound,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Completed => "completed",
            WorkerStatus::Failed => "failed",
            WorkerStatus::NotFound => "not_found",
        })
    }
}

/// Scheduling surface for jobs. Implementations are mutually exclusive per
/// job: a job started by one backend is supervised by that backend.
pub trait JobBackend: Send + Sync {
    /// Create a job and start its first worker run.
    fn submit(&self, owner: &OwnerId, seed: &Value) -> Result<JobId, SchedulerError>;

    /// Start a worker in resume mode. `false` when the job has nothing to
    /// do or a worker is already running.
    fn resume(&self, id: &JobId) -> Result<bool, SchedulerError>;

    /// Stop the job's worker and mark it cancelled. `false` when there was
    /// no worker to stop.
    fn terminate(&self, id: &JobId) -> Result<bool, SchedulerError>;

    /// Worker status, independent of the job's pipeline status.
    fn status(&self, id: &JobId) -> WorkerStatus;

    /// Last `tail` lines of the job log.
    fn logs(&self, id: &JobId, tail: usize) -> Result<Vec<String>, SchedulerError>;
}

/// Last `n` lines of `path`, keeping at most `n` lines in memory. A missing
/// file has no lines.
pub fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>, SchedulerError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SchedulerError::io(path, e)),
    };
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut window = VecDeque::with_capacity(n.min(4096));
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| SchedulerError::io(path, e))?;
        if window.len() == n {
            window.pop_front();
        }
        window.push_back(String::from_utf8_lossy(&line).into_owned());
    }
    Ok(window.into())
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
