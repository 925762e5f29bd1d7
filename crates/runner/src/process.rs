// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-per-job backend.
//!
//! Each run of a job is one `rjw` process in its own process group, with
//! stdin closed and stdout/stderr appended straight to the job log file.
//! Workers outlive the submitting process; later invocations find them
//! through the pid file in the job directory.

use crate::backend::{tail_lines, JobBackend, WorkerStatus};
use crate::context::Context;
use crate::env;
use crate::error::SchedulerError;
use crate::pidfile::{self, PidRecord};
use parking_lot::Mutex;
use rj_core::{Clock, JobId, OwnerId, Stage, SystemClock};
use rj_engine::log_paths::pid_path;
use rj_engine::RunMode;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub struct ProcessBackend {
    ctx: Context,
    worker_binary: PathBuf,
    handles: Mutex<HashMap<JobId, Child>>,
}

impl ProcessBackend {
    pub fn new(ctx: Context) -> Self {
        Self::with_worker_binary(ctx, find_worker_binary())
    }

    pub fn with_worker_binary(ctx: Context, worker_binary: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            worker_binary: worker_binary.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn spawn(&self, id: &JobId, mode: RunMode) -> Result<u32, SchedulerError> {
        let log_path = self.ctx.log_path(id);
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SchedulerError::io(parent, e))?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SchedulerError::io(&log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| SchedulerError::io(&log_path, e))?;

        let mut cmd = Command::new(&self.worker_binary);
        cmd.arg(id.as_str());
        if mode == RunMode::Resume {
            cmd.arg("--resume");
        }
        let child = cmd
            .env("RJ_STATE_DIR", self.ctx.state_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .map_err(|e| SchedulerError::Spawn {
                id: id.clone(),
                message: format!("{}: {e}", self.worker_binary.display()),
            })?;

        // The worker claims the pid file itself. Until then the handle
        // answers for it.
        let pid = child.id();
        self.handles.lock().insert(id.clone(), child);
        tracing::info!(job_id = %id, pid, %mode, "worker spawned");
        Ok(pid)
    }

    /// Pid of a live worker for `id`, from the handle or the pid file.
    fn live_pid(&self, id: &JobId) -> Option<u32> {
        {
            let mut handles = self.handles.lock();
            if let Some(child) = handles.get_mut(id) {
                if let Ok(None) = child.try_wait() {
                    return Some(child.id());
                }
            }
        }
        PidRecord::read(&pid_path(&self.ctx.store().job_dir(id)))
            .filter(PidRecord::is_alive)
            .map(|record| record.pid)
    }

    /// Poll until the worker for `id` stops running or `timeout` elapses.
    pub fn wait(&self, id: &JobId, timeout: Duration) -> WorkerStatus {
        let start = Instant::now();
        loop {
            let status = self.status(id);
            if status != WorkerStatus::Running || start.elapsed() >= timeout {
                return status;
            }
            std::thread::sleep(env::poll_interval());
        }
    }

    /// A runner thread drives the job inside a longer-lived process, so it
    /// is stopped through the cancelled record rather than a signal. Waits
    /// for the runner to drop its claim.
    fn await_runner_release(&self, id: &JobId, pid_file: &Path, runner: PidRecord) -> bool {
        let released = pidfile::wait_until(
            self.ctx.terminate_timeout() + Duration::from_secs(1),
            env::poll_interval(),
            || {
                !runner.is_alive()
                    || !PidRecord::read(pid_file).is_some_and(|held| held.same_process(&runner))
            },
        );
        if released {
            tracing::info!(job_id = %id, pid = runner.pid, "in-process run stopped");
        } else {
            tracing::warn!(job_id = %id, pid = runner.pid, "in-process run still holds the job");
        }
        released
    }

    fn require_job(&self, id: &JobId) -> Result<(), SchedulerError> {
        match self.ctx.store().get(id)? {
            Some(_) => Ok(()),
            None => Err(SchedulerError::NotFound(id.clone())),
        }
    }
}

impl JobBackend for ProcessBackend {
    fn submit(&self, owner: &OwnerId, seed: &Value) -> Result<JobId, SchedulerError> {
        let mut job = self.ctx.create_job(owner, seed)?;
        if let Err(e) = self.spawn(&job.id, RunMode::Fresh) {
            job.fail(Stage::Extracting, e.to_string(), SystemClock.epoch_ms());
            self.ctx.store().save(&job)?;
            tracing::error!(job_id = %job.id, error = %e, "worker spawn failed");
            return Err(e);
        }
        Ok(job.id)
    }

    fn resume(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let job = self
            .ctx
            .store()
            .reload(id)?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;
        if !job.needs_work() {
            tracing::info!(job_id = %id, status = %job.status, "nothing to resume");
            return Ok(false);
        }
        if let Some(pid) = self.live_pid(id) {
            tracing::warn!(job_id = %id, pid, "worker already running, not resuming");
            return Ok(false);
        }
        self.spawn(id, RunMode::Resume)?;
        Ok(true)
    }

    fn terminate(&self, id: &JobId) -> Result<bool, SchedulerError> {
        self.require_job(id)?;
        self.ctx.mark_cancelled(id)?;

        let pid_file = pid_path(&self.ctx.store().job_dir(id));
        let mut child = self.handles.lock().remove(id);
        let spawned = match child.as_mut().map(|c| (c.id(), c.try_wait())) {
            Some((pid, Ok(None))) => Some(pid),
            _ => None,
        };
        if spawned.is_none() {
            // Exited already, e.g. busy. Any live holder is someone else.
            child = None;
        }
        let pid = match (spawned, PidRecord::read(&pid_file).filter(PidRecord::is_alive)) {
            (Some(pid), _) => Some(pid),
            (None, Some(runner)) if runner.in_process => {
                return Ok(self.await_runner_release(id, &pid_file, runner));
            }
            (None, holder) => holder.map(|record| record.pid),
        };
        let Some(pid) = pid else {
            pidfile::remove(&pid_file);
            return Ok(false);
        };

        let record = PidRecord::read(&pid_file);
        let stopped = pidfile::terminate(
            pid,
            self.ctx.terminate_timeout(),
            env::poll_interval(),
            || match &mut child {
                Some(child) => !matches!(child.try_wait(), Ok(None)),
                None => !record.is_some_and(|r| r.pid == pid && r.is_alive()),
            },
        );
        if !stopped {
            tracing::error!(job_id = %id, pid, "worker survived SIGKILL");
            return Ok(false);
        }

        pidfile::remove(&pid_file);
        // The worker may have saved between the first mark and its exit.
        self.ctx.mark_cancelled(id)?;
        tracing::info!(job_id = %id, pid, "worker terminated");
        Ok(true)
    }

    fn status(&self, id: &JobId) -> WorkerStatus {
        {
            let mut handles = self.handles.lock();
            if let Some(child) = handles.get_mut(id) {
                match child.try_wait() {
                    Ok(None) => return WorkerStatus::Running,
                    Ok(Some(exit)) => {
                        handles.remove(id);
                        return if exit.success() {
                            WorkerStatus::Completed
                        } else {
                            WorkerStatus::Failed
                        };
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %id, error = %e, "failed to poll worker");
                        handles.remove(id);
                    }
                }
            }
        }
        match PidRecord::read(&pid_path(&self.ctx.store().job_dir(id))) {
            Some(record) if record.is_alive() => WorkerStatus::Running,
            _ => WorkerStatus::NotFound,
        }
    }

    fn logs(&self, id: &JobId, tail: usize) -> Result<Vec<String>, SchedulerError> {
        self.require_job(id)?;
        tail_lines(&self.ctx.log_path(id), tail)
    }
}

/// Find the rjw binary: `RJ_WORKER_BINARY`, then a sibling of the current
/// executable, then `PATH`.
fn find_worker_binary() -> PathBuf {
    if let Some(path) = env::worker_binary() {
        return PathBuf::from(path);
    }
    if let Some(sibling) = std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| dir.join("rjw"))
    {
        if sibling.exists() {
            return sibling;
        }
    }
    PathBuf::from("rjw")
}
