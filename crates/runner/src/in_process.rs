// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process backend: a single background thread draining a local queue.
//!
//! The drain thread owns the single-instance guard for as long as it runs.
//! It heartbeats the guard while waiting and while driving, and exits after
//! `idle_timeout_ms` without work, releasing the guard. A later submission
//! re-acquires it and starts a fresh thread.
//!
//! The idle exit and `submit` race on the queue: the thread re-checks the
//! channel and clears the sender while holding the state lock, so a submit
//! either lands in the old thread's queue or starts a new thread.

use crate::backend::{tail_lines, JobBackend, WorkerStatus};
use crate::context::Context;
use crate::env;
use crate::error::SchedulerError;
use crate::guard::InstanceGuard;
use crate::pidfile::{Claim, PidRecord};
use parking_lot::{Condvar, Mutex};
use rj_core::{Job, JobId, JobStatus, OwnerId};
use rj_engine::log_paths::{guard_path, pid_path};
use rj_engine::{CancelToken, DriverOutcome, RunMode, WorkerLiveness};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

struct Task {
    id: JobId,
    mode: RunMode,
}

#[derive(Default)]
struct State {
    tx: Option<Sender<Task>>,
    thread: Option<JoinHandle<()>>,
    running: HashMap<JobId, CancelToken>,
    queued: HashSet<JobId>,
    finished: HashMap<JobId, WorkerStatus>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

#[derive(Clone)]
pub struct InProcessBackend {
    ctx: Context,
    shared: Arc<Shared>,
}

impl InProcessBackend {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Start the drain thread unless it is already running.
    fn ensure_drain(&self, state: &mut State) -> Result<(), SchedulerError> {
        if state.tx.is_some() {
            return Ok(());
        }
        let path = guard_path(self.ctx.state_dir());
        let guard = InstanceGuard::acquire(&path)?
            .ok_or_else(|| SchedulerError::NotOwner(path.clone()))?;

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let ctx = self.ctx.clone();
        let handle = std::thread::Builder::new()
            .name("rj-runner".to_string())
            .spawn(move || drain(shared, ctx, guard, rx))
            .map_err(|e| SchedulerError::io(&path, e))?;
        state.tx = Some(tx);
        state.thread = Some(handle);
        tracing::info!("runner thread started");
        Ok(())
    }

    fn enqueue(&self, state: &mut State, id: JobId, mode: RunMode) -> Result<(), SchedulerError> {
        self.ensure_drain(state)?;
        state.queued.insert(id.clone());
        state.finished.remove(&id);
        let sent = match &state.tx {
            Some(tx) => tx.send(Task { id: id.clone(), mode }).is_ok(),
            None => false,
        };
        if !sent {
            state.tx = None;
            state.queued.remove(&id);
            return Err(SchedulerError::Spawn {
                id,
                message: "runner thread exited".to_string(),
            });
        }
        tracing::debug!(job_id = %id, %mode, "job queued");
        Ok(())
    }

    /// Block until the job is neither queued nor running, or `timeout`
    /// elapses. `Duration::MAX` waits without limit.
    pub fn wait(&self, id: &JobId, timeout: Duration) -> WorkerStatus {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.queued.contains(id) || state.running.contains_key(id) {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .changed
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.shared.changed.wait(&mut state),
            }
        }
        status_of(&state, id)
    }

    /// Wait for the drain thread to go idle and exit.
    pub fn wait_idle(&self) {
        let handle = self.shared.state.lock().thread.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("runner thread panicked");
            }
        }
    }

    /// Stop accepting work, interrupt running jobs, and wait for the drain
    /// thread. Interrupted jobs keep their last persisted stage and can be
    /// resumed.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            for token in state.running.values() {
                token.cancel();
            }
            state.queued.clear();
            state.tx = None;
        }
        self.wait_idle();
    }
}

fn status_of(state: &State, id: &JobId) -> WorkerStatus {
    if state.running.contains_key(id) || state.queued.contains(id) {
        return WorkerStatus::Running;
    }
    state
        .finished
        .get(id)
        .copied()
        .unwrap_or(WorkerStatus::NotFound)
}

impl JobBackend for InProcessBackend {
    fn submit(&self, owner: &OwnerId, seed: &Value) -> Result<JobId, SchedulerError> {
        let mut state = self.shared.state.lock();
        // Take the guard before creating anything, so a refused submit
        // leaves no job behind.
        self.ensure_drain(&mut state)?;
        let job = self.ctx.create_job(owner, seed)?;
        self.enqueue(&mut state, job.id.clone(), RunMode::Fresh)?;
        Ok(job.id)
    }

    fn resume(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let job = self
            .ctx
            .store()
            .reload(id)?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;
        if !job.needs_work() {
            return Ok(false);
        }
        if let Some(other) = PidRecord::read(&pid_path(&job.dir)).filter(PidRecord::is_alive) {
            // Our own claim means the job is queued or running here.
            if !other.same_process(&PidRecord::current()) {
                tracing::warn!(job_id = %id, pid = other.pid, "job driven elsewhere, not resuming");
                return Ok(false);
            }
        }
        let mut state = self.shared.state.lock();
        if state.queued.contains(id) || state.running.contains_key(id) {
            tracing::warn!(job_id = %id, "job already queued or running, not resuming");
            return Ok(false);
        }
        self.enqueue(&mut state, id.clone(), RunMode::Resume)?;
        Ok(true)
    }

    fn terminate(&self, id: &JobId) -> Result<bool, SchedulerError> {
        self.ctx.mark_cancelled(id)?;
        let token = {
            let mut state = self.shared.state.lock();
            if state.queued.remove(id) {
                self.shared.changed.notify_all();
                return Ok(true);
            }
            state.running.get(id).cloned()
        };
        let Some(token) = token else {
            return Ok(false);
        };
        token.cancel();

        // The drain loop aborts a stage that outlives the grace period.
        let deadline = Instant::now() + self.ctx.terminate_timeout() + Duration::from_secs(1);
        let mut state = self.shared.state.lock();
        while state.running.contains_key(id) {
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        Ok(!state.running.contains_key(id))
    }

    fn status(&self, id: &JobId) -> WorkerStatus {
        status_of(&self.shared.state.lock(), id)
    }

    fn logs(&self, id: &JobId, tail: usize) -> Result<Vec<String>, SchedulerError> {
        if self.ctx.store().get(id)?.is_none() {
            return Err(SchedulerError::NotFound(id.clone()));
        }
        tail_lines(&self.ctx.log_path(id), tail)
    }
}

impl WorkerLiveness for InProcessBackend {
    fn is_running(&self, job: &Job) -> bool {
        self.status(&job.id) == WorkerStatus::Running
    }
}

/// Release the guard and clear the sender. Callers hold the state lock.
fn release(shared: &Shared, state: &mut State, guard: InstanceGuard) {
    drop(guard);
    state.tx = None;
    shared.changed.notify_all();
}

fn drain(shared: Arc<Shared>, ctx: Context, mut guard: InstanceGuard, rx: Receiver<Task>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runner runtime");
            let mut state = shared.state.lock();
            // Queued jobs stay PENDING on disk and can be resumed.
            state.queued.clear();
            release(&shared, &mut state, guard);
            return;
        }
    };

    let idle = ctx.config().idle_timeout();
    let tick = ctx
        .config()
        .heartbeat_interval()
        .min(idle)
        .max(Duration::from_millis(1));
    let mut last_work = Instant::now();

    loop {
        let task = match rx.recv_timeout(tick) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = guard.heartbeat() {
                    tracing::warn!(error = %e, "guard heartbeat failed");
                }
                if last_work.elapsed() < idle {
                    continue;
                }
                let mut state = shared.state.lock();
                match rx.try_recv() {
                    Ok(task) => task,
                    Err(_) => {
                        tracing::info!(idle_ms = idle.as_millis() as u64, "runner idle, exiting");
                        release(&shared, &mut state, guard);
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("runner shut down");
                let mut state = shared.state.lock();
                release(&shared, &mut state, guard);
                return;
            }
        };
        run_task(&shared, &ctx, &mut guard, &runtime, task);
        last_work = Instant::now();
    }
}

fn run_task(
    shared: &Shared,
    ctx: &Context,
    guard: &mut InstanceGuard,
    runtime: &Runtime,
    task: Task,
) {
    let cancel = CancelToken::new();
    {
        let mut state = shared.state.lock();
        // Terminated while still queued.
        if !state.queued.remove(&task.id) {
            return;
        }
        state.running.insert(task.id.clone(), cancel.clone());
    }

    // Same claim a worker process takes, so other schedulers see this run.
    let pid_file = pid_path(&ctx.store().job_dir(&task.id));
    let me = PidRecord::current_runner();
    let claimed = match me.claim(&pid_file) {
        Ok(Claim::Acquired) => Ok(()),
        Ok(Claim::Busy(other)) => Err(format!("job is driven by pid {}", other.pid)),
        Err(e) => Err(format!("failed to claim pid file: {e}")),
    };
    if let Err(reason) = claimed {
        tracing::warn!(job_id = %task.id, %reason, "not running job");
        let mut state = shared.state.lock();
        state.running.remove(&task.id);
        state.finished.insert(task.id, WorkerStatus::Failed);
        shared.changed.notify_all();
        return;
    }

    let heartbeat = ctx.config().heartbeat_interval();
    let grace = ctx.terminate_timeout();
    let result = runtime.block_on(async {
        let drive = ctx.drive(&task.id, task.mode, cancel.clone());
        tokio::pin!(drive);
        let mut poll = tokio::time::interval(env::poll_interval());
        let mut last_beat = Instant::now();
        let mut cancelled_at: Option<Instant> = None;
        loop {
            tokio::select! {
                result = &mut drive => return result,
                _ = poll.tick() => {
                    if last_beat.elapsed() >= heartbeat {
                        if let Err(e) = guard.heartbeat() {
                            tracing::warn!(error = %e, "guard heartbeat failed");
                        }
                        last_beat = Instant::now();
                    }
                    if !cancel.is_cancelled() && cancelled_elsewhere(ctx, &task.id) {
                        tracing::info!(job_id = %task.id, "job cancelled by another process");
                        cancel.cancel();
                    }
                    if cancel.is_cancelled() {
                        let at = *cancelled_at.get_or_insert_with(Instant::now);
                        if at.elapsed() >= grace {
                            // Dropping the driver kills the stage command.
                            tracing::warn!(job_id = %task.id, "stage ignored cancellation, aborting it");
                            return Ok(DriverOutcome::Cancelled);
                        }
                    }
                }
            }
        }
    });

    let status = match &result {
        Ok(outcome) => {
            tracing::info!(job_id = %task.id, ?outcome, "job run finished");
            if outcome.exit_code() == 0 {
                WorkerStatus::Completed
            } else {
                WorkerStatus::Failed
            }
        }
        Err(e) => {
            tracing::error!(job_id = %task.id, error = %e, "job run failed");
            ctx.logger()
                .append(task.id.as_str(), "job", &format!("worker error: {e}"));
            WorkerStatus::Failed
        }
    };

    me.release(&pid_file);
    let mut state = shared.state.lock();
    state.running.remove(&task.id);
    state.finished.insert(task.id, status);
    shared.changed.notify_all();
}

fn cancelled_elsewhere(ctx: &Context, id: &JobId) -> bool {
    matches!(ctx.store().reload(id), Ok(Some(job)) if job.status == JobStatus::Cancelled)
}

#[cfg(test)]
#[path = "in_process_tests.rs"]
mod tests;
