// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests driving the real `rjw` binary through the process
//! backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rj_core::{Job, JobId, JobStatus, OwnerId, Stage, SystemClock};
use rj_engine::log_paths::pid_path;
use rj_engine::{ErrorClassifier, RetryEngine};
use rj_runner::{Context, JobBackend, PidLiveness, PidRecord, ProcessBackend, WorkerStatus};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(20);

struct Harness {
    _dir: TempDir,
    backend: ProcessBackend,
}

impl Harness {
    /// State dir with `rj.toml` set to `config` plus short timeouts.
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rj.toml"),
            format!("terminate_timeout_ms = 500\n{config}"),
        )
        .unwrap();
        let ctx = Context::open(dir.path()).unwrap();
        let backend = ProcessBackend::with_worker_binary(ctx, env!("CARGO_BIN_EXE_rjw"));
        Self { _dir: dir, backend }
    }

    fn ctx(&self) -> &Context {
        self.backend.context()
    }

    fn job(&self, id: &JobId) -> Job {
        self.ctx().store().reload(id).unwrap().unwrap()
    }

    fn submit(&self) -> JobId {
        self.backend
            .submit(&OwnerId::new("tester"), &json!({"topic": "relay"}))
            .unwrap()
    }

    fn wait_for_status(&self, id: &JobId, status: JobStatus) {
        let start = Instant::now();
        loop {
            let job = self.job(id);
            if job.status == status {
                return;
            }
            assert!(
                start.elapsed() < WAIT,
                "job stuck at {} waiting for {}",
                job.status,
                status
            );
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

const SLOW_EXTRACT: &str = "[stages.extracting]\ncommand = [\"sh\", \"-c\", \"exec sleep 30\"]\n";

#[test]
#[serial]
fn submit_suspends_then_resume_completes() {
    let h = Harness::new("");
    let id = h.submit();

    assert_eq!(h.backend.wait(&id, WAIT), WorkerStatus::Completed);
    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::AwaitingConfirm);

    assert!(h.backend.resume(&id).unwrap());
    assert_eq!(h.backend.wait(&id, WAIT), WorkerStatus::Completed);
    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::Completed);
    for artifact in ["request.json", "context.json", "output.json"] {
        assert!(job.dir.join(artifact).exists(), "missing {artifact}");
    }
}

#[test]
#[serial]
fn stage_commands_receive_stage_input() {
    let h = Harness::new(
        "auto_confirm = true\n\
         [stages.extracting]\n\
         command = [\"sh\", \"-c\", \"cat > input.json; echo '{\\\"title\\\": \\\"from-shell\\\"}'\"]\n",
    );
    let id = h.submit();
    assert_eq!(h.backend.wait(&id, WAIT), WorkerStatus::Completed);

    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::Completed);
    let input: serde_json::Value =
        serde_json::from_slice(&std::fs::read(job.dir.join("input.json")).unwrap()).unwrap();
    assert_eq!(input["seed"]["topic"], "relay");
    assert_eq!(input["stage"], "extracting");
}

#[test]
#[serial]
fn failing_stage_marks_job_failed() {
    let h = Harness::new(
        "[stages.extracting]\ncommand = [\"sh\", \"-c\", \"echo bad seed >&2; exit 4\"]\n",
    );
    let id = h.submit();

    assert_eq!(h.backend.wait(&id, WAIT), WorkerStatus::Failed);
    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage, Some(Stage::Extracting));
    assert!(job.last_error.unwrap().contains("bad seed"));
}

#[test]
#[serial]
fn killed_worker_is_retryable_from_reached_stage() {
    let h = Harness::new(SLOW_EXTRACT);
    let id = h.submit();
    h.wait_for_status(&id, JobStatus::Extracting);

    let record = PidRecord::read(&pid_path(&h.job(&id).dir)).unwrap();
    let killed = std::process::Command::new("kill")
        .args(["-9", "--", &format!("-{}", record.pid)])
        .status()
        .unwrap();
    assert!(killed.success());

    assert_ne!(h.backend.wait(&id, WAIT), WorkerStatus::Running);
    // A fresh scheduler only has the pid file to go on.
    let fresh = ProcessBackend::with_worker_binary(h.ctx().clone(), env!("CARGO_BIN_EXE_rjw"));
    assert_eq!(fresh.status(&id), WorkerStatus::NotFound);

    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::Extracting);
    let engine = RetryEngine::new(
        Arc::clone(h.ctx().store()),
        ErrorClassifier::default(),
        Arc::new(PidLiveness),
        SystemClock,
    );
    let check = engine.can_retry(&job, false);
    assert!(check.allowed, "{}", check.reason);
    assert_eq!(check.resume_stage, Some(Stage::Extracting));
}

#[test]
#[serial]
fn terminate_cancels_and_records_stage() {
    let h = Harness::new(SLOW_EXTRACT);
    let id = h.submit();
    h.wait_for_status(&id, JobStatus::Extracting);
    assert_eq!(h.backend.status(&id), WorkerStatus::Running);

    assert!(h.backend.terminate(&id).unwrap());
    let job = h.job(&id);
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.failed_stage, Some(Stage::Extracting));
    assert!(!pid_path(&job.dir).exists());
    assert_ne!(h.backend.status(&id), WorkerStatus::Running);

    // Nothing left to stop.
    assert!(!h.backend.terminate(&id).unwrap());
}

#[test]
#[serial]
fn resume_refused_while_worker_alive() {
    let h = Harness::new(SLOW_EXTRACT);
    let id = h.submit();
    h.wait_for_status(&id, JobStatus::Extracting);

    assert!(!h.backend.resume(&id).unwrap());
    let fresh = ProcessBackend::with_worker_binary(h.ctx().clone(), env!("CARGO_BIN_EXE_rjw"));
    assert!(!fresh.resume(&id).unwrap());

    h.backend.terminate(&id).unwrap();
}

#[test]
#[serial]
fn second_worker_for_same_job_exits_busy() {
    let h = Harness::new(SLOW_EXTRACT);
    let id = h.submit();
    h.wait_for_status(&id, JobStatus::Extracting);

    let status = std::process::Command::new(env!("CARGO_BIN_EXE_rjw"))
        .arg(id.as_str())
        .arg("--resume")
        .env("RJ_STATE_DIR", h.ctx().state_dir())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));

    h.backend.terminate(&id).unwrap();
}

fn start_worker(h: &Harness, id: &JobId) -> std::process::Child {
    std::process::Command::new(env!("CARGO_BIN_EXE_rjw"))
        .arg(id.as_str())
        .env("RJ_STATE_DIR", h.ctx().state_dir())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap()
}

#[test]
#[serial]
fn workers_started_together_run_job_once() {
    let h = Harness::new(SLOW_EXTRACT);
    let job = h
        .ctx()
        .create_job(&OwnerId::new("tester"), &json!({"topic": "relay"}))
        .unwrap();

    let mut workers = [start_worker(&h, &job.id), start_worker(&h, &job.id)];

    // One worker loses the claim and exits busy; the other keeps driving.
    let start = Instant::now();
    let (loser, code) = loop {
        let exited = workers
            .iter_mut()
            .enumerate()
            .find_map(|(i, w)| w.try_wait().unwrap().map(|status| (i, status.code())));
        if let Some(exited) = exited {
            break exited;
        }
        assert!(start.elapsed() < WAIT, "neither worker exited");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(code, Some(3));
    let winner = 1 - loser;
    assert!(workers[winner].try_wait().unwrap().is_none());

    let held = PidRecord::read(&pid_path(&job.dir)).unwrap();
    assert_eq!(held.pid, workers[winner].id());
    // The loser has exited, so only the winner can still log a start.
    let log = loop {
        let log = std::fs::read_to_string(h.ctx().log_path(&job.id)).unwrap_or_default();
        if log.contains("[extracting] started") {
            break log;
        }
        assert!(start.elapsed() < WAIT, "extracting never started");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(log.matches("[extracting] started").count(), 1, "{log}");
    assert_eq!(log.matches("worker started").count(), 1, "{log}");

    assert!(h.backend.terminate(&job.id).unwrap());
    workers[winner].wait().unwrap();
    assert_eq!(h.job(&job.id).status, JobStatus::Cancelled);
}

#[test]
#[serial]
fn concurrent_submissions_get_distinct_jobs() {
    let h = Arc::new(Harness::new(""));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || h.submit())
        })
        .collect();
    let ids: Vec<JobId> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    let mut unique = ids.clone();
    unique.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    for id in &ids {
        assert_eq!(h.backend.wait(id, WAIT), WorkerStatus::Completed);
        let job = h.job(id);
        assert_eq!(job.status, JobStatus::AwaitingConfirm);
        let pid = PidRecord::read(&pid_path(&job.dir)).unwrap();
        assert!(!pid.is_alive());
    }
    assert_eq!(h.ctx().store().list().unwrap().len(), ids.len());
}

#[test]
#[serial]
fn logs_tail_includes_worker_output() {
    let h = Harness::new("");
    let id = h.submit();
    h.backend.wait(&id, WAIT);

    let all = h.backend.logs(&id, 1000).unwrap();
    assert!(all.iter().any(|l| l.starts_with("--- rjw: starting")));
    assert!(all.iter().any(|l| l.contains("[job] submitted by tester")));

    let tail = h.backend.logs(&id, 2).unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[..], all[all.len() - 2..]);
}

#[test]
#[serial]
fn missing_worker_binary_fails_submit() {
    let dir = TempDir::new().unwrap();
    let ctx = Context::open(dir.path()).unwrap();
    let backend = ProcessBackend::with_worker_binary(ctx, dir.path().join("no-such-rjw"));

    let err = backend.submit(&OwnerId::new("o"), &json!({})).unwrap_err();
    assert!(matches!(err, rj_runner::SchedulerError::Spawn { .. }), "{err}");

    let jobs = backend.context().store().list().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
}
