// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::guard::read_liveness;
use rj_core::{Config, JobStatus, Stage, StageCommand};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

fn config() -> Config {
    Config {
        idle_timeout_ms: 200,
        heartbeat_ms: 50,
        terminate_timeout_ms: 300,
        ..Config::default()
    }
}

fn sh(script: &str) -> StageCommand {
    StageCommand {
        command: vec!["sh".into(), "-c".into(), script.into()],
        timeout_ms: None,
        env: Default::default(),
    }
}

fn backend(dir: &TempDir, config: Config) -> InProcessBackend {
    InProcessBackend::new(Context::with_config(dir.path(), config).unwrap())
}

fn record(backend: &InProcessBackend, id: &JobId) -> Job {
    backend.context().store().reload(id).unwrap().unwrap()
}

#[test]
#[serial]
fn submit_suspends_then_resume_completes() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir, config());

    let id = backend.submit(&OwnerId::new("o"), &json!({"q": 1})).unwrap();
    assert_eq!(backend.wait(&id, WAIT), WorkerStatus::Completed);
    assert_eq!(record(&backend, &id).status, JobStatus::AwaitingConfirm);

    assert!(backend.resume(&id).unwrap());
    assert_eq!(backend.wait(&id, WAIT), WorkerStatus::Completed);
    assert_eq!(record(&backend, &id).status, JobStatus::Completed);

    // Nothing left to do.
    assert!(!backend.resume(&id).unwrap());
    backend.shutdown();
}

#[test]
#[serial]
fn failing_stage_reports_failed() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("echo nope >&2; exit 2"));
    let backend = backend(&dir, config);

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    assert_eq!(backend.wait(&id, WAIT), WorkerStatus::Failed);
    let job = record(&backend, &id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage, Some(Stage::Extracting));
    backend.shutdown();
}

#[test]
#[serial]
fn second_runner_is_not_owner() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("exec sleep 2"));
    let first = backend(&dir, config.clone());
    let second = backend(&dir, config);

    let id = first.submit(&OwnerId::new("o"), &json!({})).unwrap();
    let err = second.submit(&OwnerId::new("o"), &json!({})).unwrap_err();
    assert!(matches!(err, SchedulerError::NotOwner(_)), "{err}");
    assert_eq!(first.context().store().list().unwrap().len(), 1);

    first.terminate(&id).unwrap();
    first.shutdown();
}

#[test]
#[serial]
fn idle_runner_releases_guard_and_restarts() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir, config());
    let lock = guard_path(dir.path());

    let first = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    assert!(read_liveness(&lock).is_some());
    backend.wait(&first, WAIT);
    backend.wait_idle();
    assert!(read_liveness(&lock).is_none());

    let second = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    assert_eq!(backend.wait(&second, WAIT), WorkerStatus::Completed);
    backend.shutdown();
}

#[test]
#[serial]
fn terminate_cancels_running_job() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("exec sleep 30"));
    let backend = backend(&dir, config);

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    let start = Instant::now();
    while record(&backend, &id).status != JobStatus::Extracting {
        assert!(start.elapsed() < WAIT, "job never started");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(backend.is_running(&record(&backend, &id)));

    assert!(backend.terminate(&id).unwrap());
    assert!(start.elapsed() < Duration::from_secs(5));
    let job = record(&backend, &id);
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.failed_stage, Some(Stage::Extracting));
    assert!(!backend.is_running(&job));
    backend.shutdown();
}

#[test]
#[serial]
fn terminate_without_worker_still_cancels() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir, config());

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    backend.wait(&id, WAIT);
    assert_eq!(record(&backend, &id).status, JobStatus::AwaitingConfirm);

    assert!(!backend.terminate(&id).unwrap());
    assert_eq!(record(&backend, &id).status, JobStatus::Cancelled);
    backend.shutdown();
}

#[test]
#[serial]
fn shutdown_leaves_interrupted_job_resumable() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("exec sleep 30"));
    let backend = backend(&dir, config);

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    let start = Instant::now();
    while record(&backend, &id).status != JobStatus::Extracting {
        assert!(start.elapsed() < WAIT, "job never started");
        std::thread::sleep(Duration::from_millis(20));
    }

    backend.shutdown();
    let job = record(&backend, &id);
    assert_eq!(job.status, JobStatus::Extracting);
    assert!(job.needs_work());
}

fn wait_for_extracting(backend: &InProcessBackend, id: &JobId) {
    let start = Instant::now();
    while record(backend, id).status != JobStatus::Extracting {
        assert!(start.elapsed() < WAIT, "job never started");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
#[serial]
fn running_job_holds_pid_claim() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("exec sleep 30"));
    let backend = backend(&dir, config);

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    wait_for_extracting(&backend, &id);
    let job = record(&backend, &id);
    let held = PidRecord::read(&pid_path(&job.dir)).unwrap();
    assert!(held.in_process);
    assert!(held.same_process(&PidRecord::current()));
    assert!(crate::PidLiveness.is_running(&job));

    assert!(backend.terminate(&id).unwrap());
    assert!(!pid_path(&job.dir).exists());
    assert!(!crate::PidLiveness.is_running(&job));
    backend.shutdown();
}

#[test]
#[serial]
fn cancellation_from_another_scheduler_stops_run() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.stages.insert("extracting".into(), sh("exec sleep 30"));
    let backend = backend(&dir, config);

    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    wait_for_extracting(&backend, &id);

    // Another scheduler only has the job record and the pid file.
    let start = Instant::now();
    let other = crate::ProcessBackend::with_worker_binary(backend.context().clone(), "rjw");
    assert!(other.terminate(&id).unwrap());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!pid_path(&record(&backend, &id).dir).exists());
    assert_ne!(backend.wait(&id, WAIT), WorkerStatus::Running);
    assert_eq!(record(&backend, &id).status, JobStatus::Cancelled);
    backend.shutdown();
}

#[test]
#[serial]
fn job_claimed_by_another_process_is_not_resumed() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir, config());
    let id = backend.submit(&OwnerId::new("o"), &json!({})).unwrap();
    backend.wait(&id, WAIT);
    let job = record(&backend, &id);
    assert_eq!(job.status, JobStatus::AwaitingConfirm);

    let mut holder = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap();
    PidRecord::for_pid(holder.id())
        .write(&pid_path(&job.dir))
        .unwrap();
    assert!(!backend.resume(&id).unwrap());
    assert_eq!(record(&backend, &id).status, JobStatus::AwaitingConfirm);

    holder.kill().unwrap();
    holder.wait().unwrap();
    assert!(backend.resume(&id).unwrap());
    assert_eq!(backend.wait(&id, WAIT), WorkerStatus::Completed);
    assert_eq!(record(&backend, &id).status, JobStatus::Completed);
    backend.shutdown();
}

#[test]
fn unknown_job() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir, config());
    let id = JobId::new("missing");
    assert_eq!(backend.status(&id), WorkerStatus::NotFound);
    assert!(matches!(
        backend.resume(&id),
        Err(SchedulerError::NotFound(_))
    ));
    assert!(matches!(
        backend.logs(&id, 5),
        Err(SchedulerError::NotFound(_))
    ));
}
