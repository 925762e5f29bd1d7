// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn state_layout() {
    let state = Path::new("/state");
    assert_eq!(jobs_dir(state), PathBuf::from("/state/jobs"));
    assert_eq!(logs_dir(state), PathBuf::from("/state/logs"));
    assert_eq!(guard_path(state), PathBuf::from("/state/runner.lock"));
    assert_eq!(config_path(state), PathBuf::from("/state/rj.toml"));
}

#[test]
fn job_log_path_builds_expected_path() {
    let result = job_log_path(Path::new("/state/logs"), "job-001");
    assert_eq!(result, PathBuf::from("/state/logs/job/job-001.log"));
}

#[test]
fn runner_log_path_builds_expected_path() {
    let result = runner_log_path(Path::new("/state/logs"));
    assert_eq!(result, PathBuf::from("/state/logs/runner.log"));
}

#[test]
fn job_dir_files() {
    let dir = Path::new("/state/jobs/job-001");
    assert_eq!(pid_path(dir), PathBuf::from("/state/jobs/job-001/worker.pid"));
    assert_eq!(
        config_snapshot_path(dir),
        PathBuf::from("/state/jobs/job-001/config.json")
    );
}
