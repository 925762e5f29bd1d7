// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::FakeClock;

fn test_job(clock: &FakeClock) -> Job {
    let config = JobConfig::builder("job-1", "session-a")
        .dir("/state/jobs/job-1")
        .max_retries(2)
        .metadata("topic", "rust")
        .build();
    Job::new(config, clock)
}

#[test]
fn job_creation() {
    let clock = FakeClock::new();
    let job = test_job(&clock);

    assert_eq!(job.id, "job-1");
    assert_eq!(job.owner, "session-a");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.created_at_ms, clock.epoch_ms());
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 2);
    assert_eq!(job.metadata.get("topic").map(String::as_str), Some("rust"));
    assert!(job.failed_stage.is_none());
    assert!(job.feedback_status.is_none());
    assert!(job.needs_work());
}

#[yare::parameterized(
    pending          = { JobStatus::Pending,         false },
    extracting       = { JobStatus::Extracting,      false },
    awaiting_confirm = { JobStatus::AwaitingConfirm, false },
    retrieving       = { JobStatus::Retrieving,      false },
    generating       = { JobStatus::Generating,      false },
    completed        = { JobStatus::Completed,       true },
    failed           = { JobStatus::Failed,          true },
    cancelled        = { JobStatus::Cancelled,       true },
)]
fn status_terminality(status: JobStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn status_serializes_screaming_snake_case() {
    let json = serde_json::to_string(&JobStatus::AwaitingConfirm).unwrap();
    assert_eq!(json, "\"AWAITING_CONFIRM\"");
    assert_eq!(JobStatus::AwaitingConfirm.to_string(), "AWAITING_CONFIRM");
}

#[test]
fn completed_job_with_open_feedback_needs_work() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.set_status(JobStatus::Completed, clock.epoch_ms());
    assert!(!job.needs_work());

    job.set_feedback_status(FeedbackStatus::Reflecting, clock.epoch_ms());
    assert!(job.needs_work());
    assert_eq!(job.current_stage(), Some(Stage::Reflecting));

    job.set_feedback_status(FeedbackStatus::Completed, clock.epoch_ms());
    assert!(!job.needs_work());
}

#[test]
fn enter_stage_closes_interrupted_entry() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);

    job.enter_stage(Stage::Extracting, 10);
    job.enter_stage(Stage::Extracting, 20);

    assert_eq!(job.stage_history.len(), 2);
    assert_eq!(
        job.stage_history[0].outcome,
        StageOutcome::Failed("interrupted".to_string())
    );
    assert_eq!(job.stage_history[0].finished_at_ms, Some(20));
    assert_eq!(job.stage_history[1].outcome, StageOutcome::Running);
}

#[test]
fn fail_records_stage_and_message() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.set_status(JobStatus::Retrieving, 5);
    job.enter_stage(Stage::Retrieving, 5);

    job.fail(Stage::Retrieving, "index offline", 9);

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage, Some(Stage::Retrieving));
    assert_eq!(job.last_error.as_deref(), Some("index offline"));
    assert_eq!(
        job.stage_history[0].outcome,
        StageOutcome::Failed("index offline".to_string())
    );
    assert_eq!(job.updated_at_ms, 9);
}

#[test]
fn fail_feedback_keeps_main_status() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.set_status(JobStatus::Completed, 1);
    job.set_feedback_status(FeedbackStatus::Curating, 2);

    job.fail_feedback(Stage::Curating, "store locked", 3);

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.feedback_status, Some(FeedbackStatus::Failed));
    assert_eq!(job.failed_stage, Some(Stage::Curating));
}

#[test]
fn cancel_remembers_interrupted_stage() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.set_status(JobStatus::Generating, 1);
    job.enter_stage(Stage::Generating, 1);

    job.cancel(2);

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.failed_stage, Some(Stage::Generating));
    assert!(!job.needs_work());
}

#[test]
fn record_round_trips_field_for_field() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.set_status(JobStatus::Generating, 1);
    job.enter_stage(Stage::Generating, 1);
    job.fail(Stage::Generating, "model timeout", 2);
    job.retry_history.push(RetryAttempt {
        at_ms: 3,
        from_status: JobStatus::Failed,
        failed_stage: Some(Stage::Generating),
        error: Some("model timeout".to_string()),
        strategy: RetryStrategy::Partial,
        resume_stage: Stage::Generating,
        rolled_back: false,
        retry_count: 1,
    });

    let json = serde_json::to_string_pretty(&job).unwrap();
    let parsed: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, job);
}
