// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry and recovery of failed, cancelled, completed and stuck jobs.
//!
//! A retry is four steps: decide whether the job may be retried
//! (`can_retry`), work out where to resume and which artifacts survive
//! (`prepare`), check that the surviving artifacts are intact (`validate`),
//! then rewrite the record (`execute`). Knowledge-store changes made by a
//! discarded curating stage are reverted with `rollback_side_effects`.
//! Nothing here spawns a worker.

use crate::classify::ErrorClassifier;
use crate::error::RetryError;
use crate::job_logger::JobLogger;
use crate::knowledge::{KnowledgeStore, UpdateLog};
use rj_core::{
    Artifact, Clock, FeedbackStatus, Job, JobId, JobStatus, RetryAttempt, RetryPlan,
    RetryStrategy, SideEffectAction, Stage, StageOutcome,
};
use rj_storage::{ArtifactDir, ArtifactError, TaskStore};
use serde::Serialize;
use std::sync::Arc;

/// Whether a worker is currently executing a job.
pub trait WorkerLiveness: Send + Sync {
    fn is_running(&self, job: &Job) -> bool;
}

/// Liveness source that never reports a running worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWorkers;

impl WorkerLiveness for NoWorkers {
    fn is_running(&self, _job: &Job) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryCheck {
    pub allowed: bool,
    pub reason: String,
    pub resume_stage: Option<Stage>,
}

impl RetryCheck {
    fn allow(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            resume_stage: Some(stage),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            resume_stage: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOptions {
    /// Bypass max-retries, non-retryable errors and the completed check
    pub force: bool,
    /// Restart from the first stage, discarding every artifact
    pub clean: bool,
    /// Resume at this stage instead of the detected one
    pub stage_override: Option<Stage>,
    /// Leave knowledge-store changes of discarded curating runs in place
    pub keep_side_effects: bool,
}

/// Result of a full `retry`.
#[derive(Debug, Clone)]
pub struct RetryReport {
    pub job: Job,
    pub plan: RetryPlan,
    pub corrupted: Vec<Artifact>,
    pub reverted: usize,
}

pub struct RetryEngine<C> {
    store: Arc<TaskStore>,
    classifier: ErrorClassifier,
    liveness: Arc<dyn WorkerLiveness>,
    clock: C,
    logger: Option<JobLogger>,
}

impl<C: Clock> RetryEngine<C> {
    pub fn new(
        store: Arc<TaskStore>,
        classifier: ErrorClassifier,
        liveness: Arc<dyn WorkerLiveness>,
        clock: C,
    ) -> Self {
        Self {
            store,
            classifier,
            liveness,
            clock,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: JobLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    fn log(&self, job: &Job, message: &str) {
        if let Some(logger) = &self.logger {
            logger.append(job.id.as_str(), "retry", message);
        }
    }

    /// Decide whether `job` may be retried and from which stage.
    pub fn can_retry(&self, job: &Job, force: bool) -> RetryCheck {
        match job.status {
            JobStatus::Failed => {
                let stage = job.failed_stage.unwrap_or(Stage::Extracting);
                self.check_failure(job, stage, force, &format!("failed at {stage}"))
            }
            JobStatus::Cancelled => {
                let stage = job.failed_stage.unwrap_or(Stage::Extracting);
                RetryCheck::allow(stage, format!("cancelled at {stage}"))
            }
            JobStatus::Completed => match job.feedback_status {
                Some(FeedbackStatus::Failed) => {
                    let stage = job
                        .failed_stage
                        .filter(|s| s.is_feedback())
                        .unwrap_or(Stage::Evaluating);
                    RetryCheck::allow(stage, format!("post-processing failed at {stage}"))
                }
                Some(status) if !status.is_settled() => {
                    if self.liveness.is_running(job) {
                        return RetryCheck::deny("worker still running");
                    }
                    let stage = status.stage().unwrap_or(Stage::Evaluating);
                    RetryCheck::allow(stage, format!("worker died during {stage}"))
                }
                _ if force => RetryCheck::allow(Stage::Generating, "forced regeneration"),
                _ => RetryCheck::deny("job completed; use force to regenerate"),
            },
            JobStatus::Pending
            | JobStatus::Extracting
            | JobStatus::AwaitingConfirm
            | JobStatus::Retrieving
            | JobStatus::Generating => {
                if self.liveness.is_running(job) {
                    return RetryCheck::deny("worker still running");
                }
                if job.status == JobStatus::AwaitingConfirm && !force {
                    return RetryCheck::deny("job is awaiting confirmation; resume it instead");
                }
                let stage = job.status.stage().unwrap_or(Stage::Extracting);
                self.check_failure(job, stage, force, &format!("worker died during {stage}"))
            }
        }
    }

    fn check_failure(&self, job: &Job, stage: Stage, force: bool, reason: &str) -> RetryCheck {
        if force {
            return RetryCheck::allow(stage, format!("{reason} (forced)"));
        }
        if job.retry_count >= job.max_retries {
            return RetryCheck::deny(format!("max retries ({}) reached", job.max_retries));
        }
        if let Some(pattern) = job
            .last_error
            .as_deref()
            .and_then(|e| self.classifier.non_retryable_match(e))
        {
            return RetryCheck::deny(format!("non-retryable error (matches {pattern})"));
        }
        RetryCheck::allow(stage, reason)
    }

    /// Map the job and options to a resume point with exact keep/delete sets.
    pub fn prepare(&self, job: &Job, options: &RetryOptions) -> Result<RetryPlan, RetryError> {
        let check = self.can_retry(job, options.force);
        let Some(detected) = check.resume_stage.filter(|_| check.allowed) else {
            return Err(RetryError::Denied(check.reason));
        };

        let rollback_eligible =
            !options.keep_side_effects && ArtifactDir::for_job(job).exists(Artifact::UpdateLog);
        let regenerating = job.status == JobStatus::Completed
            && job.feedback_status != Some(FeedbackStatus::Failed)
            && !detected.is_feedback();
        let reset_retry_count = job.status == JobStatus::Cancelled || regenerating;

        if options.clean {
            return Ok(RetryPlan::clean(rollback_eligible, reset_retry_count));
        }

        let stage = match options.stage_override {
            Some(requested) if job.status != JobStatus::Completed && requested > detected => {
                return Err(RetryError::InvalidOverride {
                    requested,
                    reached: detected,
                });
            }
            Some(requested) => requested,
            None => detected,
        };

        let strategy = match job.status {
            JobStatus::Completed if !stage.is_feedback() => RetryStrategy::Regenerate,
            JobStatus::Failed | JobStatus::Cancelled => RetryStrategy::Partial,
            _ if stage == detected => RetryStrategy::Resume,
            _ => RetryStrategy::Partial,
        };
        Ok(RetryPlan::resume_at(
            strategy,
            stage,
            rollback_eligible,
            reset_retry_count,
        ))
    }

    /// Structurally check each kept artifact, returning the ones that cannot
    /// be trusted. Callers move them to the delete set with
    /// `RetryPlan::discard_corrupted`.
    pub fn validate(&self, job: &Job, keep: &[Artifact]) -> Vec<Artifact> {
        let dir = ArtifactDir::for_job(job);
        keep.iter()
            .copied()
            .filter(|artifact| match dir.validate(*artifact) {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, %artifact, error = %e, "kept artifact failed validation");
                    true
                }
            })
            .collect()
    }

    /// Revert the knowledge-store changes recorded in the job's update log.
    /// Returns the number of entries restored; a job without a log has
    /// nothing to revert.
    pub fn rollback_side_effects(&self, job: &Job) -> Result<usize, RetryError> {
        let body = match ArtifactDir::for_job(job).read_body(Artifact::UpdateLog) {
            Ok(body) => body,
            Err(ArtifactError::Missing(_)) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let log: UpdateLog = serde_json::from_value(body).map_err(RetryError::UpdateLog)?;
        let reverted = KnowledgeStore::new(&log.store).rollback(&log)?;
        tracing::info!(job_id = %job.id, store = %log.store.display(), reverted, "rolled back side effects");
        self.log(job, &format!("reverted {reverted} knowledge store change(s)"));
        Ok(reverted)
    }

    /// Delete discarded artifacts and rewrite the record at the resume
    /// point. The caller starts the worker.
    pub fn execute(&self, mut job: Job, plan: &RetryPlan) -> Result<Job, RetryError> {
        let dir = ArtifactDir::for_job(&job);
        for artifact in &plan.delete {
            if dir.remove(*artifact)? {
                tracing::debug!(job_id = %job.id, %artifact, "deleted artifact");
            }
        }

        let now = self.clock.epoch_ms();
        let retry_count = if plan.reset_retry_count {
            0
        } else {
            job.retry_count.saturating_add(1)
        };
        let attempt = RetryAttempt {
            at_ms: now,
            from_status: job.status,
            failed_stage: job.failed_stage.or_else(|| job.current_stage()),
            error: job.last_error.clone(),
            strategy: plan.strategy,
            resume_stage: plan.resume_stage,
            rolled_back: plan.side_effects == SideEffectAction::Rollback,
            retry_count,
        };

        job.finish_stage(StageOutcome::Failed("abandoned for retry".to_string()), now);
        job.retry_history.push(attempt);
        job.retry_count = retry_count;
        job.failed_stage = None;
        job.last_error = None;
        job.feedback_status = plan.resume_feedback;
        job.set_status(plan.resume_status, now);
        self.store.save(&job)?;

        tracing::info!(
            job_id = %job.id,
            strategy = %plan.strategy,
            resume_stage = %plan.resume_stage,
            retry_count,
            "retry prepared"
        );
        self.log(
            &job,
            &format!(
                "{} retry, resuming at {} (attempt {})",
                plan.strategy, plan.resume_stage, retry_count
            ),
        );
        Ok(job)
    }

    /// can_retry → prepare → validate → rollback → execute.
    pub fn retry(&self, id: &JobId, options: &RetryOptions) -> Result<RetryReport, RetryError> {
        let job = self
            .store
            .reload(id)?
            .ok_or_else(|| RetryError::NotFound(id.clone()))?;

        let mut plan = self.prepare(&job, options)?;
        let corrupted = self.validate(&job, &plan.keep);
        plan.discard_corrupted(&corrupted);

        let reverted = match plan.side_effects {
            SideEffectAction::Rollback => self.rollback_side_effects(&job)?,
            SideEffectAction::None => 0,
        };
        let job = self.execute(job, &plan)?;
        Ok(RetryReport {
            job,
            plan,
            corrupted,
            reverted,
        })
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
