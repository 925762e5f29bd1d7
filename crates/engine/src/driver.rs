// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage driver: advances one job through its stages.
//!
//! The driver dispatches on the persisted status through two tables, one for
//! the main pipeline and one for the post-processing sub-pipeline. The
//! record is saved before each stage starts and again when it finishes, so a
//! crashed worker always leaves the job at the last stage it entered. Every
//! save first re-reads the record; a job cancelled by another party is never
//! overwritten.

use crate::error::DriverError;
use crate::job_logger::JobLogger;
use crate::knowledge::{parse_mutations, KnowledgeStore, UpdateLog};
use rj_adapters::{StageInput, StageServices};
use rj_core::{
    Artifact, Clock, Config, FeedbackStatus, Job, JobId, JobStatus, Stage, StageOutcome,
};
use rj_storage::{ArtifactDir, TaskStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub auto_confirm: bool,
    pub feedback: bool,
    pub knowledge_store: PathBuf,
}

impl DriverConfig {
    pub fn from_config(config: &Config, state_dir: &Path) -> Self {
        Self {
            auto_confirm: config.auto_confirm,
            feedback: config.feedback.enabled,
            knowledge_store: config.knowledge_store_path(state_dir),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// First run after submit
    Fresh,
    /// Any later run; at `AWAITING_CONFIRM` this is the confirmation
    Resume,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Fresh => "fresh",
            RunMode::Resume => "resume",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Stopped at `AWAITING_CONFIRM`
    Suspended,
    Completed,
    Failed { stage: Stage, error: String },
    /// Main pipeline completed, post-processing failed
    FeedbackFailed { stage: Stage, error: String },
    Cancelled,
}

impl DriverOutcome {
    /// Exit status of a worker process ending with this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverOutcome::Failed { .. } | DriverOutcome::FeedbackFailed { .. } => 1,
            DriverOutcome::Suspended | DriverOutcome::Completed | DriverOutcome::Cancelled => 0,
        }
    }
}

/// Cooperative cancellation flag checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance(JobStatus),
    Run { stage: Stage, next: JobStatus },
    Confirm,
    Feedback,
    Stop,
}

/// Main pipeline handlers, indexed by `JobStatus as usize`.
const PIPELINE: [Step; 8] = [
    // PENDING
    Step::Advance(JobStatus::Extracting),
    // EXTRACTING
    Step::Run {
        stage: Stage::Extracting,
        next: JobStatus::AwaitingConfirm,
    },
    // AWAITING_CONFIRM
    Step::Confirm,
    // RETRIEVING
    Step::Run {
        stage: Stage::Retrieving,
        next: JobStatus::Generating,
    },
    // GENERATING
    Step::Run {
        stage: Stage::Generating,
        next: JobStatus::Completed,
    },
    // COMPLETED
    Step::Feedback,
    // FAILED
    Step::Stop,
    // CANCELLED
    Step::Stop,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackStep {
    Advance(FeedbackStatus),
    Run { stage: Stage, next: FeedbackStatus },
    Stop,
}

/// Post-processing handlers, indexed by `FeedbackStatus as usize`.
const FEEDBACK: [FeedbackStep; 6] = [
    FeedbackStep::Advance(FeedbackStatus::Evaluating),
    FeedbackStep::Run {
        stage: Stage::Evaluating,
        next: FeedbackStatus::Reflecting,
    },
    FeedbackStep::Run {
        stage: Stage::Reflecting,
        next: FeedbackStatus::Curating,
    },
    FeedbackStep::Run {
        stage: Stage::Curating,
        next: FeedbackStatus::Completed,
    },
    FeedbackStep::Stop,
    FeedbackStep::Stop,
];

#[derive(Debug, Clone, Copy)]
enum Next {
    Main(JobStatus),
    Feedback(FeedbackStatus),
}

enum Flow {
    Continue,
    Done(DriverOutcome),
}

pub struct StageDriver<S, C> {
    store: Arc<TaskStore>,
    services: S,
    clock: C,
    config: DriverConfig,
    logger: JobLogger,
    cancel: CancelToken,
}

impl<S: StageServices, C: Clock> StageDriver<S, C> {
    pub fn new(
        store: Arc<TaskStore>,
        services: S,
        clock: C,
        config: DriverConfig,
        logger: JobLogger,
    ) -> Self {
        Self {
            store,
            services,
            clock,
            config,
            logger,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Drive the job until it suspends, settles, or is cancelled.
    pub async fn run(&self, id: &JobId, mode: RunMode) -> Result<DriverOutcome, DriverError> {
        let mut job = self
            .store
            .reload(id)?
            .ok_or_else(|| DriverError::NotFound(id.clone()))?;
        let confirmed = self.config.auto_confirm
            || (mode == RunMode::Resume && job.status == JobStatus::AwaitingConfirm);

        tracing::info!(job_id = %id, status = %job.status, %mode, "driving job");
        self.logger.append(
            id.as_str(),
            "job",
            &format!("worker started ({mode}) at {}", job.status),
        );

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(job_id = %id, "cancellation requested, stopping");
                return Ok(DriverOutcome::Cancelled);
            }

            let flow = match PIPELINE[job.status as usize] {
                Step::Advance(next) => {
                    job.set_status(next, self.now());
                    self.commit(&job)?
                }
                Step::Run { stage, next } => {
                    self.run_stage(&mut job, stage, Next::Main(next)).await?
                }
                Step::Confirm if confirmed => {
                    self.logger
                        .append(id.as_str(), Stage::AwaitingConfirm.as_str(), "confirmed");
                    job.set_status(JobStatus::Retrieving, self.now());
                    self.commit(&job)?
                }
                Step::Confirm => {
                    let now = self.now();
                    job.enter_stage(Stage::AwaitingConfirm, now);
                    job.finish_stage(StageOutcome::Suspended, now);
                    match self.commit(&job)? {
                        Flow::Continue => {
                            tracing::info!(job_id = %id, "suspended awaiting confirmation");
                            self.logger.append(
                                id.as_str(),
                                Stage::AwaitingConfirm.as_str(),
                                "suspended, resume to continue",
                            );
                            Flow::Done(DriverOutcome::Suspended)
                        }
                        done => done,
                    }
                }
                Step::Feedback => self.feedback_step(&mut job).await?,
                Step::Stop => Flow::Done(settled(&job)),
            };

            if let Flow::Done(outcome) = flow {
                return Ok(outcome);
            }
        }
    }

    async fn feedback_step(&self, job: &mut Job) -> Result<Flow, DriverError> {
        let Some(status) = job.feedback_status else {
            return Ok(Flow::Done(DriverOutcome::Completed));
        };
        match FEEDBACK[status as usize] {
            FeedbackStep::Advance(next) => {
                job.set_feedback_status(next, self.now());
                self.commit(job)
            }
            FeedbackStep::Run { stage, next } => {
                self.run_stage(job, stage, Next::Feedback(next)).await
            }
            FeedbackStep::Stop => Ok(Flow::Done(settled(job))),
        }
    }

    async fn run_stage(&self, job: &mut Job, stage: Stage, next: Next) -> Result<Flow, DriverError> {
        job.enter_stage(stage, self.now());
        if let Flow::Done(outcome) = self.commit(job)? {
            return Ok(Flow::Done(outcome));
        }
        self.logger.append(job.id.as_str(), stage.as_str(), "started");

        match self.perform(job, stage).await {
            Ok(artifact) => {
                let now = self.now();
                job.finish_stage(StageOutcome::Completed, now);
                match next {
                    Next::Main(status) => {
                        job.set_status(status, now);
                        if status == JobStatus::Completed && self.config.feedback {
                            job.set_feedback_status(FeedbackStatus::Pending, now);
                        }
                    }
                    Next::Feedback(status) => job.set_feedback_status(status, now),
                }
                self.logger.append(
                    job.id.as_str(),
                    stage.as_str(),
                    &format!("completed, wrote {}", artifact.file_name()),
                );
                if job.status == JobStatus::Completed && matches!(next, Next::Main(_)) {
                    tracing::info!(job_id = %job.id, "job completed");
                }
                self.commit(job)
            }
            Err(error) => {
                let now = self.now();
                tracing::warn!(job_id = %job.id, %stage, %error, "stage failed");
                self.logger
                    .append(job.id.as_str(), stage.as_str(), &format!("failed: {error}"));
                let outcome = match next {
                    Next::Main(_) => {
                        job.fail(stage, &error, now);
                        DriverOutcome::Failed { stage, error }
                    }
                    Next::Feedback(_) => {
                        job.fail_feedback(stage, &error, now);
                        DriverOutcome::FeedbackFailed { stage, error }
                    }
                };
                match self.commit(job)? {
                    Flow::Continue => Ok(Flow::Done(outcome)),
                    done => Ok(done),
                }
            }
        }
    }

    /// Run one stage against the job directory and write its artifact.
    /// Errors come back as the message recorded on the job.
    async fn perform(&self, job: &Job, stage: Stage) -> Result<Artifact, String> {
        let Some(artifact) = stage.artifact() else {
            return Err(format!("{stage}: stage produces no artifact"));
        };
        let dir = ArtifactDir::for_job(job);

        let mut artifacts = BTreeMap::new();
        for input in stage.inputs() {
            let body = dir
                .read_body(*input)
                .map_err(|e| format!("{stage}: {e}"))?;
            artifacts.insert(*input, body);
        }
        let seed = self
            .store
            .read_seed(&job.id)
            .map_err(|e| format!("{stage}: {e}"))?;

        let input = StageInput {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            stage,
            dir: job.dir.clone(),
            seed,
            artifacts,
            metadata: job.metadata.clone(),
        };
        let mut body = self
            .services
            .run(stage, &input)
            .await
            .map_err(|e| e.to_string())?;

        if self.cancel.is_cancelled() {
            return Err(format!("{stage}: cancelled"));
        }
        if stage == Stage::Curating {
            body = self.curate(&dir, &job.id, &body)?;
        }

        dir.write(artifact, body, self.now())
            .map_err(|e| format!("{stage}: {e}"))?;
        Ok(artifact)
    }

    /// Apply the curate mutations and return the completed update log as
    /// the artifact body. A log left by an interrupted earlier run, pending
    /// or complete, is reverted first so re-entry does not apply the same
    /// changes twice.
    fn curate(&self, dir: &ArtifactDir, id: &JobId, body: &Value) -> Result<Value, String> {
        let fail = |e: &dyn fmt::Display| format!("{}: {e}", Stage::Curating);

        if let Ok(previous) = dir.read_body(Artifact::UpdateLog) {
            let log: UpdateLog = serde_json::from_value(previous).map_err(|e| fail(&e))?;
            let reverted = KnowledgeStore::new(&log.store)
                .rollback(&log)
                .map_err(|e| fail(&e))?;
            tracing::info!(job_id = %id, reverted, "reverted update log of interrupted curate");
        }

        // The pending log lands in the job directory before the store is
        // rewritten, so a crash in between is still reverted on re-entry.
        let mutations = parse_mutations(body).map_err(|e| fail(&e))?;
        let log = KnowledgeStore::new(&self.config.knowledge_store)
            .apply_logged(&mutations, |pending| {
                let body = serde_json::to_value(pending).map_err(|e| e.to_string())?;
                dir.write(Artifact::UpdateLog, body, self.now())
                    .map_err(|e| e.to_string())
            })
            .map_err(|e| fail(&e))?;
        self.logger.append(
            id.as_str(),
            Stage::Curating.as_str(),
            &format!(
                "applied {} mutation(s) to {}",
                log.applied.len(),
                log.store.display()
            ),
        );
        serde_json::to_value(&log).map_err(|e| fail(&e))
    }

    /// Save the record unless the job was cancelled, here or elsewhere.
    fn commit(&self, job: &Job) -> Result<Flow, DriverError> {
        if self.cancel.is_cancelled() {
            return Ok(Flow::Done(DriverOutcome::Cancelled));
        }
        if let Some(disk) = self.store.reload(&job.id)? {
            if cancelled_elsewhere(&disk, job) {
                tracing::info!(job_id = %job.id, "job cancelled by another party, not overwriting");
                return Ok(Flow::Done(DriverOutcome::Cancelled));
            }
        }
        self.store.save(job)?;
        Ok(Flow::Continue)
    }
}

fn cancelled_elsewhere(disk: &Job, ours: &Job) -> bool {
    if disk.status == JobStatus::Cancelled {
        return true;
    }
    disk.status == JobStatus::Completed
        && disk.feedback_status == Some(FeedbackStatus::Failed)
        && ours.feedback_status != Some(FeedbackStatus::Failed)
}

/// Outcome reported for a job the driver has nothing left to do for.
fn settled(job: &Job) -> DriverOutcome {
    let error = job.last_error.clone().unwrap_or_default();
    match (job.status, job.feedback_status) {
        (JobStatus::Completed, Some(FeedbackStatus::Failed)) => DriverOutcome::FeedbackFailed {
            stage: job.failed_stage.unwrap_or(Stage::Evaluating),
            error,
        },
        (JobStatus::Failed, _) => DriverOutcome::Failed {
            stage: job.failed_stage.unwrap_or(Stage::Extracting),
            error,
        },
        (JobStatus::Cancelled, _) => DriverOutcome::Cancelled,
        (JobStatus::AwaitingConfirm, _) => DriverOutcome::Suspended,
        _ => DriverOutcome::Completed,
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
