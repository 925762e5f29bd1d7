// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job record and its status machine.

use crate::clock::Clock;
use crate::id::{JobId, OwnerId};
use crate::plan::RetryStrategy;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Main pipeline status.
///
/// Legal sequence: `PENDING → EXTRACTING → AWAITING_CONFIRM → RETRIEVING →
/// GENERATING → COMPLETED`, with `FAILED` and `CANCELLED` reachable from any
/// non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Extracting,
    AwaitingConfirm,
    Retrieving,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Extracting => "EXTRACTING",
            JobStatus::AwaitingConfirm => "AWAITING_CONFIRM",
            JobStatus::Retrieving => "RETRIEVING",
            JobStatus::Generating => "GENERATING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The stage executed while the record sits in this status.
    pub fn stage(self) -> Option<Stage> {
        match self {
            JobStatus::Extracting => Some(Stage::Extracting),
            JobStatus::AwaitingConfirm => Some(Stage::AwaitingConfirm),
            JobStatus::Retrieving => Some(Stage::Retrieving),
            JobStatus::Generating => Some(Stage::Generating),
            JobStatus::Pending
            | JobStatus::Completed
            | JobStatus::Failed
            | JobStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-processing sub-pipeline status. Only meaningful once the main
/// status is `COMPLETED`; it never re-opens the main status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Evaluating,
    Reflecting,
    Curating,
    Completed,
    Failed,
}

impl FeedbackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Evaluating => "evaluating",
            FeedbackStatus::Reflecting => "reflecting",
            FeedbackStatus::Curating => "curating",
            FeedbackStatus::Completed => "completed",
            FeedbackStatus::Failed => "failed",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, FeedbackStatus::Completed | FeedbackStatus::Failed)
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            FeedbackStatus::Evaluating => Some(Stage::Evaluating),
            FeedbackStatus::Reflecting => Some(Stage::Reflecting),
            FeedbackStatus::Curating => Some(Stage::Curating),
            FeedbackStatus::Pending | FeedbackStatus::Completed | FeedbackStatus::Failed => None,
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage visit (for stage history)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Running,
    Completed,
    Suspended,
    Failed(String),
}

/// Record of a stage visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    pub outcome: StageOutcome,
}

/// Audit entry appended every time a retry plan is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub at_ms: u64,
    pub from_status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub strategy: RetryStrategy,
    pub resume_stage: Stage,
    pub rolled_back: bool,
    /// Retry count after the plan was applied.
    pub retry_count: u32,
}

/// Configuration for creating a new job
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub id: JobId,
    pub owner: OwnerId,
    pub dir: PathBuf,
    pub max_retries: u32,
    pub metadata: BTreeMap<String, String>,
}

impl JobConfig {
    pub fn builder(id: impl Into<JobId>, owner: impl Into<OwnerId>) -> JobConfigBuilder {
        JobConfigBuilder {
            config: JobConfig {
                id: id.into(),
                owner: owner.into(),
                dir: PathBuf::new(),
                max_retries: 3,
                metadata: BTreeMap::new(),
            },
        }
    }
}

pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dir = dir.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> JobConfig {
        self.config
    }
}

/// A durable job record. The on-disk copy is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: OwnerId,
    pub status: JobStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub failed_stage: Option<Stage>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub feedback_status: Option<FeedbackStatus>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Artifact directory of this job.
    pub dir: PathBuf,
    #[serde(default)]
    pub stage_history: Vec<StageRecord>,
    #[serde(default)]
    pub retry_history: Vec<RetryAttempt>,
}

impl Job {
    pub fn new(config: JobConfig, clock: &impl Clock) -> Self {
        let now = clock.epoch_ms();
        Self {
            id: config.id,
            owner: config.owner,
            status: JobStatus::Pending,
            created_at_ms: now,
            updated_at_ms: now,
            retry_count: 0,
            max_retries: config.max_retries,
            failed_stage: None,
            last_error: None,
            feedback_status: None,
            metadata: config.metadata,
            dir: config.dir,
            stage_history: Vec::new(),
            retry_history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True while a worker still has something to do: a non-terminal main
    /// status, or a completed job with an unsettled post-processing run.
    pub fn needs_work(&self) -> bool {
        match self.status {
            JobStatus::Completed => self.feedback_status.is_some_and(|f| !f.is_settled()),
            status => !status.is_terminal(),
        }
    }

    /// Stage the record currently points at, including sub-pipeline stages.
    pub fn current_stage(&self) -> Option<Stage> {
        match self.status {
            JobStatus::Completed => self.feedback_status.and_then(FeedbackStatus::stage),
            status => status.stage(),
        }
    }

    /// Move to `status`, stamping `updated_at_ms`.
    pub fn set_status(&mut self, status: JobStatus, epoch_ms: u64) {
        self.status = status;
        self.updated_at_ms = epoch_ms;
    }

    pub fn set_feedback_status(&mut self, status: FeedbackStatus, epoch_ms: u64) {
        self.feedback_status = Some(status);
        self.updated_at_ms = epoch_ms;
    }

    /// Open a stage history entry. A still-open entry left behind by a
    /// crashed worker is closed as interrupted first.
    pub fn enter_stage(&mut self, stage: Stage, epoch_ms: u64) {
        self.finish_stage(StageOutcome::Failed("interrupted".to_string()), epoch_ms);
        self.stage_history.push(StageRecord {
            stage,
            started_at_ms: epoch_ms,
            finished_at_ms: None,
            outcome: StageOutcome::Running,
        });
        self.updated_at_ms = epoch_ms;
    }

    /// Close the most recent stage entry if it is still open.
    pub fn finish_stage(&mut self, outcome: StageOutcome, epoch_ms: u64) {
        if let Some(record) = self.stage_history.last_mut() {
            if record.finished_at_ms.is_none() {
                record.finished_at_ms = Some(epoch_ms);
                record.outcome = outcome;
            }
        }
    }

    /// Record a main-pipeline failure at `stage`.
    pub fn fail(&mut self, stage: Stage, message: impl Into<String>, epoch_ms: u64) {
        let message = message.into();
        self.finish_stage(StageOutcome::Failed(message.clone()), epoch_ms);
        self.failed_stage = Some(stage);
        self.last_error = Some(message);
        self.set_status(JobStatus::Failed, epoch_ms);
    }

    /// Record a post-processing failure. The main status stays `COMPLETED`.
    pub fn fail_feedback(&mut self, stage: Stage, message: impl Into<String>, epoch_ms: u64) {
        let message = message.into();
        self.finish_stage(StageOutcome::Failed(message.clone()), epoch_ms);
        self.failed_stage = Some(stage);
        self.last_error = Some(message);
        self.set_feedback_status(FeedbackStatus::Failed, epoch_ms);
    }

    /// Mark cancelled, remembering the stage that was interrupted so a retry
    /// can pick up from there.
    pub fn cancel(&mut self, epoch_ms: u64) {
        if let Some(stage) = self.current_stage() {
            self.failed_stage = Some(stage);
        }
        self.finish_stage(StageOutcome::Failed("cancelled".to_string()), epoch_ms);
        self.last_error = Some("cancelled by request".to_string());
        if self.status == JobStatus::Completed {
            self.set_feedback_status(FeedbackStatus::Failed, epoch_ms);
        } else {
            self.set_status(JobStatus::Cancelled, epoch_ms);
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
