// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry plan value object.
//!
//! A plan says where a job re-enters the pipeline, which artifacts survive,
//! which are discarded, and whether knowledge-store mutations recorded by a
//! previous curation run must be reverted first.

use crate::job::{FeedbackStatus, JobStatus};
use crate::stage::{Artifact, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Start over from the first stage with no artifacts.
    Clean,
    /// Re-enter a failed or cancelled job at its failed stage.
    Partial,
    /// Continue a job whose worker died, or a failed post-processing run.
    Resume,
    /// Deliberately re-run part of a completed job.
    Regenerate,
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetryStrategy::Clean => "clean",
            RetryStrategy::Partial => "partial",
            RetryStrategy::Resume => "resume",
            RetryStrategy::Regenerate => "regenerate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectAction {
    None,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPlan {
    pub strategy: RetryStrategy,
    pub resume_stage: Stage,
    pub resume_status: JobStatus,
    pub resume_feedback: Option<FeedbackStatus>,
    pub keep: Vec<Artifact>,
    pub delete: Vec<Artifact>,
    pub side_effects: SideEffectAction,
    pub reset_retry_count: bool,
    /// Whether discarding the update log should revert its mutations.
    #[serde(skip)]
    rollback_eligible: bool,
}

impl RetryPlan {
    /// Plan that restarts from `PENDING` and discards every artifact.
    pub fn clean(rollback_eligible: bool, reset_retry_count: bool) -> Self {
        let mut plan = Self::resume_at(
            RetryStrategy::Clean,
            Stage::Extracting,
            rollback_eligible,
            reset_retry_count,
        );
        plan.resume_status = JobStatus::Pending;
        plan
    }

    /// Plan that re-enters at `stage`: artifacts produced before it are
    /// kept, the rest (its own output included) are discarded.
    pub fn resume_at(
        strategy: RetryStrategy,
        stage: Stage,
        rollback_eligible: bool,
        reset_retry_count: bool,
    ) -> Self {
        let mut plan = Self {
            strategy,
            resume_stage: stage,
            resume_status: JobStatus::Pending,
            resume_feedback: None,
            keep: Vec::new(),
            delete: Vec::new(),
            side_effects: SideEffectAction::None,
            reset_retry_count,
            rollback_eligible,
        };
        plan.recompute();
        plan
    }

    /// Move corrupted kept artifacts to the delete set.
    ///
    /// The resume point moves back to the earliest stage whose output is
    /// corrupted, since every later artifact was derived from it. If nothing
    /// survives the plan degrades to [`RetryStrategy::Clean`].
    pub fn discard_corrupted(&mut self, corrupted: &[Artifact]) {
        let earliest = corrupted
            .iter()
            .filter(|a| self.keep.contains(a))
            .map(|a| a.producer())
            .min();
        let Some(stage) = earliest else {
            return;
        };
        if stage < self.resume_stage {
            self.resume_stage = stage;
            self.recompute();
        }
        if self.keep.is_empty() {
            self.strategy = RetryStrategy::Clean;
            self.resume_stage = Stage::Extracting;
            self.resume_status = JobStatus::Pending;
            self.resume_feedback = None;
        }
    }

    fn recompute(&mut self) {
        let (status, feedback) = self.resume_stage.resume_point();
        if self.strategy != RetryStrategy::Clean {
            self.resume_status = status;
        }
        self.resume_feedback = feedback;
        let (keep, delete): (Vec<Artifact>, Vec<Artifact>) = Artifact::ALL
            .into_iter()
            .partition(|a| a.producer() < self.resume_stage);
        self.keep = keep;
        self.delete = delete;
        self.side_effects = if self.rollback_eligible && self.delete.contains(&Artifact::UpdateLog)
        {
            SideEffectAction::Rollback
        } else {
            SideEffectAction::None
        };
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
