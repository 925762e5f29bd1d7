// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline stages and the artifacts they produce.
//!
//! Declaration order is pipeline order: the main sequence first, then the
//! post-processing sub-pipeline. `Ord` on both enums follows that order.

use crate::job::{FeedbackStatus, JobStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extracting,
    AwaitingConfirm,
    Retrieving,
    Generating,
    Evaluating,
    Reflecting,
    Curating,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 7] = [
        Stage::Extracting,
        Stage::AwaitingConfirm,
        Stage::Retrieving,
        Stage::Generating,
        Stage::Evaluating,
        Stage::Reflecting,
        Stage::Curating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extracting => "extracting",
            Stage::AwaitingConfirm => "awaiting_confirm",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
            Stage::Evaluating => "evaluating",
            Stage::Reflecting => "reflecting",
            Stage::Curating => "curating",
        }
    }

    /// True for stages of the post-processing sub-pipeline.
    pub fn is_feedback(self) -> bool {
        matches!(self, Stage::Evaluating | Stage::Reflecting | Stage::Curating)
    }

    /// The artifact this stage writes, if any. The confirmation point
    /// produces nothing.
    pub fn artifact(self) -> Option<Artifact> {
        match self {
            Stage::Extracting => Some(Artifact::Request),
            Stage::AwaitingConfirm => None,
            Stage::Retrieving => Some(Artifact::Context),
            Stage::Generating => Some(Artifact::Output),
            Stage::Evaluating => Some(Artifact::Evaluation),
            Stage::Reflecting => Some(Artifact::Analysis),
            Stage::Curating => Some(Artifact::UpdateLog),
        }
    }

    /// Artifacts read by this stage.
    pub fn inputs(self) -> &'static [Artifact] {
        match self {
            Stage::Extracting | Stage::AwaitingConfirm => &[],
            Stage::Retrieving => &[Artifact::Request],
            Stage::Generating => &[Artifact::Request, Artifact::Context],
            Stage::Evaluating => &[Artifact::Request, Artifact::Output],
            Stage::Reflecting => &[Artifact::Output, Artifact::Evaluation],
            Stage::Curating => &[Artifact::Analysis],
        }
    }

    /// Record position that re-enters this stage: main status plus the
    /// sub-pipeline status for post-processing stages.
    pub fn resume_point(self) -> (JobStatus, Option<FeedbackStatus>) {
        match self {
            Stage::Extracting => (JobStatus::Extracting, None),
            Stage::AwaitingConfirm => (JobStatus::AwaitingConfirm, None),
            Stage::Retrieving => (JobStatus::Retrieving, None),
            Stage::Generating => (JobStatus::Generating, None),
            Stage::Evaluating => (JobStatus::Completed, Some(FeedbackStatus::Evaluating)),
            Stage::Reflecting => (JobStatus::Completed, Some(FeedbackStatus::Reflecting)),
            Stage::Curating => (JobStatus::Completed, Some(FeedbackStatus::Curating)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    /// Accepts `generating`, `GENERATING`, `awaiting-confirm`, and the verb
    /// forms (`generate`, `retrieve`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        let stage = match norm.as_str() {
            "extracting" | "extract" => Stage::Extracting,
            "awaiting_confirm" | "confirm" => Stage::AwaitingConfirm,
            "retrieving" | "retrieve" => Stage::Retrieving,
            "generating" | "generate" => Stage::Generating,
            "evaluating" | "evaluate" => Stage::Evaluating,
            "reflecting" | "reflect" => Stage::Reflecting,
            "curating" | "curate" => Stage::Curating,
            _ => return Err(UnknownStage(s.to_string())),
        };
        Ok(stage)
    }
}

/// A stage output file stored in the job directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Request,
    Context,
    Output,
    Evaluation,
    Analysis,
    UpdateLog,
}

impl Artifact {
    pub const ALL: [Artifact; 6] = [
        Artifact::Request,
        Artifact::Context,
        Artifact::Output,
        Artifact::Evaluation,
        Artifact::Analysis,
        Artifact::UpdateLog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Artifact::Request => "request",
            Artifact::Context => "context",
            Artifact::Output => "output",
            Artifact::Evaluation => "evaluation",
            Artifact::Analysis => "analysis",
            Artifact::UpdateLog => "update_log",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }

    /// The stage that owns (and alone may write) this artifact.
    pub fn producer(self) -> Stage {
        match self {
            Artifact::Request => Stage::Extracting,
            Artifact::Context => Stage::Retrieving,
            Artifact::Output => Stage::Generating,
            Artifact::Evaluation => Stage::Evaluating,
            Artifact::Analysis => Stage::Reflecting,
            Artifact::UpdateLog => Stage::Curating,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
