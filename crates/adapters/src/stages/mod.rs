// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage services: the collaborator that does the actual work of a stage

mod command;

pub use command::CommandServices;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStageServices, StageCall};

use async_trait::async_trait;
use rj_core::{Artifact, JobId, OwnerId, Stage};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from running a stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage}: failed to start command: {message}")]
    Spawn { stage: Stage, message: String },
    #[error("{stage}: command timed out after {timeout_ms}ms")]
    Timeout { stage: Stage, timeout_ms: u64 },
    #[error("{stage}: command exited with {}: {stderr}", exit_label(*.code))]
    CommandFailed {
        stage: Stage,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{stage}: invalid output: {message}")]
    InvalidOutput { stage: Stage, message: String },
    #[error("{stage}: {message}")]
    Failed { stage: Stage, message: String },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "signal".to_string(),
    }
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Spawn { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::CommandFailed { stage, .. }
            | StageError::InvalidOutput { stage, .. }
            | StageError::Failed { stage, .. } => *stage,
        }
    }
}

/// Everything a stage gets to see: the seed plus the artifacts it consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageInput {
    pub job_id: JobId,
    pub owner: OwnerId,
    pub stage: Stage,
    /// Job directory, used as the working directory of stage commands
    #[serde(skip)]
    pub dir: PathBuf,
    pub seed: Value,
    pub artifacts: BTreeMap<Artifact, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Adapter performing the work of each stage.
///
/// Implementations must be re-entrant per stage: the driver may call `run`
/// again for the same stage after a crash, and the returned body replaces the
/// previous artifact.
#[async_trait]
pub trait StageServices: Clone + Send + Sync + 'static {
    /// Run `stage` and return the artifact body it produced
    async fn run(&self, stage: Stage, input: &StageInput) -> Result<Value, StageError>;
}
