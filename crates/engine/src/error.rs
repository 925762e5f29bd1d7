// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the driver and the retry engine

use crate::knowledge::KnowledgeError;
use rj_core::{JobId, Stage};
use rj_storage::{ArtifactError, StoreError};
use thiserror::Error;

/// Errors that stop the driver before it can record an outcome.
///
/// Stage failures are not errors here: they are recorded on the job and
/// reported as `DriverOutcome::Failed`.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("retry denied: {0}")]
    Denied(String),
    #[error("cannot resume at {requested}: job only reached {reached}")]
    InvalidOverride { requested: Stage, reached: Stage },
    #[error("invalid update log: {0}")]
    UpdateLog(serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}
