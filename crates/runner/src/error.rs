// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for scheduling and supervising workers

use rj_core::{ConfigError, JobId};
use rj_engine::DriverError;
use rj_storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("could not resolve state directory (set RJ_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("corrupt config snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("failed to spawn worker for {id}: {message}")]
    Spawn { id: JobId, message: String },
    #[error("another runner holds {}", .0.display())]
    NotOwner(PathBuf),
    #[error(transparent)]
    Guard(#[from] GuardError),
}

impl SchedulerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchedulerError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("guard {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
