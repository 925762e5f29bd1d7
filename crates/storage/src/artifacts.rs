// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage artifact files.
//!
//! Each artifact is a JSON envelope naming the artifact and job it belongs
//! to, wrapped around the stage's output body. The envelope gives the retry
//! validator something to check structurally: a truncated file fails to
//! parse, and a file copied from another job or stage fails the identity
//! check.

use crate::atomic::{read_json, write_json_atomic, ReadJson};
use rj_core::{Artifact, Job, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact {0} is missing")]
    Missing(Artifact),
    #[error("artifact {artifact}: {source}")]
    Io {
        artifact: Artifact,
        source: std::io::Error,
    },
    #[error("artifact {artifact} is corrupt: {source}")]
    Corrupt {
        artifact: Artifact,
        source: serde_json::Error,
    },
    #[error("artifact {artifact} belongs to {found}")]
    Mismatch { artifact: Artifact, found: String },
    #[error("artifact {0} has an empty body")]
    Empty(Artifact),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub artifact: Artifact,
    pub job_id: JobId,
    pub written_at_ms: u64,
    pub body: Value,
}

/// Artifact files of one job.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    dir: PathBuf,
    job_id: JobId,
}

impl ArtifactDir {
    pub fn new(dir: impl Into<PathBuf>, job_id: JobId) -> Self {
        Self {
            dir: dir.into(),
            job_id,
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(job.dir.clone(), job.id.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).exists()
    }

    /// Artifacts currently on disk, in pipeline order.
    pub fn existing(&self) -> Vec<Artifact> {
        Artifact::ALL
            .into_iter()
            .filter(|a| self.exists(*a))
            .collect()
    }

    /// Write (or overwrite) an artifact. Re-running a stage replaces its
    /// previous output wholesale.
    pub fn write(&self, artifact: Artifact, body: Value, epoch_ms: u64) -> Result<(), ArtifactError> {
        let envelope = ArtifactEnvelope {
            artifact,
            job_id: self.job_id.clone(),
            written_at_ms: epoch_ms,
            body,
        };
        write_json_atomic(&self.path(artifact), &envelope)
            .map_err(|source| ArtifactError::Io { artifact, source })
    }

    /// Read and structurally check an artifact.
    pub fn read(&self, artifact: Artifact) -> Result<ArtifactEnvelope, ArtifactError> {
        let envelope = match read_json::<ArtifactEnvelope>(&self.path(artifact))
            .map_err(|source| ArtifactError::Io { artifact, source })?
        {
            ReadJson::Missing => return Err(ArtifactError::Missing(artifact)),
            ReadJson::Corrupt(source) => return Err(ArtifactError::Corrupt { artifact, source }),
            ReadJson::Parsed(envelope) => envelope,
        };
        if envelope.artifact != artifact {
            return Err(ArtifactError::Mismatch {
                artifact,
                found: format!("artifact {}", envelope.artifact),
            });
        }
        if envelope.job_id != self.job_id {
            return Err(ArtifactError::Mismatch {
                artifact,
                found: format!("job {}", envelope.job_id),
            });
        }
        if envelope.body.is_null() {
            return Err(ArtifactError::Empty(artifact));
        }
        Ok(envelope)
    }

    pub fn read_body(&self, artifact: Artifact) -> Result<Value, ArtifactError> {
        self.read(artifact).map(|e| e.body)
    }

    pub fn validate(&self, artifact: Artifact) -> Result<(), ArtifactError> {
        self.read(artifact).map(|_| ())
    }

    /// Delete an artifact. Returns whether a file was removed.
    pub fn remove(&self, artifact: Artifact) -> Result<bool, ArtifactError> {
        match std::fs::remove_file(self.path(artifact)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ArtifactError::Io { artifact, source }),
        }
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
