// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance guard for the in-process runner.
//!
//! The guard is an exclusive advisory lock on `runner.lock`. While held, the
//! file carries a liveness record that the owner refreshes on every
//! heartbeat. The OS releases the lock when the holder dies, so a crashed
//! runner never blocks its successor.

use crate::error::GuardError;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    pub pid: u32,
    pub started_at_ms: u64,
    pub heartbeat_at_ms: u64,
}

impl Liveness {
    /// A heartbeat older than `max_age_ms` marks an owner that stopped
    /// making progress.
    pub fn is_stale(&self, now_ms: u64, max_age_ms: u64) -> bool {
        now_ms.saturating_sub(self.heartbeat_at_ms) > max_age_ms
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
    file: File,
    liveness: Liveness,
}

impl InstanceGuard {
    /// Try to become the single runner. `Ok(None)` means another live
    /// process holds the guard.
    pub fn acquire(path: &Path) -> Result<Option<Self>, GuardError> {
        let io_err = |source| GuardError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        // Open without truncating: the current holder's record must survive
        // until we own the lock.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        let now = now_ms();
        let mut guard = Self {
            path: path.to_path_buf(),
            file,
            liveness: Liveness {
                pid: std::process::id(),
                started_at_ms: now,
                heartbeat_at_ms: now,
            },
        };
        guard.write_liveness()?;
        tracing::info!(path = %path.display(), pid = guard.liveness.pid, "runner guard acquired");
        Ok(Some(guard))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Refresh the heartbeat timestamp.
    pub fn heartbeat(&mut self) -> Result<(), GuardError> {
        self.liveness.heartbeat_at_ms = now_ms().max(self.liveness.heartbeat_at_ms);
        self.write_liveness()
    }

    fn write_liveness(&mut self) -> Result<(), GuardError> {
        let path = &self.path;
        let io_err = |source| GuardError::Io {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_vec(&self.liveness)
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        self.file.set_len(0).map_err(io_err)?;
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        self.file.write_all(&json).map_err(io_err)?;
        self.file.flush().map_err(io_err)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        tracing::info!(path = %self.path.display(), "runner guard released");
    }
}

/// Liveness record of the current holder, if one is written.
pub fn read_liveness(path: &Path) -> Option<Liveness> {
    let content = std::fs::read(path).ok()?;
    serde_json::from_slice(&content).ok()
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
