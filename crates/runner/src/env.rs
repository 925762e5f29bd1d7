// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the runner crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SchedulerError;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Resolve state directory: RJ_STATE_DIR > XDG_STATE_HOME/rj > ~/.local/state/rj
pub fn state_dir() -> Result<PathBuf, SchedulerError> {
    if let Ok(dir) = std::env::var("RJ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("rj"));
    }
    let home = std::env::var("HOME").map_err(|_| SchedulerError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/rj"))
}

/// Explicit path to the `rjw` worker binary
pub fn worker_binary() -> Option<String> {
    std::env::var("RJ_WORKER_BINARY").ok()
}

/// Grace period override for terminate (SIGTERM → SIGKILL)
pub fn terminate_timeout_ms() -> Option<Duration> {
    parse_duration_ms("RJ_TERMINATE_TIMEOUT_MS")
}

/// Poll interval while waiting for a process to exit (default: 50ms)
pub fn poll_interval() -> Duration {
    parse_duration_ms("RJ_POLL_MS").unwrap_or(Duration::from_millis(50))
}
