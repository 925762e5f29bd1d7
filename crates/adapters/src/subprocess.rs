// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Run a command, feeding `input` on stdin and collecting stdout/stderr.
///
/// The write happens on its own task so a command that produces output
/// before draining its input cannot deadlock. A command that exits without
/// reading stdin is not an error. When `timeout` elapses the child is killed
/// (via `kill_on_drop`).
pub async fn run_with_input(
    mut cmd: Command,
    input: Vec<u8>,
    timeout: Option<Duration>,
) -> Result<Output, SubprocessError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(SubprocessError::Spawn)?;

    let writer = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            match stdin.write_all(&input).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        })
    });

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(SubprocessError::Io)?,
            Err(_elapsed) => return Err(SubprocessError::Timeout(limit)),
        },
        None => child
            .wait_with_output()
            .await
            .map_err(SubprocessError::Io)?,
    };

    if let Some(writer) = writer {
        if let Ok(Err(e)) = writer.await {
            tracing::debug!(error = %e, "failed to write subprocess stdin");
        }
    }
    Ok(output)
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
