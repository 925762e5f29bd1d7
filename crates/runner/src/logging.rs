// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup for the worker binary and the in-process runner.

use crate::error::SchedulerError;
use rj_engine::log_paths::runner_log_path;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Worker logging goes to stdout, which the scheduler points at the job log.
pub fn init_worker_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stdout).with_ansi(false))
        .try_init();
}

/// In-process runner logging goes to `<logs_dir>/runner.log`. Keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init_runner_logging(logs_dir: &Path) -> Result<WorkerGuard, SchedulerError> {
    std::fs::create_dir_all(logs_dir).map_err(|e| SchedulerError::io(logs_dir, e))?;
    let path = runner_log_path(logs_dir);
    let file_name = path
        .file_name()
        .ok_or_else(|| SchedulerError::io(&path, std::io::ErrorKind::InvalidInput.into()))?;
    let file_appender = tracing_appender::rolling::never(logs_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();
    Ok(guard)
}
