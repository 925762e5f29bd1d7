// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod job;
pub mod retry;
pub mod serve;

use std::time::Duration;

use anyhow::Result;
use rj_core::JobId;
use rj_engine::log_paths::logs_dir;
use rj_runner::{logging, Context, InProcessBackend, JobBackend, ProcessBackend, WorkerStatus};
use tracing_appender::non_blocking::WorkerGuard;

/// Where workers run for commands that start one.
pub enum Backend {
    Process(ProcessBackend),
    InProcess {
        backend: InProcessBackend,
        _log: WorkerGuard,
    },
}

impl Backend {
    pub fn open(ctx: Context, in_process: bool) -> Result<Self> {
        if !in_process {
            return Ok(Backend::Process(ProcessBackend::new(ctx)));
        }
        let log = logging::init_runner_logging(&logs_dir(ctx.state_dir()))?;
        Ok(Backend::InProcess {
            backend: InProcessBackend::new(ctx),
            _log: log,
        })
    }

    pub fn jobs(&self) -> &dyn JobBackend {
        match self {
            Backend::Process(backend) => backend,
            Backend::InProcess { backend, .. } => backend,
        }
    }

    /// In-process runs live in this process: block until the job's run
    /// ends, then stop the runner. Worker processes are left running.
    pub async fn finish(&self, id: &JobId) -> Result<Option<WorkerStatus>> {
        let Backend::InProcess { backend, .. } = self else {
            return Ok(None);
        };
        let backend = backend.clone();
        let id = id.clone();
        let status = tokio::task::spawn_blocking(move || {
            let status = backend.wait(&id, Duration::MAX);
            backend.shutdown();
            status
        })
        .await?;
        Ok(Some(status))
    }
}
