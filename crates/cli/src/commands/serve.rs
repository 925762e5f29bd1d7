// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rj serve`: run the in-process runner in the foreground

use anyhow::Result;
use clap::Args;
use rj_core::{Job, JobStatus};
use rj_engine::log_paths::logs_dir;
use rj_engine::WorkerLiveness;
use rj_runner::{logging, Context, InProcessBackend, JobBackend, PidLiveness};

use crate::output::{print_json, OutputFormat};

#[derive(Args)]
pub struct ServeArgs {
    /// Also resume jobs waiting for confirmation
    #[arg(long)]
    pub confirm: bool,
}

/// Jobs an idle runner should pick back up: unfinished, not owned by a
/// live worker process, and (unless confirming) not parked for review.
pub(crate) fn pending_work(
    jobs: Vec<Job>,
    confirm: bool,
    liveness: &dyn WorkerLiveness,
) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| job.needs_work())
        .filter(|job| confirm || job.status != JobStatus::AwaitingConfirm)
        .filter(|job| !liveness.is_running(job))
        .collect()
}

pub async fn serve(ctx: Context, args: ServeArgs, format: OutputFormat) -> Result<()> {
    let _log = logging::init_runner_logging(&logs_dir(ctx.state_dir()))?;
    let backend = InProcessBackend::new(ctx.clone());

    let mut resumed = Vec::new();
    for job in pending_work(ctx.store().list()?, args.confirm, &PidLiveness) {
        match backend.resume(&job.id) {
            Ok(true) => resumed.push(job.id),
            Ok(false) => {}
            Err(e) => {
                backend.shutdown();
                return Err(e.into());
            }
        }
    }

    match format {
        OutputFormat::Text => {
            if resumed.is_empty() {
                println!("Nothing to resume");
                return Ok(());
            }
            println!("Resumed {} job(s); Ctrl-C to stop", resumed.len());
        }
        OutputFormat::Json => print_json(&serde_json::json!({ "resumed": resumed }))?,
    }
    if resumed.is_empty() {
        return Ok(());
    }

    let idle = {
        let backend = backend.clone();
        tokio::task::spawn_blocking(move || backend.wait_idle())
    };
    tokio::pin!(idle);
    tokio::select! {
        res = &mut idle => {
            res?;
            tracing::info!("runner idle, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping runner");
            let stopper = backend.clone();
            tokio::task::spawn_blocking(move || stopper.shutdown()).await?;
            idle.await?;
            if format == OutputFormat::Text {
                println!("Stopped; interrupted jobs can be resumed");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;
