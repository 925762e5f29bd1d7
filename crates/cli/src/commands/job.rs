// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job commands: submit, resume, cancel, status, logs, list, show

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use rj_core::{Job, JobId, JobStatus, OwnerId, StageOutcome};
use rj_runner::{Context, JobBackend, ProcessBackend};
use rj_storage::ArtifactDir;
use serde_json::Value;

use super::Backend;
use crate::color::{self, Tone};
use crate::exit_error::ExitError;
use crate::output::{
    display_log, format_duration, format_time_ago, print_json, truncate, OutputFormat,
};
use crate::table::{status_cell, JobTable};

#[derive(Args)]
pub struct SubmitArgs {
    /// Owner recorded on the job (default: $RJ_OWNER, then $USER)
    #[arg(long)]
    pub owner: Option<String>,

    /// Seed payload as inline JSON
    #[arg(long, conflicts_with = "seed_file")]
    pub seed: Option<String>,

    /// Read the seed payload from a file ("-" for stdin)
    #[arg(long)]
    pub seed_file: Option<PathBuf>,

    /// Drive the job inside this process instead of a worker process
    #[arg(long)]
    pub in_process: bool,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Job ID
    pub id: String,

    /// Drive the job inside this process instead of a worker process
    #[arg(long)]
    pub in_process: bool,
}

#[derive(Args)]
pub struct IdArgs {
    /// Job ID
    pub id: String,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Job ID
    pub id: String,

    /// Number of recent lines to show
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only jobs submitted by this owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Filter by status (e.g. "failed", "awaiting_confirm")
    #[arg(long)]
    pub status: Option<String>,

    /// Maximum number of jobs to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Show all jobs (no limit)
    #[arg(long, conflicts_with = "limit")]
    pub no_limit: bool,
}

fn read_seed(args: &SubmitArgs) -> Result<Value> {
    let text = match (&args.seed, &args.seed_file) {
        (Some(seed), _) => seed.clone(),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read seed from stdin")?;
            buf
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?,
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    serde_json::from_str(&text).context("seed is not valid JSON")
}

fn load_job(ctx: &Context, id: &str) -> Result<Job> {
    let id = JobId::new(id);
    ctx.store()
        .reload(&id)?
        .ok_or_else(|| ExitError::new(1, format!("job not found: {id}")).into())
}

fn print_status_line(job: &Job) {
    println!(
        "  {} {}",
        color::label("Status:"),
        color::paint(&status_cell(job), Tone::of_job(job))
    );
}

pub async fn submit(ctx: Context, args: SubmitArgs, format: OutputFormat) -> Result<()> {
    let seed = read_seed(&args)?;
    let owner = OwnerId::new(
        args.owner
            .clone()
            .unwrap_or_else(crate::env::default_owner),
    );
    let backend = Backend::open(ctx.clone(), args.in_process)?;
    let id = backend.jobs().submit(&owner, &seed)?;

    if format == OutputFormat::Text {
        println!("Submitted job {}", color::header(id.as_str()));
    }
    let worker = backend.finish(&id).await?;
    let job = load_job(&ctx, id.as_str())?;
    match format {
        OutputFormat::Text => {
            if worker.is_some() {
                print_status_line(&job);
            }
            if job.status == JobStatus::AwaitingConfirm {
                println!("Awaiting confirmation: rj resume {}", id);
            } else {
                println!("Follow progress: rj logs {}", id);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": id,
            "status": job.status,
            "worker": worker,
        }))?,
    }
    Ok(())
}

pub async fn resume(ctx: Context, args: ResumeArgs, format: OutputFormat) -> Result<()> {
    let job = load_job(&ctx, &args.id)?;
    let backend = Backend::open(ctx.clone(), args.in_process)?;
    let resumed = backend.jobs().resume(&job.id)?;
    if !resumed {
        let reason = if job.needs_work() {
            "a worker is already running".to_string()
        } else {
            format!("nothing to resume, job is {}", status_cell(&job))
        };
        return Err(ExitError::new(1, format!("job {} not resumed: {}", job.id, reason)).into());
    }
    let worker = backend.finish(&job.id).await?;
    match format {
        OutputFormat::Text => {
            println!(
                "Resumed job {} at {}",
                color::header(job.id.as_str()),
                job.status
            );
            if worker.is_some() {
                let job = load_job(&ctx, job.id.as_str())?;
                print_status_line(&job);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": job.id,
            "resumed": true,
            "worker": worker,
        }))?,
    }
    Ok(())
}

pub fn cancel(ctx: Context, args: IdArgs, format: OutputFormat) -> Result<()> {
    let before = load_job(&ctx, &args.id)?;
    let backend = ProcessBackend::new(ctx.clone());
    let stopped = backend.terminate(&before.id)?;
    let after = load_job(&ctx, &args.id)?;
    let changed = after.status != before.status || after.feedback_status != before.feedback_status;

    match format {
        OutputFormat::Text => {
            if changed {
                let stage = after
                    .failed_stage
                    .map(|s| format!(" at {s}"))
                    .unwrap_or_default();
                println!("Cancelled job {}{}", color::header(after.id.as_str()), stage);
                if stopped {
                    println!("  worker stopped");
                }
            } else {
                println!("Job {} is already {}", after.id, status_cell(&after));
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": after.id,
            "cancelled": changed,
            "worker_stopped": stopped,
            "status": after.status,
        }))?,
    }
    Ok(())
}

pub fn status(ctx: Context, args: IdArgs, format: OutputFormat) -> Result<()> {
    let job = load_job(&ctx, &args.id)?;
    let worker = ProcessBackend::new(ctx).status(&job.id);
    match format {
        OutputFormat::Text => {
            println!(
                "{}  {}  worker: {}",
                job.id,
                color::paint(&status_cell(&job), Tone::of_job(&job)),
                color::paint(&worker.to_string(), Tone::of_worker(worker))
            );
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": job.id,
            "status": job.status,
            "feedback_status": job.feedback_status,
            "failed_stage": job.failed_stage,
            "retry_count": job.retry_count,
            "worker": worker,
        }))?,
    }
    Ok(())
}

pub fn logs(ctx: Context, args: LogsArgs, format: OutputFormat) -> Result<()> {
    let id = JobId::new(&args.id);
    let backend = ProcessBackend::new(ctx.clone());
    let lines = backend
        .logs(&id, args.limit)
        .map_err(|e| ExitError::new(1, e.to_string()))?;
    display_log(&ctx.log_path(&id), &lines, format, id.as_str())
}

pub(crate) fn format_job_list(out: &mut impl Write, jobs: &[Job]) {
    if jobs.is_empty() {
        let _ = writeln!(out, "No jobs");
        return;
    }
    let _ = JobTable::new(jobs).render(out, color::should_colorize());
}

/// Status summary line, e.g. "3 jobs: 1 completed, 2 failed".
pub(crate) fn summarize(jobs: &[Job]) -> String {
    let mut counts: Vec<(JobStatus, usize)> = Vec::new();
    for job in jobs {
        match counts.iter_mut().find(|(s, _)| *s == job.status) {
            Some((_, n)) => *n += 1,
            None => counts.push((job.status, 1)),
        }
    }
    counts.sort_by_key(|(s, _)| *s);
    let parts: Vec<String> = counts.iter().map(|(s, n)| format!("{n} {s}")).collect();
    let noun = if jobs.len() == 1 { "job" } else { "jobs" };
    format!("{} {}: {}", jobs.len(), noun, parts.join(", "))
}

pub fn list(ctx: Context, args: ListArgs, format: OutputFormat) -> Result<()> {
    let mut jobs = match &args.owner {
        Some(owner) => ctx.store().list_by_owner(&OwnerId::new(owner.as_str()))?,
        None => ctx.store().list()?,
    };
    if let Some(st) = &args.status {
        jobs.retain(|j| j.status.as_str().eq_ignore_ascii_case(st));
    }

    // Most recently updated first
    jobs.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));

    let total = jobs.len();
    let summary = summarize(&jobs);
    let effective_limit = if args.no_limit { total } else { args.limit };
    let truncated = total > effective_limit;
    if truncated {
        jobs.truncate(effective_limit);
    }

    match format {
        OutputFormat::Text => {
            let mut out = std::io::stdout();
            format_job_list(&mut out, &jobs);
            if total > 0 {
                println!("\n{}", color::muted(&summary));
            }
            if truncated {
                println!(
                    "... {} more not shown. Use --no-limit or --limit N to see more.",
                    total - effective_limit
                );
            }
        }
        OutputFormat::Json => print_json(&jobs)?,
    }
    Ok(())
}

fn outcome_label(outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Running => "running".to_string(),
        StageOutcome::Completed => "completed".to_string(),
        StageOutcome::Suspended => "pending confirmation".to_string(),
        StageOutcome::Failed(reason) => format!("failed ({})", truncate(reason, 40)),
    }
}

pub(crate) fn format_job_details(out: &mut impl Write, job: &Job, dir: &Path) {
    let _ = writeln!(out, "{} {}", color::header("Job:"), job.id);
    let _ = writeln!(out, "  {} {}", color::label("Owner:"), job.owner);
    let _ = writeln!(
        out,
        "  {} {}",
        color::label("Status:"),
        color::paint(&status_cell(job), Tone::of_job(job))
    );
    let _ = writeln!(
        out,
        "  {} {}/{}",
        color::label("Retries:"),
        job.retry_count,
        job.max_retries
    );
    let _ = writeln!(
        out,
        "  {} {} ago",
        color::label("Created:"),
        format_time_ago(job.created_at_ms)
    );
    let _ = writeln!(out, "  {} {}", color::label("Dir:"), dir.display());
    if let Some(stage) = job.failed_stage {
        let _ = writeln!(out, "  {} {}", color::label("Failed stage:"), stage);
    }
    if let Some(error) = &job.last_error {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {} {}", color::label("Error:"), error);
    }

    if !job.stage_history.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", color::header("Stages:"));
        for record in &job.stage_history {
            let _ = writeln!(
                out,
                "    {:<12} {:<8} {}",
                record.stage,
                format_duration(record.started_at_ms, record.finished_at_ms),
                color::paint(&outcome_label(&record.outcome), Tone::of_outcome(&record.outcome))
            );
        }
    }

    let artifacts = ArtifactDir::for_job(job).existing();
    if !artifacts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", color::header("Artifacts:"));
        for artifact in artifacts {
            let _ = writeln!(out, "    {}", artifact.file_name());
        }
    }

    if !job.retry_history.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", color::header("Retry history:"));
        for attempt in &job.retry_history {
            let from = match attempt.failed_stage {
                Some(stage) => format!("{} at {}", attempt.from_status, stage),
                None => attempt.from_status.to_string(),
            };
            let rollback = if attempt.rolled_back {
                " (side effects rolled back)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "    #{:<3} {:<10} {} -> {}{}  {}",
                attempt.retry_count,
                attempt.strategy,
                from,
                attempt.resume_stage,
                rollback,
                color::muted(&format!("{} ago", format_time_ago(attempt.at_ms)))
            );
        }
    }
}

pub fn show(ctx: Context, args: IdArgs, format: OutputFormat) -> Result<()> {
    let job = load_job(&ctx, &args.id)?;
    match format {
        OutputFormat::Text => {
            let mut out = std::io::stdout();
            format_job_details(&mut out, &job, &job.dir);
        }
        OutputFormat::Json => print_json(&job)?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
