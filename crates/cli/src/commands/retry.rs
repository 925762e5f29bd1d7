// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rj retry`: plan and apply a retry, then hand the job back to a worker

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rj_core::{JobId, Stage, SystemClock};
use rj_engine::{ErrorClassifier, RetryEngine, RetryError, RetryOptions, RetryReport};
use rj_runner::{Context, PidLiveness};

use super::Backend;
use crate::color::{self, Tone};
use crate::exit_error::ExitError;
use crate::output::{print_json, OutputFormat};

#[derive(Args)]
pub struct RetryArgs {
    /// Job ID
    pub id: String,

    /// Retry past max_retries, non-retryable errors and completed jobs
    #[arg(long)]
    pub force: bool,

    /// Start over from the first stage, discarding every artifact
    #[arg(long)]
    pub clean: bool,

    /// Resume at this stage (e.g. "generate", "retrieving")
    #[arg(long, conflicts_with = "clean")]
    pub stage: Option<Stage>,

    /// Leave knowledge-store changes of discarded curating runs in place
    #[arg(long)]
    pub keep_side_effects: bool,

    /// Only report whether the job may be retried
    #[arg(long)]
    pub check: bool,

    /// Drive the job inside this process instead of a worker process
    #[arg(long)]
    pub in_process: bool,
}

impl RetryArgs {
    fn options(&self) -> RetryOptions {
        RetryOptions {
            force: self.force,
            clean: self.clean,
            stage_override: self.stage,
            keep_side_effects: self.keep_side_effects,
        }
    }
}

/// Retry engine for `id`. Failures are classified with the job's config
/// snapshot, so editing `rj.toml` later does not change the verdict.
fn engine(ctx: &Context, id: &JobId) -> Result<RetryEngine<SystemClock>> {
    let snapshot = ctx.load_snapshot(&ctx.store().job_dir(id))?;
    Ok(RetryEngine::new(
        Arc::clone(ctx.store()),
        ErrorClassifier::from_config(&snapshot),
        Arc::new(PidLiveness),
        SystemClock,
    )
    .with_logger(ctx.logger().clone()))
}

fn check(
    ctx: &Context,
    engine: &RetryEngine<SystemClock>,
    args: &RetryArgs,
    format: OutputFormat,
) -> Result<()> {
    let id = JobId::new(&args.id);
    let job = ctx
        .store()
        .reload(&id)?
        .ok_or_else(|| ExitError::new(1, format!("job not found: {id}")))?;
    let verdict = engine.can_retry(&job, args.force);
    match format {
        OutputFormat::Text => {
            let label = if verdict.allowed { "allowed" } else { "denied" };
            print!(
                "{} {}",
                color::paint(label, Tone::of_verdict(verdict.allowed)),
                verdict.reason
            );
            match verdict.resume_stage {
                Some(stage) => println!(" (resume at {stage})"),
                None => println!(),
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": job.id,
            "allowed": verdict.allowed,
            "reason": verdict.reason,
            "resume_stage": verdict.resume_stage,
        }))?,
    }
    Ok(())
}

fn print_report(report: &RetryReport) {
    let plan = &report.plan;
    println!(
        "Retrying job {} ({}) from {}",
        color::header(report.job.id.as_str()),
        plan.strategy,
        plan.resume_stage
    );
    if !report.corrupted.is_empty() {
        let names: Vec<String> = report.corrupted.iter().map(|a| a.file_name()).collect();
        println!("  {} {}", color::label("Discarded corrupt:"), names.join(", "));
    }
    if !plan.delete.is_empty() {
        let names: Vec<String> = plan.delete.iter().map(|a| a.file_name()).collect();
        println!("  {} {}", color::label("Cleared:"), names.join(", "));
    }
    if report.reverted > 0 {
        println!(
            "  {} {} knowledge-store change(s)",
            color::label("Reverted:"),
            report.reverted
        );
    }
    println!(
        "  {} {}/{}",
        color::label("Retries:"),
        report.job.retry_count,
        report.job.max_retries
    );
}

pub async fn retry(ctx: Context, args: RetryArgs, format: OutputFormat) -> Result<()> {
    let id = JobId::new(&args.id);
    let engine = engine(&ctx, &id)?;
    if args.check {
        return check(&ctx, &engine, &args, format);
    }

    let report = match engine.retry(&id, &args.options()) {
        Ok(report) => report,
        Err(RetryError::Denied(reason)) => {
            let hint = if args.force {
                String::new()
            } else {
                " (use --force to override)".to_string()
            };
            return Err(ExitError::new(1, format!("retry denied: {reason}{hint}")).into());
        }
        Err(e @ (RetryError::NotFound(_) | RetryError::InvalidOverride { .. })) => {
            return Err(ExitError::new(1, e.to_string()).into());
        }
        Err(e) => return Err(e.into()),
    };

    let backend = Backend::open(ctx.clone(), args.in_process)?;
    let started = backend.jobs().resume(&id)?;
    let worker = if started {
        backend.finish(&id).await?
    } else {
        None
    };

    match format {
        OutputFormat::Text => {
            print_report(&report);
            if !started {
                println!(
                    "Job left at {}; start it with: rj resume {}",
                    report.job.status, id
                );
            } else if worker.is_some() {
                if let Some(job) = ctx.store().reload(&id)? {
                    println!(
                        "  {} {}",
                        color::label("Status:"),
                        color::paint(job.status.as_str(), Tone::of_job(&job))
                    );
                }
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": id,
            "plan": report.plan,
            "corrupted": report.corrupted,
            "reverted": report.reverted,
            "retry_count": report.job.retry_count,
            "started": started,
            "worker": worker,
        }))?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
