// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rj - Relay Jobs CLI

mod color;
mod commands;
mod env;
mod exit_error;
mod output;
mod table;

use output::OutputFormat;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use commands::{job, retry, serve};
use rj_runner::Context;

#[derive(Parser)]
#[command(
    name = "rj",
    version,
    about = "Relay Jobs - staged request pipelines with durable retries"
)]
struct Cli {
    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job from a seed payload and start a worker for it
    Submit(job::SubmitArgs),
    /// Continue a job from its last persisted stage (confirms parked jobs)
    Resume(job::ResumeArgs),
    /// Cancel a job and stop its worker
    Cancel(job::IdArgs),
    /// Show a job's status and whether its worker is alive
    Status(job::IdArgs),
    /// Show recent lines of a job's log
    Logs(job::LogsArgs),
    /// List jobs
    List(job::ListArgs),
    /// Show a job's full record
    Show(job::IdArgs),
    /// Retry a failed, cancelled or interrupted job
    Retry(retry::RetryArgs),
    /// Resume unfinished jobs inside this process until idle
    Serve(serve::ServeArgs),
}

pub(crate) fn cli_command() -> clap::Command {
    Cli::command()
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {}", msg);
        }
        std::process::exit(code);
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, we skip
/// the "Caused by" chain to avoid noisy duplicate output (common when
/// thiserror variants use `#[error("... {0}")]` with `#[from]`).
/// Otherwise we render the full chain so context isn't lost.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));

    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    let Some(command) = cli.command else {
        // No subcommand provided: print help and exit 0
        cli_command().print_help()?;
        println!();
        return Ok(());
    };

    let ctx = Context::open(rj_runner::env::state_dir()?)?;

    match command {
        Commands::Submit(args) => job::submit(ctx, args, format).await?,
        Commands::Resume(args) => job::resume(ctx, args, format).await?,
        Commands::Cancel(args) => job::cancel(ctx, args, format)?,
        Commands::Status(args) => job::status(ctx, args, format)?,
        Commands::Logs(args) => job::logs(ctx, args, format)?,
        Commands::List(args) => job::list(ctx, args, format)?,
        Commands::Show(args) => job::show(ctx, args, format)?,
        Commands::Retry(args) => retry::retry(ctx, args, format).await?,
        Commands::Serve(args) => serve::serve(ctx, args, format).await?,
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
