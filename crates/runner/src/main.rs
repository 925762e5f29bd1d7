// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay Jobs Worker (rjw)
//!
//! Drives one job until it suspends, settles, or is cancelled, then exits.
//! Started by the `rj` scheduler in its own process group with stdout and
//! stderr appended to the job log.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use rj_core::JobId;
use rj_engine::log_paths::pid_path;
use rj_engine::{CancelToken, RunMode};
use rj_runner::{env, logging, Claim, Context, PidRecord};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Exit status when another live worker owns the job.
const EXIT_BUSY: i32 = 3;
/// Exit status for usage and setup errors.
const EXIT_USAGE: i32 = 2;

fn print_help() {
    println!("rjw {}", env!("CARGO_PKG_VERSION"));
    println!("Relay Jobs Worker - drives one job through its stages");
    println!();
    println!("USAGE:");
    println!("    rjw <JOB_ID> [--resume]");
    println!();
    println!("The worker is started by the `rj` CLI and should not be");
    println!("invoked directly. It reads the job from RJ_STATE_DIR and");
    println!("exits when the job suspends, settles, or is cancelled.");
    println!();
    println!("OPTIONS:");
    println!("    --resume         Continue a suspended or interrupted job");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

enum Args {
    Run { id: JobId, mode: RunMode },
    Exit(i32),
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Args {
    let mut id = None;
    let mut mode = RunMode::Fresh;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("rjw {}", env!("CARGO_PKG_VERSION"));
                return Args::Exit(0);
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Args::Exit(0);
            }
            "--resume" => mode = RunMode::Resume,
            other if other.starts_with('-') || id.is_some() => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: rjw <JOB_ID> [--resume]");
                return Args::Exit(EXIT_USAGE);
            }
            other => id = Some(JobId::new(other)),
        }
    }
    match id {
        Some(id) => Args::Run { id, mode },
        None => {
            eprintln!("error: missing job id");
            eprintln!("Usage: rjw <JOB_ID> [--resume]");
            Args::Exit(EXIT_USAGE)
        }
    }
}

#[tokio::main]
async fn main() {
    let (id, mode) = match parse_args(std::env::args().skip(1)) {
        Args::Run { id, mode } => (id, mode),
        Args::Exit(code) => std::process::exit(code),
    };

    // Startup marker, before tracing, so every run is visible in the log.
    println!(
        "--- rjw: starting (pid: {}, job: {}, mode: {})",
        std::process::id(),
        id,
        mode
    );
    logging::init_worker_logging();

    std::process::exit(run(id, mode).await);
}

async fn run(id: JobId, mode: RunMode) -> i32 {
    let ctx = match env::state_dir().and_then(Context::open) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "failed to open state directory");
            return EXIT_USAGE;
        }
    };

    let job_dir = ctx.store().job_dir(&id);
    match ctx.store().get(&id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            error!(job_id = %id, "job not found");
            return EXIT_USAGE;
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to load job");
            return 1;
        }
    }

    // The worker is the only writer of its pid file. Refuse to run beside
    // another live worker for the same job.
    match PidRecord::current().claim(&pid_path(&job_dir)) {
        Ok(Claim::Acquired) => {}
        Ok(Claim::Busy(other)) => {
            error!(job_id = %id, pid = other.pid, "another worker owns this job");
            return EXIT_BUSY;
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to claim pid file");
            return 1;
        }
    }

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to install signal handlers");
                return 1;
            }
        };

    let cancel = CancelToken::new();
    tokio::select! {
        result = ctx.drive(&id, mode, cancel.clone()) => match result {
            Ok(outcome) => {
                info!(job_id = %id, ?outcome, "worker finished");
                outcome.exit_code()
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "worker failed");
                ctx.logger().append(id.as_str(), "job", &format!("worker error: {e}"));
                1
            }
        },
        _ = sigterm.recv() => {
            // Whoever sent the signal records the cancellation.
            info!(job_id = %id, "received SIGTERM, stopping");
            cancel.cancel();
            128 + 15
        }
        _ = sigint.recv() => {
            info!(job_id = %id, "received SIGINT, stopping");
            cancel.cancel();
            128 + 2
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
