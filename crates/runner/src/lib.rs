// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Relay Jobs runner: scheduling backends, worker supervision and the
//! single-instance guard

mod backend;
mod context;
pub mod env;
mod error;
pub mod guard;
mod in_process;
pub mod logging;
pub mod pidfile;
mod process;

pub use backend::{tail_lines, JobBackend, WorkerStatus};
pub use context::Context;
pub use error::{GuardError, SchedulerError};
pub use guard::{read_liveness, InstanceGuard, Liveness};
pub use in_process::InProcessBackend;
pub use pidfile::{Claim, PidLiveness, PidRecord};
pub use process::ProcessBackend;
