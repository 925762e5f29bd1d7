// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Relay Jobs execution engine: stage driver, retry engine and the shared
//! knowledge store

mod classify;
mod driver;
mod error;
mod job_logger;
pub mod knowledge;
pub mod log_paths;
mod retry;

pub use classify::ErrorClassifier;
pub use driver::{CancelToken, DriverConfig, DriverOutcome, RunMode, StageDriver};
pub use error::{DriverError, RetryError};
pub use job_logger::JobLogger;
pub use knowledge::{KnowledgeError, KnowledgeStore, UpdateLog};
pub use retry::{
    NoWorkers, RetryCheck, RetryEngine, RetryOptions, RetryReport, WorkerLiveness,
};
