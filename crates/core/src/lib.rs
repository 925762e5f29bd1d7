// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rj-core: job records, stage tables and retry plans for Relay Jobs

pub mod clock;
pub mod config;
pub mod id;
pub mod job;
pub mod plan;
pub mod stage;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
pub use config::{Config, ConfigError, FeedbackConfig, StageCommand};
pub use id::{IdGen, JobId, OwnerId, SequentialIdGen, UuidIdGen};
pub use job::{
    FeedbackStatus, Job, JobConfig, JobStatus, RetryAttempt, StageOutcome, StageRecord,
};
pub use plan::{RetryPlan, RetryStrategy, SideEffectAction};
pub use stage::{Artifact, Stage, UnknownStage};
