// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for Relay Jobs: job records and stage artifacts on disk

mod artifacts;
mod atomic;
mod store;

pub use artifacts::{ArtifactDir, ArtifactEnvelope, ArtifactError};
pub use atomic::{read_json, write_json_atomic, ReadJson};
pub use store::{StoreError, TaskStore, RECORD_FILE, SEED_FILE};
