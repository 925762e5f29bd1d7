// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::stages::{StageError, StageInput, StageServices};
use async_trait::async_trait;
use rj_core::Stage;
use serde_json::Value;
use tracing::Instrument;

/// Wrapper that adds tracing to any StageServices
#[derive(Clone)]
pub struct TracedServices<S> {
    inner: S,
}

impl<S> TracedServices<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StageServices> StageServices for TracedServices<S> {
    async fn run(&self, stage: Stage, input: &StageInput) -> Result<Value, StageError> {
        let span = tracing::info_span!("stage.run", job_id = %input.job_id, %stage);
        async {
            tracing::info!(inputs = input.artifacts.len(), "starting");
            let start = std::time::Instant::now();
            let result = self.inner.run(stage, input).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => tracing::info!(elapsed_ms, "stage finished"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "stage failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
