// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake stage services for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{StageError, StageInput, StageServices};
use async_trait::async_trait;
use parking_lot::Mutex;
use rj_core::Stage;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Recorded call to FakeStageServices
#[derive(Debug, Clone)]
pub struct StageCall {
    pub stage: Stage,
    pub input: StageInput,
}

type Hook = Arc<dyn Fn(&StageInput) + Send + Sync>;

struct Failure {
    remaining: Option<u32>,
    message: String,
}

#[derive(Default)]
struct FakeStageState {
    calls: Vec<StageCall>,
    outputs: HashMap<Stage, Value>,
    failures: HashMap<Stage, Failure>,
    hooks: HashMap<Stage, Hook>,
}

/// Fake stage services for testing
///
/// Produces a deterministic body per stage unless one is set, can fail chosen
/// stages a fixed number of times, and records every call.
#[derive(Clone, Default)]
pub struct FakeStageServices {
    inner: Arc<Mutex<FakeStageState>>,
}

impl FakeStageServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StageCall> {
        self.inner.lock().calls.clone()
    }

    /// Stages run so far, in order
    pub fn stages_run(&self) -> Vec<Stage> {
        self.inner.lock().calls.iter().map(|c| c.stage).collect()
    }

    pub fn set_output(&self, stage: Stage, body: Value) {
        self.inner.lock().outputs.insert(stage, body);
    }

    /// Fail the next `times` runs of `stage`
    pub fn fail(&self, stage: Stage, times: u32, message: impl Into<String>) {
        self.inner.lock().failures.insert(
            stage,
            Failure {
                remaining: Some(times),
                message: message.into(),
            },
        );
    }

    /// Fail every run of `stage`
    pub fn fail_always(&self, stage: Stage, message: impl Into<String>) {
        self.inner.lock().failures.insert(
            stage,
            Failure {
                remaining: None,
                message: message.into(),
            },
        );
    }

    /// Run `hook` when `stage` starts, before its result is produced
    pub fn on_run(&self, stage: Stage, hook: impl Fn(&StageInput) + Send + Sync + 'static) {
        self.inner.lock().hooks.insert(stage, Arc::new(hook));
    }

    fn default_output(stage: Stage, input: &StageInput) -> Value {
        match stage {
            Stage::Curating => json!({
                "mutations": [{
                    "op": "add",
                    "key": input.job_id.as_str(),
                    "content": format!("lesson from {}", input.job_id),
                }]
            }),
            _ => json!({
                "stage": stage.as_str(),
                "job_id": input.job_id.as_str(),
                "inputs": input.artifacts.keys().map(|a| a.name()).collect::<Vec<_>>(),
            }),
        }
    }
}

#[async_trait]
impl StageServices for FakeStageServices {
    async fn run(&self, stage: Stage, input: &StageInput) -> Result<Value, StageError> {
        let hook = {
            let mut inner = self.inner.lock();
            inner.calls.push(StageCall {
                stage,
                input: input.clone(),
            });
            inner.hooks.get(&stage).cloned()
        };
        if let Some(hook) = hook {
            hook(input);
        }

        let mut inner = self.inner.lock();
        if let Some(failure) = inner.failures.get_mut(&stage) {
            let message = failure.message.clone();
            match failure.remaining.as_mut() {
                None => return Err(StageError::Failed { stage, message }),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return Err(StageError::Failed { stage, message });
                }
            }
        }
        Ok(inner
            .outputs
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Self::default_output(stage, input)))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
