// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage services backed by configured external commands.
//!
//! The stage input is written to the command's stdin as JSON and stdout is
//! parsed as the artifact body. A stage with no configured command passes its
//! input through unchanged, except curating, which yields an empty mutation
//! list.

use super::{StageError, StageInput, StageServices};
use crate::subprocess::{run_with_input, SubprocessError};
use async_trait::async_trait;
use rj_core::{Config, Stage, StageCommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

#[derive(Clone, Default)]
pub struct CommandServices {
    commands: Arc<BTreeMap<Stage, StageCommand>>,
}

impl CommandServices {
    pub fn from_config(config: &Config) -> Self {
        let commands = Stage::ALL
            .into_iter()
            .filter_map(|stage| config.stage_command(stage).map(|cmd| (stage, cmd.clone())))
            .collect();
        Self {
            commands: Arc::new(commands),
        }
    }

    pub fn is_configured(&self, stage: Stage) -> bool {
        self.commands.contains_key(&stage)
    }

    fn passthrough(stage: Stage, input: &StageInput) -> Result<Value, StageError> {
        if stage == Stage::Curating {
            return Ok(json!({ "mutations": [] }));
        }
        serde_json::to_value(input).map_err(|e| StageError::InvalidOutput {
            stage,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl StageServices for CommandServices {
    async fn run(&self, stage: Stage, input: &StageInput) -> Result<Value, StageError> {
        let Some(configured) = self.commands.get(&stage) else {
            tracing::debug!(%stage, "no command configured, passing input through");
            return Self::passthrough(stage, input);
        };
        let Some((program, args)) = configured.command.split_first() else {
            return Err(StageError::Spawn {
                stage,
                message: "empty command".to_string(),
            });
        };

        let payload = serde_json::to_vec(input).map_err(|e| StageError::InvalidOutput {
            stage,
            message: e.to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&configured.env)
            .env("RJ_JOB_ID", input.job_id.as_str())
            .env("RJ_STAGE", stage.as_str());
        if !input.dir.as_os_str().is_empty() {
            cmd.current_dir(&input.dir)
                .env("RJ_JOB_DIR", &input.dir);
        }

        let timeout = configured.timeout_ms.map(Duration::from_millis);
        let output = run_with_input(cmd, payload, timeout)
            .await
            .map_err(|e| match e {
                SubprocessError::Spawn(source) => StageError::Spawn {
                    stage,
                    message: source.to_string(),
                },
                SubprocessError::Io(source) => StageError::Failed {
                    stage,
                    message: source.to_string(),
                },
                SubprocessError::Timeout(limit) => StageError::Timeout {
                    stage,
                    timeout_ms: limit.as_millis() as u64,
                },
            })?;

        if !output.status.success() {
            return Err(StageError::CommandFailed {
                stage,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(StageError::InvalidOutput {
                stage,
                message: "command produced no output".to_string(),
            });
        }
        let body: Value = serde_json::from_str(stdout).map_err(|e| StageError::InvalidOutput {
            stage,
            message: e.to_string(),
        })?;
        if body.is_null() {
            return Err(StageError::InvalidOutput {
                stage,
                message: "command produced a null body".to_string(),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
