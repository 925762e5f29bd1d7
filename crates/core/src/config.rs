// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator configuration loaded from `rj.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Workers never read the live file: the scheduler snapshots the config into
//! the job directory at submit time and the worker loads that snapshot.

use crate::stage::{Stage, UnknownStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    UnknownStage(#[from] UnknownStage),
    #[error("invalid config: stage {0} has an empty command")]
    EmptyCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retries allowed for a failed job before `force` is required.
    pub max_retries: u32,
    /// Grace period between SIGTERM and SIGKILL when terminating a worker.
    pub terminate_timeout_ms: u64,
    /// In-process runner exits after this long without work.
    pub idle_timeout_ms: u64,
    /// Interval between liveness heartbeats of the in-process runner.
    pub heartbeat_ms: u64,
    /// Skip the suspension at `AWAITING_CONFIRM`.
    pub auto_confirm: bool,
    pub feedback: FeedbackConfig,
    /// Shared knowledge store mutated by the curating stage.
    /// Defaults to `<state_dir>/knowledge.json`.
    pub knowledge_store: Option<PathBuf>,
    /// Error patterns (regex) that make a failed job non-retryable without
    /// `force`.
    pub non_retryable_patterns: Vec<String>,
    /// External command per stage, keyed by stage name.
    pub stages: BTreeMap<String, StageCommand>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Run evaluate → reflect → curate after a job completes.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    /// Program and arguments. The stage input arrives on stdin as JSON; the
    /// artifact body is read from stdout as JSON.
    pub command: Vec<String>,
    /// Optional limit enforced by the adapter. Stages have no limit
    /// otherwise.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Extra environment for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Patterns covering configuration, authorization and missing-resource
/// failures.
pub fn default_non_retryable_patterns() -> Vec<String> {
    [
        r"(?i)no command configured",
        r"(?i)invalid (config|configuration)",
        r"(?i)\bapi[_ -]?key\b",
        r"(?i)unauthori[sz]ed",
        r"(?i)authentication failed",
        r"(?i)permission denied",
        r"(?i)forbidden",
        r"\b(401|403|404)\b",
        r"(?i)no such file or directory",
        r"(?i)resource not found",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 3,
            terminate_timeout_ms: 5_000,
            idle_timeout_ms: 30_000,
            heartbeat_ms: 2_000,
            auto_confirm: false,
            feedback: FeedbackConfig::default(),
            knowledge_store: None,
            non_retryable_patterns: default_non_retryable_patterns(),
            stages: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject stage tables naming unknown stages or empty commands.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, stage) in &self.stages {
            name.parse::<Stage>()?;
            if stage.command.is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
        }
        Ok(())
    }

    /// Command configured for `stage`, if any.
    pub fn stage_command(&self, stage: Stage) -> Option<&StageCommand> {
        self.stages
            .iter()
            .find(|(name, _)| name.parse::<Stage>().ok() == Some(stage))
            .map(|(_, cmd)| cmd)
    }

    /// Knowledge store path, resolved against the state directory.
    pub fn knowledge_store_path(&self, state_dir: &Path) -> PathBuf {
        match &self.knowledge_store {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => state_dir.join(path),
            None => state_dir.join("knowledge.json"),
        }
    }

    pub fn terminate_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
