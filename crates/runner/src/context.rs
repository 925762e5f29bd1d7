// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-directory context shared by both backends and the worker binary.

use crate::env;
use crate::error::SchedulerError;
use rj_adapters::{CommandServices, TracedServices};
use rj_core::{Clock, Config, Job, JobId, OwnerId, SystemClock};
use rj_engine::log_paths::{config_path, config_snapshot_path, jobs_dir, logs_dir};
use rj_engine::{CancelToken, DriverConfig, DriverOutcome, JobLogger, RunMode, StageDriver};
use rj_storage::{read_json, write_json_atomic, ReadJson, TaskStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Context {
    state_dir: PathBuf,
    config: Config,
    store: Arc<TaskStore>,
    logger: JobLogger,
}

impl Context {
    /// Open the state directory, loading `rj.toml` if present.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let state_dir = state_dir.into();
        let config = Config::load(&config_path(&state_dir))?;
        Self::with_config(state_dir, config)
    }

    pub fn with_config(state_dir: impl Into<PathBuf>, config: Config) -> Result<Self, SchedulerError> {
        let state_dir = state_dir.into();
        let store = TaskStore::open(jobs_dir(&state_dir))?;
        let logger = JobLogger::new(logs_dir(&state_dir));
        Ok(Self {
            state_dir,
            config,
            store: Arc::new(store),
            logger,
        })
    }

    /// Use an existing store instead of opening one.
    pub fn with_store(mut self, store: Arc<TaskStore>) -> Self {
        self.store = store;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn log_path(&self, id: &JobId) -> PathBuf {
        self.logger.path(id.as_str())
    }

    /// Grace period before SIGKILL; the environment wins over `rj.toml`.
    pub fn terminate_timeout(&self) -> Duration {
        env::terminate_timeout_ms().unwrap_or_else(|| self.config.terminate_timeout())
    }

    /// Create the PENDING record and snapshot the config next to it.
    pub fn create_job(&self, owner: &OwnerId, seed: &Value) -> Result<Job, SchedulerError> {
        let job = self
            .store
            .create(owner, seed, self.config.max_retries, &SystemClock)?;
        let path = config_snapshot_path(&job.dir);
        write_json_atomic(&path, &self.config).map_err(|e| SchedulerError::io(&path, e))?;
        self.logger
            .append(job.id.as_str(), "job", &format!("submitted by {}", job.owner));
        Ok(job)
    }

    /// Config the job was submitted with. Jobs without a snapshot run with
    /// the current config.
    pub fn load_snapshot(&self, job_dir: &Path) -> Result<Config, SchedulerError> {
        let path = config_snapshot_path(job_dir);
        match read_json::<Config>(&path).map_err(|e| SchedulerError::io(&path, e))? {
            ReadJson::Parsed(config) => Ok(config),
            ReadJson::Missing => {
                tracing::warn!(path = %path.display(), "no config snapshot, using current config");
                Ok(self.config.clone())
            }
            ReadJson::Corrupt(source) => Err(SchedulerError::Snapshot { path, source }),
        }
    }

    /// Record a cancellation. Jobs with nothing left to do are untouched.
    /// Returns whether the record changed.
    pub fn mark_cancelled(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let Some(mut job) = self.store.reload(id)? else {
            return Err(SchedulerError::NotFound(id.clone()));
        };
        if !job.needs_work() {
            return Ok(false);
        }
        job.cancel(SystemClock.epoch_ms());
        self.store.save(&job)?;
        self.logger.append(
            id.as_str(),
            "job",
            &format!(
                "cancelled at {}",
                job.failed_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| job.status.to_string())
            ),
        );
        tracing::info!(job_id = %id, "job marked cancelled");
        Ok(true)
    }

    /// Run the stage driver for `id` with the job's config snapshot.
    pub async fn drive(
        &self,
        id: &JobId,
        mode: RunMode,
        cancel: CancelToken,
    ) -> Result<DriverOutcome, SchedulerError> {
        let dir = self.store.job_dir(id);
        let config = self.load_snapshot(&dir)?;
        let services = TracedServices::new(CommandServices::from_config(&config));
        let driver = StageDriver::new(
            Arc::clone(&self.store),
            services,
            SystemClock,
            DriverConfig::from_config(&config, &self.state_dir),
            self.logger.clone(),
        )
        .with_cancel(cancel);
        Ok(driver.run(id, mode).await?)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
