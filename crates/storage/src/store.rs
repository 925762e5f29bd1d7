// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable task store.
//!
//! One directory per job under the job root, holding `job.json` (the record),
//! `seed.json` (the submitted payload) and the stage artifacts. The record
//! file is the source of truth. The in-memory cache is keyed by file
//! modification time and size, so a record rewritten by another process is
//! reloaded on the next `get`.

use crate::atomic::{read_json, write_json_atomic, ReadJson};
use parking_lot::Mutex;
use rj_core::{Clock, IdGen, Job, JobConfig, JobId, OwnerId, UuidIdGen};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

pub const RECORD_FILE: &str = "job.json";
pub const SEED_FILE: &str = "seed.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Corrupt records are a non-retryable validation failure; the store
    /// never attempts repair.
    #[error("corrupt job record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid job id: {0}")]
    InvalidId(String),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> std::io::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                modified: meta.modified().ok(),
                len: meta.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

struct Cached {
    job: Job,
    stamp: FileStamp,
}

/// File-backed store of job records.
pub struct TaskStore {
    root: PathBuf,
    id_gen: Box<dyn IdGen>,
    cache: Mutex<HashMap<JobId, Cached>>,
}

impl TaskStore {
    /// Open the store rooted at `root`, creating it if needed, and rebuild
    /// the in-memory view by scanning existing job directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_id_gen(root, UuidIdGen)
    }

    pub fn with_id_gen(
        root: impl Into<PathBuf>,
        id_gen: impl IdGen + 'static,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        let store = Self {
            root,
            id_gen: Box::new(id_gen),
            cache: Mutex::new(HashMap::new()),
        };
        let jobs = store.list()?;
        tracing::debug!(root = %store.root.display(), jobs = jobs.len(), "task store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the record and artifacts of `id`.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(RECORD_FILE)
    }

    /// Allocate an id, create the job directory, store the seed, and write
    /// the initial `PENDING` record.
    pub fn create(
        &self,
        owner: &OwnerId,
        seed: &Value,
        max_retries: u32,
        clock: &impl Clock,
    ) -> Result<Job, StoreError> {
        let id = self.id_gen.next();
        if !id.is_valid() {
            return Err(StoreError::InvalidId(id.0));
        }

        let dir = self.job_dir(&id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(id));
            }
            Err(e) => return Err(StoreError::io(&dir, e)),
        }

        let seed_path = dir.join(SEED_FILE);
        write_json_atomic(&seed_path, seed).map_err(|e| StoreError::io(&seed_path, e))?;

        let config = JobConfig::builder(id, owner.clone())
            .dir(dir)
            .max_retries(max_retries)
            .build();
        let job = Job::new(config, clock);
        self.save(&job)?;
        tracing::info!(job_id = %job.id, owner = %job.owner, "job created");
        Ok(job)
    }

    /// Load a record, serving the cached copy only while the file on disk is
    /// unchanged. Absence is `Ok(None)`.
    pub fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        if !id.is_valid() {
            return Ok(None);
        }
        let path = self.record_path(id);
        let stamp = FileStamp::of(&path).map_err(|e| StoreError::io(&path, e))?;
        let Some(stamp) = stamp else {
            self.cache.lock().remove(id);
            return Ok(None);
        };

        if let Some(cached) = self.cache.lock().get(id) {
            if cached.stamp == stamp {
                return Ok(Some(cached.job.clone()));
            }
        }
        self.load(id, &path)
    }

    /// Drop any cached copy and read the record from disk.
    pub fn reload(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.cache.lock().remove(id);
        if !id.is_valid() {
            return Ok(None);
        }
        let path = self.record_path(id);
        self.load(id, &path)
    }

    fn load(&self, id: &JobId, path: &Path) -> Result<Option<Job>, StoreError> {
        let stamp = FileStamp::of(path).map_err(|e| StoreError::io(path, e))?;
        match read_json::<Job>(path).map_err(|e| StoreError::io(path, e))? {
            ReadJson::Missing => {
                self.cache.lock().remove(id);
                Ok(None)
            }
            ReadJson::Corrupt(source) => Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
            ReadJson::Parsed(job) => {
                if let Some(stamp) = stamp {
                    self.cache.lock().insert(
                        id.clone(),
                        Cached {
                            job: job.clone(),
                            stamp,
                        },
                    );
                }
                Ok(Some(job))
            }
        }
    }

    /// Atomically overwrite the record file.
    pub fn save(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.record_path(&job.id);
        write_json_atomic(&path, job).map_err(|e| StoreError::io(&path, e))?;
        if let Ok(Some(stamp)) = FileStamp::of(&path) {
            self.cache.lock().insert(
                job.id.clone(),
                Cached {
                    job: job.clone(),
                    stamp,
                },
            );
        }
        Ok(())
    }

    /// Payload the job was submitted with.
    pub fn read_seed(&self, id: &JobId) -> Result<Value, StoreError> {
        let path = self.job_dir(id).join(SEED_FILE);
        match read_json::<Value>(&path).map_err(|e| StoreError::io(&path, e))? {
            ReadJson::Parsed(seed) => Ok(seed),
            ReadJson::Missing => Ok(Value::Null),
            ReadJson::Corrupt(source) => Err(StoreError::Corrupt { path, source }),
        }
    }

    /// Every readable job, oldest first. Corrupt records are skipped with a
    /// warning.
    pub fn list(&self) -> Result<Vec<Job>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut jobs = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(JobId::from) else {
                continue;
            };
            match self.get(&name) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %name, error = %e, "skipping unreadable job record");
                }
            }
        }
        jobs.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    pub fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|job| &job.owner == owner)
            .collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
