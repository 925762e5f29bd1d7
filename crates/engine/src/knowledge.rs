// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared knowledge store mutated by the curating stage.
//!
//! A single JSON object keyed by entry name. Every read-modify-write holds
//! an exclusive lock on `<store>.lock`, so concurrent curating stages of
//! different jobs serialize instead of losing updates.

use fs2::FileExt;
use rj_storage::{read_json, write_json_atomic, ReadJson};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge store {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt knowledge store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid mutations: {0}")]
    InvalidMutations(String),
    #[error("failed to record update log: {0}")]
    Journal(String),
}

/// A change requested by the curating stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Add { key: String, content: Value },
    Update { key: String, content: Value },
    Remove { key: String },
}

/// A change actually made, with whatever it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Applied {
    Added {
        key: String,
        content: Value,
    },
    Updated {
        key: String,
        previous: Value,
        content: Value,
    },
    Removed {
        key: String,
        previous: Value,
    },
}

/// Body of the `update_log` artifact.
///
/// The log is recorded with `complete: false` before the store is
/// rewritten. Rolling back is safe whether or not that rewrite happened,
/// since every entry carries the state it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLog {
    pub store: PathBuf,
    pub applied: Vec<Applied>,
    #[serde(default)]
    pub complete: bool,
}

/// Extract the mutation list from a curate body: `{"mutations": [...]}`.
pub fn parse_mutations(body: &Value) -> Result<Vec<Mutation>, KnowledgeError> {
    let Some(list) = body.get("mutations") else {
        return Err(KnowledgeError::InvalidMutations(
            "missing \"mutations\" field".to_string(),
        ));
    };
    serde_json::from_value(list.clone()).map_err(|e| KnowledgeError::InvalidMutations(e.to_string()))
}

pub type Entries = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn io_err(&self, source: std::io::Error) -> KnowledgeError {
        KnowledgeError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Block until the store lock is held. Released when the file closes.
    fn lock(&self) -> Result<File, KnowledgeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_err(e))?;
        file.lock_exclusive().map_err(|e| self.io_err(e))?;
        Ok(file)
    }

    /// Current entries. A missing store is empty.
    pub fn entries(&self) -> Result<Entries, KnowledgeError> {
        match read_json::<Entries>(&self.path).map_err(|e| self.io_err(e))? {
            ReadJson::Missing => Ok(Entries::new()),
            ReadJson::Parsed(entries) => Ok(entries),
            ReadJson::Corrupt(source) => Err(KnowledgeError::Corrupt {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, entries: &Entries) -> Result<(), KnowledgeError> {
        write_json_atomic(&self.path, entries).map_err(|e| self.io_err(e))
    }

    /// Apply mutations under the store lock, returning what changed.
    ///
    /// `add` of an existing key and `update` of a missing key are both
    /// upserts; `remove` of a missing key is a no-op.
    pub fn apply(&self, mutations: &[Mutation]) -> Result<UpdateLog, KnowledgeError> {
        self.apply_logged(mutations, |_| Ok(()))
    }

    /// Like [`apply`](Self::apply), but hands the pending log to `record`
    /// before the store is touched. If `record` fails the store is left
    /// unchanged.
    pub fn apply_logged<F>(
        &self,
        mutations: &[Mutation],
        record: F,
    ) -> Result<UpdateLog, KnowledgeError>
    where
        F: FnOnce(&UpdateLog) -> Result<(), String>,
    {
        let _lock = self.lock()?;
        let mut entries = self.entries()?;
        let mut applied = Vec::with_capacity(mutations.len());

        for mutation in mutations {
            match mutation {
                Mutation::Add { key, content } | Mutation::Update { key, content } => {
                    match entries.insert(key.clone(), content.clone()) {
                        Some(previous) => applied.push(Applied::Updated {
                            key: key.clone(),
                            previous,
                            content: content.clone(),
                        }),
                        None => applied.push(Applied::Added {
                            key: key.clone(),
                            content: content.clone(),
                        }),
                    }
                }
                Mutation::Remove { key } => {
                    if let Some(previous) = entries.remove(key) {
                        applied.push(Applied::Removed {
                            key: key.clone(),
                            previous,
                        });
                    }
                }
            }
        }

        let mut log = UpdateLog {
            store: self.path.clone(),
            applied,
            complete: false,
        };
        record(&log).map_err(KnowledgeError::Journal)?;

        if !log.applied.is_empty() {
            self.write(&entries)?;
        }
        log.complete = true;
        tracing::debug!(store = %self.path.display(), applied = log.applied.len(), "knowledge store updated");
        Ok(log)
    }

    /// Revert a previous `apply` by replaying its log in reverse. Returns
    /// the number of entries restored.
    pub fn rollback(&self, log: &UpdateLog) -> Result<usize, KnowledgeError> {
        let _lock = self.lock()?;
        let mut entries = self.entries()?;

        for change in log.applied.iter().rev() {
            match change {
                Applied::Added { key, .. } => {
                    entries.remove(key);
                }
                Applied::Updated { key, previous, .. } | Applied::Removed { key, previous } => {
                    entries.insert(key.clone(), previous.clone());
                }
            }
        }

        if !log.applied.is_empty() {
            self.write(&entries)?;
        }
        tracing::info!(store = %self.path.display(), reverted = log.applied.len(), "knowledge store rolled back");
        Ok(log.applied.len())
    }
}

#[cfg(test)]
#[path = "knowledge_tests.rs"]
mod tests;
