// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe JSON file writes.
//!
//! Writers serialize to a sibling temp file, fsync it, then rename over the
//! target. A crash at any point leaves either the old file or the new one,
//! never a torn mix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temp path unique per process, so two processes racing on the same target
/// never share a temp file.
fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let result = (|| {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value).map_err(std::io::Error::other)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    // Make the rename itself durable.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Outcome of reading a JSON file that may be absent or damaged.
#[derive(Debug)]
pub enum ReadJson<T> {
    Missing,
    Parsed(T),
    Corrupt(serde_json::Error),
}

/// Read and parse `path`. IO errors other than not-found are returned as
/// errors; parse failures are reported as [`ReadJson::Corrupt`] so callers
/// decide what corruption means for them.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<ReadJson<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadJson::Missing),
        Err(e) => return Err(e),
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(value) => Ok(ReadJson::Parsed(value)),
        Err(e) if e.is_io() => Err(e.into()),
        Err(e) => Ok(ReadJson::Corrupt(e)),
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
