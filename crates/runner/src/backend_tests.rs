// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;
use yare::parameterized;

fn write_lines(dir: &TempDir, count: usize) -> std::path::PathBuf {
    let path = dir.path().join("job.log");
    let body: String = (1..=count).map(|i| format!("line {i}\n")).collect();
    std::fs::write(&path, body).unwrap();
    path
}

#[parameterized(
    fewer_than_file = { 10, 3, 8 },
    exactly_file = { 3, 3, 1 },
    more_than_file = { 2, 5, 1 },
)]
fn tail_keeps_last_lines(total: usize, tail: usize, first: usize) {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, total);
    let lines = tail_lines(&path, tail).unwrap();
    assert_eq!(lines.len(), tail.min(total));
    assert_eq!(lines[0], format!("line {first}"));
    assert_eq!(lines.last().unwrap(), &format!("line {total}"));
}

#[test]
fn tail_zero_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, 4);
    assert!(tail_lines(&path, 0).unwrap().is_empty());
}

#[test]
fn tail_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(tail_lines(&dir.path().join("absent.log"), 5)
        .unwrap()
        .is_empty());
}

#[test]
fn tail_tolerates_invalid_utf8() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.log");
    std::fs::write(&path, b"ok\n\xff\xfe bytes\n").unwrap();
    let lines = tail_lines(&path, 5).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with("bytes"));
}

#[test]
fn worker_status_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&WorkerStatus::NotFound).unwrap(),
        "\"not_found\""
    );
    assert_eq!(WorkerStatus::Running.to_string(), "running");
}
