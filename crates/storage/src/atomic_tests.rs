// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    count: u32,
}

#[test]
fn write_then_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("sample.json");
    let sample = Sample {
        name: "a".to_string(),
        count: 2,
    };

    write_json_atomic(&path, &sample).unwrap();

    match read_json::<Sample>(&path).unwrap() {
        ReadJson::Parsed(loaded) => assert_eq!(loaded, sample),
        other => panic!("unexpected read result: {other:?}"),
    }
}

#[test]
fn temp_file_is_gone_after_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");

    write_json_atomic(&path, &serde_json::json!({"k": 1})).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("sample.json")]);
}

#[test]
fn overwrite_replaces_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");

    write_json_atomic(&path, &serde_json::json!({"v": 1})).unwrap();
    write_json_atomic(&path, &serde_json::json!({"v": 2})).unwrap();

    let ReadJson::Parsed(value) = read_json::<serde_json::Value>(&path).unwrap() else {
        panic!("expected parsed value");
    };
    assert_eq!(value["v"], 2);
}

#[test]
fn missing_file() {
    let dir = tempdir().unwrap();
    let result = read_json::<Sample>(&dir.path().join("absent.json")).unwrap();
    assert!(matches!(result, ReadJson::Missing));
}

#[test]
fn truncated_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");
    std::fs::write(&path, b"{\"name\": \"a\", \"cou").unwrap();

    let result = read_json::<Sample>(&path).unwrap();
    assert!(matches!(result, ReadJson::Corrupt(_)));
}
