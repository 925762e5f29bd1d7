// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;

#[test]
fn job_id_display_and_as_str() {
    let id = JobId::new("abc123");
    assert_eq!(id.to_string(), "abc123");
    assert_eq!(id.as_str(), "abc123");
    assert_eq!(id, "abc123");
}

#[test]
fn job_id_serializes_as_plain_string() {
    let id = JobId::new("my-job");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-job\"");

    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn short_truncates_on_char_boundary() {
    let id = JobId::new("0123456789");
    assert_eq!(id.short(4), "0123");
    assert_eq!(id.short(20), "0123456789");
}

#[yare::parameterized(
    uuid_simple   = { "3f2a9c0d4b5e4f1a8c7d6e5f4a3b2c1d", true },
    sequential    = { "job-12",                            true },
    underscore    = { "job_12",                            true },
    empty         = { "",                                  false },
    dot           = { ".",                                 false },
    dotdot        = { "..",                                false },
    slash         = { "a/b",                               false },
    space         = { "a b",                               false },
)]
fn job_id_validity(raw: &str, expected: bool) {
    assert_eq!(JobId::new(raw).is_valid(), expected);
}

#[test]
fn uuid_ids_are_unique_and_valid() {
    let gen = UuidIdGen;
    let ids: HashSet<JobId> = (0..100).map(|_| gen.next()).collect();
    assert_eq!(ids.len(), 100);
    assert!(ids.iter().all(JobId::is_valid));
}

#[test]
fn sequential_ids_count_up() {
    let gen = SequentialIdGen::new("t");
    assert_eq!(gen.next(), "t-1");
    assert_eq!(gen.next(), "t-2");

    let cloned = gen.clone();
    assert_eq!(cloned.next(), "t-3");
}
