// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    seconds = { 59, "59s" },
    minutes = { 125, "2m" },
    whole_hours = { 7200, "2h" },
    hours_and_minutes = { 5400, "1h30m" },
    days = { 3 * 86400 + 5, "3d" },
)]
fn elapsed(secs: u64, expected: &str) {
    assert_eq!(format_elapsed(secs), expected);
}

#[parameterized(
    sub_minute = { 0, Some(42_000), "42s" },
    minutes = { 1_000, Some(1_000 + 125_000), "2m 5s" },
    hours = { 0, Some(3_900_000), "1h 5m" },
)]
fn stage_duration(start: u64, end: Option<u64>, expected: &str) {
    assert_eq!(format_duration(start, end), expected);
}

#[test]
fn time_ago_unset_is_dash() {
    assert_eq!(format_time_ago(0), "-");
}

#[test]
fn truncate_marks_cut() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long error message", 10), "a long ...");
}

#[test]
fn display_log_json_and_text() {
    let lines = vec!["one".to_string(), "two".to_string()];
    let path = std::path::Path::new("/tmp/x.log");
    assert!(display_log(path, &lines, OutputFormat::Json, "j").is_ok());
    assert!(display_log(path, &[], OutputFormat::Text, "j").is_ok());
}
