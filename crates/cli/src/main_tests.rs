// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::error::ErrorKind;
use clap::FromArgMatches;
use rj_core::Stage;
use yare::parameterized;

use super::{cli_command, format_error, Cli, Commands, OutputFormat};

fn parse(args: &[&str]) -> Cli {
    let matches = cli_command().try_get_matches_from(args).unwrap();
    Cli::from_arg_matches(&matches).unwrap()
}

fn parse_err(args: &[&str]) -> ErrorKind {
    match cli_command().try_get_matches_from(args) {
        Ok(_) => panic!("expected {args:?} to be rejected"),
        Err(e) => e.kind(),
    }
}

// -- Version flag -----------------------------------------------------------

#[parameterized(
    short = { "-V" },
    long = { "--version" },
)]
fn version_flag(flag: &str) {
    assert_eq!(parse_err(&["rj", flag]), ErrorKind::DisplayVersion);
}

#[test]
fn command_definition_is_valid() {
    cli_command().debug_assert();
}

// -- Subcommands ------------------------------------------------------------

#[test]
fn no_subcommand_parses() {
    assert!(parse(&["rj"]).command.is_none());
}

#[test]
fn submit_with_inline_seed() {
    let cli = parse(&["rj", "submit", "--seed", r#"{"q":"hi"}"#, "--owner", "alice"]);
    let Some(Commands::Submit(args)) = cli.command else {
        panic!("expected submit");
    };
    assert_eq!(args.seed.as_deref(), Some(r#"{"q":"hi"}"#));
    assert_eq!(args.owner.as_deref(), Some("alice"));
    assert!(!args.in_process);
}

#[test]
fn submit_rejects_seed_and_seed_file_together() {
    assert_eq!(
        parse_err(&["rj", "submit", "--seed", "{}", "--seed-file", "seed.json"]),
        ErrorKind::ArgumentConflict
    );
}

#[test]
fn output_flag_is_global() {
    let cli = parse(&["rj", "list", "-o", "json"]);
    assert_eq!(cli.output, OutputFormat::Json);
    let cli = parse(&["rj", "--output", "json", "show", "abc"]);
    assert_eq!(cli.output, OutputFormat::Json);
}

#[test]
fn list_defaults() {
    let Some(Commands::List(args)) = parse(&["rj", "list"]).command else {
        panic!("expected list");
    };
    assert_eq!(args.limit, 20);
    assert!(!args.no_limit);
    assert!(args.owner.is_none());
}

#[test]
fn logs_limit_short_flag() {
    let Some(Commands::Logs(args)) = parse(&["rj", "logs", "abc", "-n", "5"]).command else {
        panic!("expected logs");
    };
    assert_eq!(args.id, "abc");
    assert_eq!(args.limit, 5);
}

#[parameterized(
    verb = { "generate", Stage::Generating },
    upper = { "RETRIEVING", Stage::Retrieving },
    dashed = { "awaiting-confirm", Stage::AwaitingConfirm },
)]
fn retry_stage_override(value: &str, expected: Stage) {
    let Some(Commands::Retry(args)) = parse(&["rj", "retry", "abc", "--stage", value]).command
    else {
        panic!("expected retry");
    };
    assert_eq!(args.stage, Some(expected));
    assert!(!args.clean);
}

#[test]
fn retry_rejects_unknown_stage() {
    assert_eq!(
        parse_err(&["rj", "retry", "abc", "--stage", "deploy"]),
        ErrorKind::ValueValidation
    );
}

#[test]
fn retry_clean_conflicts_with_stage() {
    assert_eq!(
        parse_err(&["rj", "retry", "abc", "--clean", "--stage", "generate"]),
        ErrorKind::ArgumentConflict
    );
}

#[parameterized(
    resume = { "resume" },
    cancel = { "cancel" },
    status = { "status" },
    show = { "show" },
)]
fn id_commands_require_an_id(cmd: &str) {
    assert_eq!(
        parse_err(&["rj", cmd]),
        ErrorKind::MissingRequiredArgument
    );
}

// -- Error formatting -------------------------------------------------------

#[test]
fn format_error_skips_redundant_chain() {
    let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err = anyhow::Error::new(inner).context("read failed: no such file");
    assert_eq!(format_error(&err), "read failed: no such file");
}

#[test]
fn format_error_renders_distinct_causes() {
    let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err = anyhow::Error::new(inner).context("failed to read seed file");
    let msg = format_error(&err);
    assert!(msg.starts_with("failed to read seed file"));
    assert!(msg.contains("Caused by:\n    0: no such file"));
}
