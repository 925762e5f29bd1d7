// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rj_core::{Artifact, JobId, OwnerId};
use std::path::PathBuf;

fn shell(script: &str) -> StageCommand {
    StageCommand {
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        timeout_ms: None,
        env: BTreeMap::new(),
    }
}

fn services(stage: Stage, command: StageCommand) -> CommandServices {
    let mut config = Config::default();
    config.stages.insert(stage.as_str().to_string(), command);
    CommandServices::from_config(&config)
}

fn input(stage: Stage) -> StageInput {
    let mut artifacts = BTreeMap::new();
    artifacts.insert(Artifact::Request, json!({"topic": "lifetimes"}));
    StageInput {
        job_id: JobId::new("job-1"),
        owner: OwnerId::new("alice"),
        stage,
        dir: PathBuf::new(),
        seed: json!({"text": "explain lifetimes"}),
        artifacts,
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn unconfigured_stage_passes_input_through() {
    let services = CommandServices::default();
    let body = services
        .run(Stage::Retrieving, &input(Stage::Retrieving))
        .await
        .unwrap();
    assert_eq!(body["seed"]["text"], "explain lifetimes");
    assert_eq!(body["artifacts"]["request"]["topic"], "lifetimes");
    assert_eq!(body["stage"], "retrieving");
}

#[tokio::test]
async fn unconfigured_curate_yields_no_mutations() {
    let body = CommandServices::default()
        .run(Stage::Curating, &input(Stage::Curating))
        .await
        .unwrap();
    assert_eq!(body, json!({"mutations": []}));
}

#[tokio::test]
async fn command_receives_input_on_stdin() {
    let services = services(Stage::Generating, shell("cat"));
    assert!(services.is_configured(Stage::Generating));

    let body = services
        .run(Stage::Generating, &input(Stage::Generating))
        .await
        .unwrap();
    assert_eq!(body["job_id"], "job-1");
    assert_eq!(body["owner"], "alice");
}

#[tokio::test]
async fn command_sees_job_environment() {
    let services = services(
        Stage::Extracting,
        shell(r#"printf '{"job":"%s","stage":"%s"}' "$RJ_JOB_ID" "$RJ_STAGE""#),
    );
    let body = services
        .run(Stage::Extracting, &input(Stage::Extracting))
        .await
        .unwrap();
    assert_eq!(body, json!({"job": "job-1", "stage": "extracting"}));
}

#[tokio::test]
async fn nonzero_exit_reports_stderr() {
    let services = services(Stage::Retrieving, shell("echo 'index offline' >&2; exit 3"));
    let err = services
        .run(Stage::Retrieving, &input(Stage::Retrieving))
        .await
        .unwrap_err();
    match err {
        StageError::CommandFailed { stage, code, stderr } => {
            assert_eq!(stage, Stage::Retrieving);
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "index offline");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_json_output_is_invalid() {
    let services = services(Stage::Generating, shell("echo not json"));
    let err = services
        .run(Stage::Generating, &input(Stage::Generating))
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::InvalidOutput { .. }), "got: {err}");
}

#[tokio::test]
async fn empty_output_is_invalid() {
    let services = services(Stage::Generating, shell("true"));
    let err = services
        .run(Stage::Generating, &input(Stage::Generating))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no output"), "got: {err}");
}

#[tokio::test]
async fn null_output_is_invalid() {
    let services = services(Stage::Generating, shell("echo ' null '"));
    let err = services
        .run(Stage::Generating, &input(Stage::Generating))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, StageError::InvalidOutput { stage: Stage::Generating, message } if message.contains("null")),
        "got: {err}"
    );
}

#[tokio::test]
async fn falsy_json_values_are_bodies() {
    let services = services(Stage::Generating, shell("echo false"));
    let body = services
        .run(Stage::Generating, &input(Stage::Generating))
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!(false));
}

#[tokio::test]
async fn timeout_is_enforced() {
    let mut command = shell("sleep 10");
    command.timeout_ms = Some(100);
    let services = services(Stage::Reflecting, command);
    let err = services
        .run(Stage::Reflecting, &input(Stage::Reflecting))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StageError::Timeout {
            stage: Stage::Reflecting,
            timeout_ms: 100
        }
    ));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let command = StageCommand {
        command: vec!["/nonexistent/stage-tool".to_string()],
        timeout_ms: None,
        env: BTreeMap::new(),
    };
    let err = services(Stage::Extracting, command)
        .run(Stage::Extracting, &input(Stage::Extracting))
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Spawn { .. }));
    assert!(err.to_string().contains("No such file"), "got: {err}");
}
