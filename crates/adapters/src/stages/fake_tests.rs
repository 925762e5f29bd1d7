// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rj_core::{Artifact, JobId, OwnerId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

fn input(stage: Stage) -> StageInput {
    StageInput {
        job_id: JobId::new("job-1"),
        owner: OwnerId::new("alice"),
        stage,
        dir: PathBuf::new(),
        seed: Value::Null,
        artifacts: BTreeMap::from([(Artifact::Request, json!({}))]),
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn default_output_is_deterministic() {
    let fake = FakeStageServices::new();
    let a = fake.run(Stage::Retrieving, &input(Stage::Retrieving)).await.unwrap();
    let b = fake.run(Stage::Retrieving, &input(Stage::Retrieving)).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a["inputs"], json!(["request"]));
    assert_eq!(fake.stages_run(), vec![Stage::Retrieving, Stage::Retrieving]);
}

#[tokio::test]
async fn default_curate_adds_one_entry() {
    let fake = FakeStageServices::new();
    let body = fake.run(Stage::Curating, &input(Stage::Curating)).await.unwrap();
    assert_eq!(body["mutations"][0]["op"], "add");
    assert_eq!(body["mutations"][0]["key"], "job-1");
}

#[tokio::test]
async fn fail_counts_down() {
    let fake = FakeStageServices::new();
    fake.fail(Stage::Generating, 2, "model overloaded");

    for _ in 0..2 {
        let err = fake
            .run(Stage::Generating, &input(Stage::Generating))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "generating: model overloaded");
    }
    assert!(fake.run(Stage::Generating, &input(Stage::Generating)).await.is_ok());
}

#[tokio::test]
async fn fail_always_never_recovers() {
    let fake = FakeStageServices::new();
    fake.fail_always(Stage::Evaluating, "judge unavailable");
    for _ in 0..3 {
        assert!(fake.run(Stage::Evaluating, &input(Stage::Evaluating)).await.is_err());
    }
}

#[tokio::test]
async fn set_output_and_hook() {
    let fake = FakeStageServices::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    fake.set_output(Stage::Extracting, json!({"topic": "traits"}));
    fake.on_run(Stage::Extracting, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let body = fake.run(Stage::Extracting, &input(Stage::Extracting)).await.unwrap();
    assert_eq!(body, json!({"topic": "traits"}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(fake.calls()[0].input.job_id, "job-1");
}
