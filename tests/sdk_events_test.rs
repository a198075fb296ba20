//! At-least-once delivery of SDK response events

mod common;

use common::*;
use pipeline_engine::events::{SdkResponseEvent, SdkResponsePayload};
use pipeline_engine::models::{ExecutableResponse, Plan, StepResponse};
use pipeline_engine::state_machine::Status;
use pipeline_engine::store::NodeExecutionStore;
use pipeline_engine::EngineError;
use serde_json::json;

#[tokio::test]
async fn test_redelivered_event_is_acknowledged_without_effect() {
    let engine = engine();
    let ambiance = ambiance("pe-dup");
    let first = engine
        .start_plan_execution(linear_plan(), ambiance.clone())
        .await
        .unwrap();

    let event = step_response_event(&ambiance, &first.uuid, StepResponse::new(Status::Succeeded));
    assert!(engine.handle_event(event.clone()).await.unwrap());
    let version = engine.node_store().get(&first.uuid).await.unwrap().version;

    assert!(!engine.handle_event(event).await.unwrap());
    assert_eq!(engine.node_store().get(&first.uuid).await.unwrap().version, version);
}

#[tokio::test]
async fn test_repeated_step_response_with_new_id_does_not_advance_twice() {
    let engine = engine();
    let ambiance = ambiance("pe-dup-new-id");
    let first = engine
        .start_plan_execution(linear_plan(), ambiance.clone())
        .await
        .unwrap();

    for _ in 0..3 {
        let processed = engine
            .handle_event(step_response_event(&ambiance, &first.uuid, StepResponse::new(Status::Succeeded)))
            .await
            .unwrap();
        assert!(processed);
    }

    let nodes = engine
        .node_store()
        .fetch_all_for_plan_execution("pe-dup-new-id")
        .await
        .unwrap();
    assert_eq!(nodes.len(), 2, "step-2 must be triggered exactly once");
}

#[tokio::test]
async fn test_progress_and_step_details_are_recorded() {
    let engine = engine();
    let ambiance = ambiance("pe-details");
    let node = engine
        .start_plan_execution(linear_plan(), ambiance.clone())
        .await
        .unwrap();

    let progress = SdkResponseEvent::new(
        new_event_id(),
        ambiance.clone(),
        &node.uuid,
        SdkResponsePayload::HandleProgress {
            progress_json: json!({"percent": 40}),
        },
    );
    let details = SdkResponseEvent::new(
        new_event_id(),
        ambiance,
        &node.uuid,
        SdkResponsePayload::AddStepDetails {
            name: "artifact".into(),
            details: json!({"tag": "v1.2.3"}),
        },
    );
    engine.handle_event(progress).await.unwrap();
    engine.handle_event(details).await.unwrap();

    let stored = engine.node_store().get(&node.uuid).await.unwrap();
    assert_eq!(stored.progress_data, Some(json!({"percent": 40})));
    assert_eq!(stored.step_details.get("artifact"), Some(&json!({"tag": "v1.2.3"})));
    assert_eq!(stored.status, Status::Running);
}

#[tokio::test]
async fn test_duplicate_child_response_spawns_one_child() {
    let engine = engine();
    let ambiance = ambiance("pe-child-dup");
    let plan = Plan::new(PLAN_ID, "stage-1")
        .with_node(stage("stage-1"))
        .with_node(step("child-1"));
    let parent = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();

    for _ in 0..2 {
        let spawn = SdkResponseEvent::new(
            new_event_id(),
            ambiance.clone(),
            &parent.uuid,
            SdkResponsePayload::AddExecutableResponse {
                response: ExecutableResponse::Child {
                    child_node_id: "child-1".into(),
                },
            },
        );
        engine.handle_event(spawn).await.unwrap();
    }

    let children = engine.node_store().fetch_children(&parent.uuid).await.unwrap();
    assert_eq!(children.len(), 1);
    let parent = engine.node_store().get(&parent.uuid).await.unwrap();
    assert_eq!(parent.executable_responses.len(), 1);
}

#[tokio::test]
async fn test_failed_event_is_not_marked_processed() {
    let engine = engine();
    let ambiance = ambiance("pe-missing");
    let event = SdkResponseEvent::new(
        "evt-missing",
        ambiance,
        "no-such-node",
        SdkResponsePayload::HandleProgress {
            progress_json: json!({}),
        },
    );

    let first = engine.handle_event(event.clone()).await;
    assert!(matches!(first, Err(EngineError::Store(_)) | Err(EngineError::NotFound { .. })));

    // still processed on re-delivery rather than swallowed as a duplicate
    assert!(engine.handle_event(event).await.is_err());
}
