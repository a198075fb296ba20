//! End-to-end node lifecycle through the orchestration engine, in-memory backends

mod common;

use common::*;
use pipeline_engine::advisers::RepairActionCode;
use pipeline_engine::events::{OrchestrationEvent, SdkResponseEvent, SdkResponsePayload};
use pipeline_engine::models::{ExecutableResponse, FailureInfo, FailureType, Plan, StepResponse};
use pipeline_engine::orchestration::{EngineComponents, OrchestrationEngine};
use pipeline_engine::state_machine::Status;
use pipeline_engine::store::NodeExecutionStore;
use std::time::Duration;

#[tokio::test]
async fn test_linear_plan_runs_to_completion() {
    let engine = engine();
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-linear");

    let first = engine
        .start_plan_execution(linear_plan(), ambiance.clone())
        .await
        .unwrap();
    assert_eq!(first.status, Status::Running);
    assert_eq!(first.node_id, "step-1");

    engine
        .handle_event(step_response_event(&ambiance, &first.uuid, StepResponse::new(Status::Succeeded)))
        .await
        .unwrap();

    let store = engine.node_store();
    let nodes = store.fetch_all_for_plan_execution("pe-linear").await.unwrap();
    assert_eq!(nodes.len(), 2);
    let second = nodes.iter().find(|n| n.node_id == "step-2").unwrap();
    assert_eq!(second.status, Status::Running);
    assert_eq!(second.previous_id.as_deref(), Some(first.uuid.as_str()));
    assert_eq!(
        store.get(&first.uuid).await.unwrap().next_id.as_deref(),
        Some(second.uuid.as_str())
    );

    engine
        .handle_event(step_response_event(&ambiance, &second.uuid, StepResponse::new(Status::Succeeded)))
        .await
        .unwrap();

    let published = drain(&mut events);
    assert_eq!(plan_end_status(&published), Some(Status::Succeeded));

    let graph = engine.graph("pe-linear").await.unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.root_id.as_deref(), Some(first.uuid.as_str()));
    assert_eq!(graph.next.get(&first.uuid), Some(&second.uuid));
}

#[tokio::test]
async fn test_failed_step_is_retried_then_succeeds() {
    let engine = engine();
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-retry");
    let plan = Plan::new(PLAN_ID, "flaky").with_node(step("flaky").with_adviser(retry(2, RepairActionCode::Ignore)));

    let first = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    engine
        .handle_event(step_response_event(&ambiance, &first.uuid, application_failure()))
        .await
        .unwrap();

    let store = engine.node_store();
    let old = store.get(&first.uuid).await.unwrap();
    assert!(old.old_retry);
    assert_eq!(old.status, Status::Failed);

    let attempt = store.get_by_plan_node_uuid("flaky", "pe-retry").await.unwrap();
    assert_ne!(attempt.uuid, first.uuid);
    assert_eq!(attempt.status, Status::Running);
    assert_eq!(attempt.retry_ids, vec![first.uuid.clone()]);

    engine
        .handle_event(step_response_event(&ambiance, &attempt.uuid, StepResponse::new(Status::Succeeded)))
        .await
        .unwrap();

    let published = drain(&mut events);
    assert!(published.iter().any(|e| matches!(
        e,
        OrchestrationEvent::NodeRetry { old_node_execution_id, .. } if *old_node_execution_id == first.uuid
    )));
    assert_eq!(plan_end_status(&published), Some(Status::Succeeded));

    let graph = engine.graph("pe-retry").await.unwrap();
    assert_eq!(graph.len(), 1);
    assert!(graph.vertex(&attempt.uuid).is_some());
}

#[tokio::test]
async fn test_retry_wait_does_not_block_event_handling() {
    let engine = engine();
    let ambiance = ambiance("pe-wait");
    let plan = Plan::new(PLAN_ID, "flaky").with_node(step("flaky").with_adviser(retry_with_wait(
        2,
        RepairActionCode::Ignore,
        vec![1],
    )));

    let first = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    let handled = tokio::time::timeout(
        Duration::from_millis(500),
        engine.handle_event(step_response_event(&ambiance, &first.uuid, application_failure())),
    )
    .await
    .expect("handler returned before the retry wait elapsed");
    assert!(handled.unwrap());

    let store = engine.node_store();
    assert!(store.get(&first.uuid).await.unwrap().old_retry);
    let attempt = store.get_by_plan_node_uuid("flaky", "pe-wait").await.unwrap();
    assert_eq!(attempt.status, Status::Queued);
    assert_eq!(engine.scheduled_retries(), 1);
    assert_eq!(engine.start_due_retries().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(engine.start_due_retries().await.unwrap(), 1);
    assert_eq!(engine.scheduled_retries(), 0);
    assert_eq!(store.get(&attempt.uuid).await.unwrap().status, Status::Running);
}

#[tokio::test]
async fn test_pending_retry_resumes_after_restart() {
    let engine = engine();
    let ambiance = ambiance("pe-restart");
    let plan = Plan::new(PLAN_ID, "flaky").with_node(step("flaky").with_adviser(retry_with_wait(
        2,
        RepairActionCode::Ignore,
        vec![3600],
    )));

    let first = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    engine
        .handle_event(step_response_event(&ambiance, &first.uuid, application_failure()))
        .await
        .unwrap();
    assert_eq!(engine.resume_pending_retries("pe-restart").await.unwrap(), 0);

    let mut components = EngineComponents::in_memory(test_config());
    components.node_store = engine.node_store().clone();
    let restarted = OrchestrationEngine::new(components);

    assert_eq!(restarted.resume_pending_retries("pe-restart").await.unwrap(), 1);
    let attempt = restarted
        .node_store()
        .get_by_plan_node_uuid("flaky", "pe-restart")
        .await
        .unwrap();
    assert_eq!(attempt.status, Status::Running);
    assert_eq!(restarted.resume_pending_retries("pe-restart").await.unwrap(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_apply_repair_action() {
    let engine = engine();
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-exhausted");
    let plan = Plan::new(PLAN_ID, "flaky").with_node(step("flaky").with_adviser(retry(1, RepairActionCode::Ignore)));

    let first = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    engine
        .handle_event(step_response_event(&ambiance, &first.uuid, application_failure()))
        .await
        .unwrap();

    let attempt = engine
        .node_store()
        .get_by_plan_node_uuid("flaky", "pe-exhausted")
        .await
        .unwrap();
    engine
        .handle_event(step_response_event(&ambiance, &attempt.uuid, application_failure()))
        .await
        .unwrap();

    let concluded = engine.node_store().get(&attempt.uuid).await.unwrap();
    assert_eq!(concluded.status, Status::IgnoreFailed);
    assert_eq!(plan_end_status(&drain(&mut events)), Some(Status::IgnoreFailed));
}

#[tokio::test]
async fn test_unmatched_failure_is_not_retried() {
    let engine = engine();
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-unmatched");
    let plan = Plan::new(PLAN_ID, "flaky").with_node(step("flaky").with_adviser(retry(3, RepairActionCode::Ignore)));

    let first = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    let response = StepResponse::new(Status::Failed).with_failure_info(
        FailureInfo::new("denied", vec![FailureType::AuthorizationFailure]),
    );
    engine
        .handle_event(step_response_event(&ambiance, &first.uuid, response))
        .await
        .unwrap();

    let nodes = engine
        .node_store()
        .fetch_all_for_plan_execution("pe-unmatched")
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(plan_end_status(&drain(&mut events)), Some(Status::Failed));
}

#[tokio::test]
async fn test_child_failure_concludes_parent() {
    let engine = engine();
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-child");
    let plan = Plan::new(PLAN_ID, "stage-1")
        .with_node(stage("stage-1"))
        .with_node(step("child-1"));

    let parent = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
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

    let store = engine.node_store();
    let children = store.fetch_children(&parent.uuid).await.unwrap();
    assert_eq!(children.len(), 1);
    let child = &children[0];
    assert_eq!(child.status, Status::Running);
    assert_eq!(child.ambiance.levels.len(), 2);

    engine
        .handle_event(step_response_event(&ambiance, &child.uuid, application_failure()))
        .await
        .unwrap();

    let parent = store.get(&parent.uuid).await.unwrap();
    assert_eq!(parent.status, Status::Failed);
    assert_eq!(parent.failure_info.unwrap().error_message, "exit code 1");
    assert_eq!(plan_end_status(&drain(&mut events)), Some(Status::Failed));
}

#[tokio::test]
async fn test_task_result_resumes_waiting_node() {
    let engine = engine();
    let ambiance = ambiance("pe-task");
    let plan = Plan::new(PLAN_ID, "delegate").with_node(step("delegate"));

    let node = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    let queue = SdkResponseEvent::new(
        new_event_id(),
        ambiance.clone(),
        &node.uuid,
        SdkResponsePayload::QueueTask {
            task_id: "task-1".into(),
        },
    );
    engine.handle_event(queue).await.unwrap();

    let waiting = engine.node_store().get(&node.uuid).await.unwrap();
    assert_eq!(waiting.status, Status::TaskWaiting);
    assert_eq!(engine.wait_notify().callbacks_waiting(), 1);

    let fired = engine
        .notify_task("task-1", StepResponse::new(Status::Succeeded))
        .await
        .unwrap();
    assert!(fired);
    assert_eq!(
        engine.node_store().get(&node.uuid).await.unwrap().status,
        Status::Succeeded
    );

    // a second delivery of the same result is ignored
    let fired_again = engine
        .notify_task("task-1", StepResponse::new(Status::Failed))
        .await
        .unwrap();
    assert!(!fired_again);
}

#[tokio::test]
async fn test_result_arriving_before_wait_is_parked() {
    let engine = engine();
    let ambiance = ambiance("pe-parked");
    let plan = Plan::new(PLAN_ID, "delegate").with_node(step("delegate"));
    let node = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();

    let fired = engine
        .notify_task("task-early", StepResponse::new(Status::Succeeded))
        .await
        .unwrap();
    assert!(!fired);
    assert_eq!(engine.wait_notify().responses_parked(), 1);

    let queue = SdkResponseEvent::new(
        new_event_id(),
        ambiance,
        &node.uuid,
        SdkResponsePayload::QueueTask {
            task_id: "task-early".into(),
        },
    );
    engine.handle_event(queue).await.unwrap();

    assert_eq!(engine.wait_notify().responses_parked(), 0);
    assert_eq!(
        engine.node_store().get(&node.uuid).await.unwrap().status,
        Status::Succeeded
    );
}

#[tokio::test]
async fn test_timed_out_task_expires_node() {
    let mut config = test_config();
    config.wait_notify.default_timeout_ms = 0;
    let engine = OrchestrationEngine::new(EngineComponents::in_memory(config));
    let mut events = engine.subscribe();
    let ambiance = ambiance("pe-timeout");
    let plan = Plan::new(PLAN_ID, "delegate").with_node(step("delegate"));

    let node = engine.start_plan_execution(plan, ambiance.clone()).await.unwrap();
    let queue = SdkResponseEvent::new(
        new_event_id(),
        ambiance,
        &node.uuid,
        SdkResponsePayload::QueueTask {
            task_id: "task-slow".into(),
        },
    );
    engine.handle_event(queue).await.unwrap();

    assert_eq!(engine.expire_timed_out_waits().await.unwrap(), 1);

    let expired = engine.node_store().get(&node.uuid).await.unwrap();
    assert_eq!(expired.status, Status::Expired);
    assert_eq!(
        expired.failure_info.unwrap().failure_types,
        vec![FailureType::TimeoutFailure]
    );
    assert_eq!(plan_end_status(&drain(&mut events)), Some(Status::Expired));

    // the late result no longer changes anything
    assert!(!engine
        .notify_task("task-slow", StepResponse::new(Status::Succeeded))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete_plan_executions_drops_state() {
    let engine = engine();
    let ambiance = ambiance("pe-delete");
    engine
        .start_plan_execution(linear_plan(), ambiance.clone())
        .await
        .unwrap();

    let deleted = engine
        .delete_plan_executions(&["pe-delete".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(engine
        .node_store()
        .fetch_all_for_plan_execution("pe-delete")
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .resolve_expressions(&ambiance, &["step-1".to_string()])
        .await
        .unwrap()
        .is_none());
}
