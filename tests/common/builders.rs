//! Plan and engine fixtures shared by the integration tests

#![allow(dead_code)]

use pipeline_engine::advisers::{adviser_types, NextStepAdviserParameters, RetryAdviserParameters};
use pipeline_engine::config::EngineConfig;
use pipeline_engine::constants::setup_abstractions;
use pipeline_engine::events::{OrchestrationEvent, PublishedEvent, SdkResponseEvent, SdkResponsePayload};
use pipeline_engine::models::{
    AdviserObtainment, Ambiance, FailureInfo, FailureType, Plan, PlanNode, StepCategory, StepResponse,
    StepType,
};
use pipeline_engine::advisers::RepairActionCode;
use pipeline_engine::orchestration::{EngineComponents, OrchestrationEngine};
use pipeline_engine::state_machine::Status;
use std::collections::HashSet;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const PLAN_ID: &str = "plan-1";
pub const ACCOUNT_ID: &str = "acc-1";

pub fn ambiance(plan_execution_id: &str) -> Ambiance {
    Ambiance::new(plan_execution_id, PLAN_ID)
        .with_setup_abstraction(setup_abstractions::ACCOUNT_ID, ACCOUNT_ID)
}

pub fn step(uuid: &str) -> PlanNode {
    PlanNode::new(uuid, uuid, StepType::new("SHELL_SCRIPT", StepCategory::Step))
}

pub fn stage(uuid: &str) -> PlanNode {
    PlanNode::new(uuid, uuid, StepType::new("DEPLOYMENT", StepCategory::Stage))
}

pub fn on_success(next_node_id: &str) -> AdviserObtainment {
    AdviserObtainment::new(
        adviser_types::ON_SUCCESS,
        &NextStepAdviserParameters {
            next_node_id: Some(next_node_id.to_string()),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn retry(retry_count: u32, repair: RepairActionCode) -> AdviserObtainment {
    retry_with_wait(retry_count, repair, vec![0])
}

/// Retry adviser waiting `wait_interval_list` seconds before each attempt
pub fn retry_with_wait(retry_count: u32, repair: RepairActionCode, wait_interval_list: Vec<u64>) -> AdviserObtainment {
    AdviserObtainment::new(
        adviser_types::RETRY,
        &RetryAdviserParameters {
            retry_count,
            wait_interval_list,
            repair_action_code_after_retry: repair,
            applicable_failure_types: HashSet::from([FailureType::ApplicationFailure]),
            next_node_id: None,
        },
    )
    .unwrap()
}

/// `step-1` followed by `step-2` on success
pub fn linear_plan() -> Plan {
    Plan::new(PLAN_ID, "step-1")
        .with_node(step("step-1").with_adviser(on_success("step-2")))
        .with_node(step("step-2"))
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.plan_expansion.enabled_by_default = true;
    config.plan_expansion.lock_wait_timeout_ms = 200;
    config.retry_policies.store.initial_delay_ms = 1;
    config.retry_policies.store.max_delay_ms = 1;
    config
}

pub fn engine() -> OrchestrationEngine {
    OrchestrationEngine::new(EngineComponents::in_memory(test_config()))
}

pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn step_response_event(ambiance: &Ambiance, node_execution_id: &str, response: StepResponse) -> SdkResponseEvent {
    SdkResponseEvent::new(
        new_event_id(),
        ambiance.clone(),
        node_execution_id,
        SdkResponsePayload::HandleStepResponse(response),
    )
}

pub fn application_failure() -> StepResponse {
    StepResponse::new(Status::Failed)
        .with_failure_info(FailureInfo::new("exit code 1", vec![FailureType::ApplicationFailure]))
}

/// Drain everything published so far
pub fn drain(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<OrchestrationEvent> {
    let mut events = Vec::new();
    while let Ok(published) = receiver.try_recv() {
        if let Ok(event) = published.orchestration_event() {
            events.push(event);
        }
    }
    events
}

pub fn plan_end_status(events: &[OrchestrationEvent]) -> Option<Status> {
    events.iter().find_map(|e| match e {
        OrchestrationEvent::PlanExecutionEnd { status, .. } => Some(*status),
        _ => None,
    })
}
