//! # SDK Response Processors
//!
//! One processor per [`SdkResponsePayload`] variant. Each one translates the payload
//! into store updates, status transitions or wait registrations on the node named by
//! the event.

use super::sdk_response::{SdkResponseEvent, SdkResponsePayload};
use crate::error::{EngineError, EngineResult};
use crate::models::{ExecutableResponse, FailureInfo, FailureType, NodeExecutionUpdate, StepResponse};
use crate::orchestration::NodeExecutor;
use crate::state_machine::Status;
use crate::wait_notify::{NotifyCallback, ResponseData, WaitNotifyEngine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait SdkResponseProcessor: Send + Sync {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()>;
}

fn unexpected_payload(processor: &str, event: &SdkResponseEvent) -> EngineError {
    EngineError::invalid_request(format!(
        "{processor} cannot handle {} payload",
        event.response_type()
    ))
}

/// Resumes a node once the delegate task it waits on reports back
pub struct ResumeNodeCallback {
    executor: Arc<NodeExecutor>,
    node_execution_id: String,
    plan_execution_id: String,
}

impl ResumeNodeCallback {
    pub fn new(
        executor: Arc<NodeExecutor>,
        node_execution_id: impl Into<String>,
        plan_execution_id: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            node_execution_id: node_execution_id.into(),
            plan_execution_id: plan_execution_id.into(),
        }
    }
}

#[async_trait]
impl NotifyCallback for ResumeNodeCallback {
    async fn notify(&self, response: ResponseData) -> EngineResult<()> {
        self.executor
            .handle_step_response(&self.node_execution_id, response)
            .await
    }

    fn plan_execution_id(&self) -> Option<&str> {
        Some(&self.plan_execution_id)
    }

    async fn on_timeout(&self) -> EngineResult<()> {
        let response = StepResponse::new(Status::Expired).with_failure_info(FailureInfo::new(
            "Timed out waiting for delegate task",
            vec![FailureType::TimeoutFailure],
        ));
        self.executor
            .handle_step_response(&self.node_execution_id, response)
            .await
    }
}

pub struct QueueTaskProcessor {
    executor: Arc<NodeExecutor>,
    wait_notify: Arc<WaitNotifyEngine>,
}

impl QueueTaskProcessor {
    pub fn new(executor: Arc<NodeExecutor>, wait_notify: Arc<WaitNotifyEngine>) -> Self {
        Self {
            executor,
            wait_notify,
        }
    }
}

#[async_trait]
impl SdkResponseProcessor for QueueTaskProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::QueueTask { task_id } = &event.payload else {
            return Err(unexpected_payload("QueueTaskProcessor", event));
        };

        let task = ExecutableResponse::Task {
            task_id: task_id.clone(),
        };
        let updates = [NodeExecutionUpdate::AddExecutableResponse(task.clone())];
        let updated = self
            .executor
            .updater()
            .update_status(&event.node_execution_id, Status::TaskWaiting, &updates)
            .await?;
        if updated.is_none() {
            // a re-delivery after a failed registration finds the node already waiting
            let node = self.executor.store().get(&event.node_execution_id).await?;
            if node.status != Status::TaskWaiting || !node.executable_responses.contains(&task) {
                debug!(task_id = %task_id, "Node not running, task wait not registered");
                return Ok(());
            }
        }

        let callback = Arc::new(ResumeNodeCallback::new(
            self.executor.clone(),
            event.node_execution_id.clone(),
            event.ambiance.plan_execution_id.clone(),
        ));
        self.wait_notify.wait_for(task_id.clone(), callback).await?;
        Ok(())
    }
}

pub struct HandleProgressProcessor {
    executor: Arc<NodeExecutor>,
}

impl HandleProgressProcessor {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SdkResponseProcessor for HandleProgressProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::HandleProgress { progress_json } = &event.payload else {
            return Err(unexpected_payload("HandleProgressProcessor", event));
        };
        self.executor
            .store()
            .update(
                &event.node_execution_id,
                &[NodeExecutionUpdate::ProgressData(progress_json.clone())],
            )
            .await?;
        Ok(())
    }
}

pub struct AddStepDetailsProcessor {
    executor: Arc<NodeExecutor>,
}

impl AddStepDetailsProcessor {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SdkResponseProcessor for AddStepDetailsProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::AddStepDetails { name, details } = &event.payload else {
            return Err(unexpected_payload("AddStepDetailsProcessor", event));
        };
        self.executor
            .store()
            .update(
                &event.node_execution_id,
                &[NodeExecutionUpdate::StepDetails {
                    name: name.clone(),
                    details: details.clone(),
                }],
            )
            .await?;
        Ok(())
    }
}

/// Records what the node is blocked on; a child response also spawns the child node
pub struct AddExecutableResponseProcessor {
    executor: Arc<NodeExecutor>,
}

impl AddExecutableResponseProcessor {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SdkResponseProcessor for AddExecutableResponseProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::AddExecutableResponse { response } = &event.payload else {
            return Err(unexpected_payload("AddExecutableResponseProcessor", event));
        };

        let Some(node) = self
            .executor
            .store()
            .add_executable_response(&event.node_execution_id, response)
            .await?
        else {
            debug!(
                node_execution_id = %event.node_execution_id,
                "Executable response already recorded"
            );
            return Ok(());
        };

        if let ExecutableResponse::Child { child_node_id } = response {
            self.executor
                .trigger_node(&node.ambiance, child_node_id, Some(node.uuid.clone()), None)
                .await?;
        }
        Ok(())
    }
}

pub struct HandleStepResponseProcessor {
    executor: Arc<NodeExecutor>,
}

impl HandleStepResponseProcessor {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SdkResponseProcessor for HandleStepResponseProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::HandleStepResponse(response) = &event.payload else {
            return Err(unexpected_payload("HandleStepResponseProcessor", event));
        };
        self.executor
            .handle_step_response(&event.node_execution_id, response.clone())
            .await
    }
}

pub struct ResolveStepInputsProcessor {
    executor: Arc<NodeExecutor>,
}

impl ResolveStepInputsProcessor {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SdkResponseProcessor for ResolveStepInputsProcessor {
    async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<()> {
        let SdkResponsePayload::ResolveStepInputs { step_inputs } = &event.payload else {
            return Err(unexpected_payload("ResolveStepInputsProcessor", event));
        };

        let node = self
            .executor
            .store()
            .update(
                &event.node_execution_id,
                &[NodeExecutionUpdate::ResolvedStepParameters(step_inputs.clone())],
            )
            .await?;

        if let Err(error) = self
            .executor
            .expansion()
            .add_step_inputs(&node.ambiance, step_inputs)
            .await
        {
            warn!(
                node_execution_id = %node.uuid,
                error = %error,
                "Failed to project step inputs into plan expansion"
            );
        }
        Ok(())
    }
}
