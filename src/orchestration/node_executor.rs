//! # Node Executor
//!
//! Drives individual node executions through their lifecycle:
//!
//! 1. **Trigger**: create a QUEUED attempt under the parent's ambiance and start it
//! 2. **Step response**: record outcomes, apply the guarded status change, consult advisers
//! 3. **Advise**: act on the adviser response (see `advise_handlers`)
//! 4. **Proceed**: start the next sibling, resume the parent, or end the plan
//!
//! Every status change goes through [`NodeStatusUpdater`], so a re-delivered step
//! response finds the node already transitioned and stops early.

use super::advise_engine::AdviseEngine;
use super::plans::PlanRegistry;
use super::retry_helper::RetryScheduler;
use crate::error::EngineResult;
use crate::events::{EventPublisher, OrchestrationEvent};
use crate::expansion::PlanExpansionService;
use crate::logging::log_node_operation;
use crate::models::{Ambiance, NodeExecution, NodeExecutionUpdate, StepResponse};
use crate::state_machine::{NodeStatusUpdater, Status};
use crate::store::{NodeExecutionStore, StoreError};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct NodeExecutor {
    pub(super) store: Arc<dyn NodeExecutionStore>,
    pub(super) plans: Arc<PlanRegistry>,
    pub(super) updater: NodeStatusUpdater,
    pub(super) advise_engine: AdviseEngine,
    pub(super) expansion: Arc<PlanExpansionService>,
    pub(super) publisher: EventPublisher,
    pub(super) retries: RetryScheduler,
}

impl NodeExecutor {
    pub fn new(
        store: Arc<dyn NodeExecutionStore>,
        plans: Arc<PlanRegistry>,
        advise_engine: AdviseEngine,
        expansion: Arc<PlanExpansionService>,
        publisher: EventPublisher,
    ) -> Self {
        let updater = NodeStatusUpdater::new(store.clone(), publisher.clone(), expansion.clone());
        Self {
            store,
            plans,
            updater,
            advise_engine,
            expansion,
            publisher,
            retries: RetryScheduler::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn NodeExecutionStore> {
        &self.store
    }

    pub fn expansion(&self) -> &Arc<PlanExpansionService> {
        &self.expansion
    }

    pub fn updater(&self) -> &NodeStatusUpdater {
        &self.updater
    }

    pub fn plans(&self) -> &Arc<PlanRegistry> {
        &self.plans
    }

    /// Create an attempt of `plan_node_id` as a child of `ambiance`'s current level and start it
    pub async fn trigger_node(
        &self,
        ambiance: &Ambiance,
        plan_node_id: &str,
        parent_id: Option<String>,
        previous_id: Option<String>,
    ) -> EngineResult<NodeExecution> {
        let plan_node = self.plans.fetch_node(&ambiance.plan_execution_id, plan_node_id)?;
        let uuid = Uuid::new_v4().to_string();
        let level = plan_node.to_level(uuid.clone(), Utc::now().timestamp_millis(), 0);

        let node = NodeExecution::queued(uuid, ambiance.clone_for_child(level), &plan_node.uuid)
            .with_name(plan_node.name.clone())
            .with_parent_id(parent_id)
            .with_previous_id(previous_id.clone())
            .with_stage_fqn(plan_node.stage_fqn.clone());

        let node = self.store.save(node).await?;
        if let Some(previous_id) = previous_id {
            self.store
                .update(&previous_id, &[NodeExecutionUpdate::NextId(node.uuid.clone())])
                .await?;
        }

        self.start(node).await
    }

    /// Move a saved QUEUED attempt to RUNNING and announce it
    pub(super) async fn start(&self, node: NodeExecution) -> EngineResult<NodeExecution> {
        let start = OrchestrationEvent::NodeExecutionStart {
            plan_execution_id: node.plan_execution_id().to_string(),
            node_execution_id: node.uuid.clone(),
            identifier: node.identifier.clone(),
        };
        if let Err(error) = self.publisher.publish_event(&start) {
            warn!(error = %error, "Failed to publish node start");
        }

        log_node_operation(
            "start",
            node.plan_execution_id(),
            &node.uuid,
            Status::Running.as_str(),
            Some(&node.identifier),
        );

        let running = self
            .updater
            .update_status(&node.uuid, Status::Running, &[])
            .await?;
        Ok(running.unwrap_or(node))
    }

    /// Start scheduled retry attempts whose wait elapsed. Attempts that fail to start stay
    /// scheduled for the next sweep.
    pub async fn start_due_retries(&self) -> EngineResult<usize> {
        let due = self.retries.take_due();
        let mut started = 0;
        for (index, attempt_id) in due.iter().enumerate() {
            match self.start_queued(attempt_id).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(error) => {
                    for id in &due[index..] {
                        self.retries.schedule(id.clone(), Duration::ZERO);
                    }
                    return Err(error);
                }
            }
        }
        Ok(started)
    }

    /// Start QUEUED retry attempts of `plan_execution_id` that nothing has scheduled,
    /// e.g. ones saved before a restart
    pub async fn resume_pending_retries(&self, plan_execution_id: &str) -> EngineResult<usize> {
        let pending: Vec<NodeExecution> = self
            .store
            .fetch_all_for_plan_execution(plan_execution_id)
            .await?
            .into_iter()
            .filter(|n| n.status == Status::Queued && !n.old_retry && !n.retry_ids.is_empty())
            .filter(|n| !self.retries.is_scheduled(&n.uuid))
            .collect();

        let mut started = 0;
        for attempt in pending {
            info!(node_execution_id = %attempt.uuid, "Resuming pending retry attempt");
            self.start(attempt).await?;
            started += 1;
        }
        Ok(started)
    }

    async fn start_queued(&self, attempt_id: &str) -> EngineResult<bool> {
        let attempt = match self.store.get(attempt_id).await {
            Ok(attempt) => attempt,
            Err(StoreError::NotFound { .. }) => {
                debug!(node_execution_id = %attempt_id, "Scheduled retry attempt no longer exists");
                return Ok(false);
            }
            Err(error) => return Err(error.into()),
        };
        if attempt.status != Status::Queued {
            debug!(
                node_execution_id = %attempt_id,
                status = %attempt.status,
                "Scheduled retry attempt is no longer queued"
            );
            return Ok(false);
        }
        self.start(attempt).await?;
        Ok(true)
    }

    /// Apply a step's reported result and advise on it
    pub async fn handle_step_response(
        &self,
        node_execution_id: &str,
        response: StepResponse,
    ) -> EngineResult<()> {
        let node = self.store.get(node_execution_id).await?;

        for (name, outcome) in &response.outcomes {
            if let Err(error) = self.expansion.add_outcomes(&node.ambiance, name, outcome).await {
                warn!(
                    node_execution_id = %node_execution_id,
                    outcome = %name,
                    error = %error,
                    "Failed to project outcome into plan expansion"
                );
            }
        }

        let updates: Vec<NodeExecutionUpdate> = response
            .failure_info
            .clone()
            .map(NodeExecutionUpdate::FailureInfo)
            .into_iter()
            .collect();

        let Some(updated) = self
            .updater
            .update_status(node_execution_id, response.status, &updates)
            .await?
        else {
            return Ok(());
        };

        if !response.status.is_final() {
            return Ok(());
        }

        self.advise_and_handle(updated, node.status, response.status).await
    }

    async fn advise_and_handle(
        &self,
        node: NodeExecution,
        from_status: Status,
        to_status: Status,
    ) -> EngineResult<()> {
        match self.advise_engine.advise(&node, from_status, to_status).await? {
            Some(response) => {
                let node = self
                    .store
                    .update(&node.uuid, &[NodeExecutionUpdate::AdviserResponse(response.clone())])
                    .await?;
                self.handle_advise(&node, response).await
            }
            None => self.proceed(&node, None).await,
        }
    }

    /// Continue after `node` concluded
    pub(super) async fn proceed(&self, node: &NodeExecution, next_node_id: Option<String>) -> EngineResult<()> {
        if let Some(next_node_id) = next_node_id {
            self.trigger_node(
                &node.ambiance.clone_for_finish(),
                &next_node_id,
                node.parent_id.clone(),
                Some(node.uuid.clone()),
            )
            .await?;
            return Ok(());
        }

        match &node.parent_id {
            Some(parent_id) => self.resume_parent(parent_id.clone()).await,
            None => {
                self.end_plan(node.plan_execution_id(), node.status);
                Ok(())
            }
        }
    }

    /// Conclude the parent once every current child attempt is final
    fn resume_parent(&self, parent_id: String) -> BoxFuture<'_, EngineResult<()>> {
        async move {
            let children: Vec<NodeExecution> = self
                .store
                .fetch_children(&parent_id)
                .await?
                .into_iter()
                .filter(|c| !c.old_retry)
                .collect();

            if children.iter().any(|c| !c.status.is_final()) {
                debug!(parent_id = %parent_id, "Children still running, parent stays put");
                return Ok(());
            }

            let response = aggregate_children(&children);
            self.handle_step_response(&parent_id, response).await
        }
        .boxed()
    }

    pub(super) fn end_plan(&self, plan_execution_id: &str, status: Status) {
        info!(
            plan_execution_id = %plan_execution_id,
            status = %status,
            "🏁 Plan execution finished"
        );
        let event = OrchestrationEvent::PlanExecutionEnd {
            plan_execution_id: plan_execution_id.to_string(),
            status,
        };
        if let Err(error) = self.publisher.publish_event(&event) {
            warn!(error = %error, "Failed to publish plan end");
        }
    }
}

/// Parent result derived from its finished children
pub fn aggregate_children(children: &[NodeExecution]) -> StepResponse {
    if children.iter().any(|c| c.status == Status::Aborted) {
        return StepResponse::new(Status::Aborted);
    }

    if let Some(broken) = children.iter().find(|c| c.status.is_broke()) {
        let mut response = StepResponse::new(broken.status);
        response.failure_info = broken.failure_info.clone();
        return response;
    }

    if !children.is_empty() && children.iter().all(|c| c.status == Status::Skipped) {
        return StepResponse::new(Status::Skipped);
    }

    StepResponse::new(Status::Succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureInfo, FailureType};

    fn child(status: Status) -> NodeExecution {
        NodeExecution::queued("c", Ambiance::new("pe-1", "plan-1"), "n").with_status(status)
    }

    #[test]
    fn test_aggregate_children() {
        assert_eq!(
            aggregate_children(&[child(Status::Succeeded), child(Status::IgnoreFailed)]).status,
            Status::Succeeded
        );
        assert_eq!(aggregate_children(&[child(Status::Skipped)]).status, Status::Skipped);
        assert_eq!(
            aggregate_children(&[child(Status::Failed), child(Status::Aborted)]).status,
            Status::Aborted
        );

        let failed = child(Status::Failed)
            .with_failure_info(FailureInfo::new("boom", vec![FailureType::ApplicationFailure]));
        let response = aggregate_children(&[child(Status::Succeeded), failed]);
        assert_eq!(response.status, Status::Failed);
        assert_eq!(response.failure_info.unwrap().error_message, "boom");
    }
}
