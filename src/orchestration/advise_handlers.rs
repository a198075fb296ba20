//! Acting on adviser responses. One handler per [`AdviseType`](crate::advisers::AdviseType).

use super::node_executor::NodeExecutor;
use super::retry_helper::build_retry_attempt;
use crate::advisers::AdviserResponse;
use crate::error::EngineResult;
use crate::events::OrchestrationEvent;
use crate::logging::log_node_operation;
use crate::models::NodeExecution;
use crate::state_machine::Status;
use crate::store::NodeExecutionStore;
use std::time::Duration;
use tracing::{info, warn};

impl NodeExecutor {
    pub(super) async fn handle_advise(
        &self,
        node: &NodeExecution,
        response: AdviserResponse,
    ) -> EngineResult<()> {
        match response {
            AdviserResponse::Retry { wait_interval, .. } => {
                self.handle_retry(node, wait_interval).await
            }
            AdviserResponse::IgnoreFailure { next_node_id } => {
                self.conclude_and_proceed(node, Status::IgnoreFailed, next_node_id).await
            }
            AdviserResponse::MarkSuccess { next_node_id } => {
                self.conclude_and_proceed(node, Status::Succeeded, next_node_id).await
            }
            AdviserResponse::NextStep { next_node_id, to_status } => {
                let status = to_status.unwrap_or(node.status);
                self.conclude_and_proceed(node, status, next_node_id).await
            }
            AdviserResponse::EndPlan { is_abort } => self.handle_end_plan(node, is_abort).await,
            AdviserResponse::InterventionWait => {
                self.updater
                    .update_status(&node.uuid, Status::InterventionWaiting, &[])
                    .await?;
                Ok(())
            }
            AdviserResponse::MarkAsFailure { next_node_id } => {
                self.conclude_and_proceed(node, Status::Failed, next_node_id).await
            }
        }
    }

    async fn conclude_and_proceed(
        &self,
        node: &NodeExecution,
        status: Status,
        next_node_id: Option<String>,
    ) -> EngineResult<()> {
        let concluded = match self.updater.update_status(&node.uuid, status, &[]).await? {
            Some(updated) => updated,
            None => self.store.get(&node.uuid).await?,
        };
        self.proceed(&concluded, next_node_id).await
    }

    /// Save a QUEUED attempt in place of `node`. It starts right away without a wait;
    /// otherwise it is scheduled and started by [`NodeExecutor::start_due_retries`].
    pub(super) async fn handle_retry(&self, node: &NodeExecution, wait_interval: u64) -> EngineResult<()> {
        let attempt = self.store.save(build_retry_attempt(node)).await?;
        self.store.mark_retried(&node.uuid).await?;
        self.store
            .update_relationships_for_retry_node(&node.uuid, &attempt.uuid)
            .await?;

        log_node_operation(
            "retry",
            node.plan_execution_id(),
            &attempt.uuid,
            attempt.status.as_str(),
            Some(&node.uuid),
        );

        let event = OrchestrationEvent::NodeRetry {
            plan_execution_id: node.plan_execution_id().to_string(),
            old_node_execution_id: node.uuid.clone(),
            new_node_execution_id: attempt.uuid.clone(),
            wait_interval,
        };
        if let Err(error) = self.publisher.publish_event(&event) {
            warn!(error = %error, "Failed to publish node retry");
        }

        if wait_interval == 0 {
            self.start(attempt).await?;
            return Ok(());
        }

        info!(
            node_execution_id = %attempt.uuid,
            wait_interval,
            "Retry attempt scheduled"
        );
        self.retries
            .schedule(attempt.uuid, Duration::from_secs(wait_interval));
        Ok(())
    }

    /// Stop everything still moving in the plan execution
    async fn handle_end_plan(&self, node: &NodeExecution, is_abort: bool) -> EngineResult<()> {
        let plan_execution_id = node.plan_execution_id();
        let status = if is_abort { Status::Aborted } else { node.status };
        let affected = interrupt_plan_execution(self.store.as_ref(), plan_execution_id, is_abort).await?;

        info!(
            plan_execution_id = %plan_execution_id,
            node_execution_id = %node.uuid,
            is_abort,
            affected,
            "Ending plan execution on adviser request"
        );
        self.end_plan(plan_execution_id, status);
        Ok(())
    }
}

/// Discontinue leaves and queued nodes, then abort active nodes (`is_abort`) or error out
/// everything non-final. Returns the number of nodes moved to the terminal status.
pub async fn interrupt_plan_execution(
    store: &dyn NodeExecutionStore,
    plan_execution_id: &str,
    is_abort: bool,
) -> EngineResult<usize> {
    store
        .mark_all_leaves_and_queued_nodes_discontinuing(
            plan_execution_id,
            &crate::state_machine::groups::abort_and_expire_statuses(),
        )
        .await?;

    if !is_abort {
        return Ok(store.error_out_active_nodes(plan_execution_id).await?);
    }

    let active: Vec<String> = store
        .fetch_all_for_plan_execution(plan_execution_id)
        .await?
        .into_iter()
        .filter(|n| !n.old_retry && n.status.is_active())
        .map(|n| n.uuid)
        .collect();
    Ok(store.bulk_update_status(&active, Status::Aborted).await?)
}
