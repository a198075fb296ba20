use super::{allowed_start_statuses, Status};
use crate::error::EngineResult;
use crate::events::{EventPublisher, OrchestrationEvent};
use crate::expansion::PlanExpansionService;
use crate::logging::log_node_operation;
use crate::models::{NodeExecution, NodeExecutionUpdate};
use crate::store::NodeExecutionStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies guarded status transitions and fans out the side effects
pub struct NodeStatusUpdater {
    store: Arc<dyn NodeExecutionStore>,
    publisher: EventPublisher,
    expansion: Arc<PlanExpansionService>,
}

impl NodeStatusUpdater {
    pub fn new(
        store: Arc<dyn NodeExecutionStore>,
        publisher: EventPublisher,
        expansion: Arc<PlanExpansionService>,
    ) -> Self {
        Self {
            store,
            publisher,
            expansion,
        }
    }

    /// Move the node to `status` if its current status allows it.
    ///
    /// Returns `None` when the transition is not legal from the stored status, which
    /// includes the node already being at `status`.
    pub async fn update_status(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
    ) -> EngineResult<Option<NodeExecution>> {
        let current = self.store.get(node_execution_id).await?;
        let allowed = allowed_start_statuses(status);

        let Some(updated) = self
            .store
            .update_status_with_ops(node_execution_id, status, updates, &allowed)
            .await?
        else {
            debug!(
                node_execution_id = %node_execution_id,
                current = %current.status,
                target = %status,
                "Status transition not applicable, skipping"
            );
            return Ok(None);
        };

        log_node_operation(
            "status_update",
            updated.plan_execution_id(),
            &updated.uuid,
            status.as_str(),
            Some(current.status.as_str()),
        );

        let event = OrchestrationEvent::NodeStatusUpdate {
            plan_execution_id: updated.plan_execution_id().to_string(),
            node_execution_id: updated.uuid.clone(),
            from: current.status,
            to: status,
        };
        if let Err(error) = self.publisher.publish_event(&event) {
            warn!(error = %error, "Failed to publish node status update");
        }

        if let Err(error) = self.expansion.update_status(&updated.ambiance, status).await {
            warn!(
                node_execution_id = %updated.uuid,
                error = %error,
                "Failed to project status into plan expansion"
            );
        }

        Ok(Some(updated))
    }
}
