use crate::constants::events;
use crate::state_machine::Status;
use serde::{Deserialize, Serialize};

/// Lifecycle notifications emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    NodeExecutionStart {
        plan_execution_id: String,
        node_execution_id: String,
        identifier: String,
    },
    NodeStatusUpdate {
        plan_execution_id: String,
        node_execution_id: String,
        from: Status,
        to: Status,
    },
    NodeRetry {
        plan_execution_id: String,
        old_node_execution_id: String,
        new_node_execution_id: String,
        wait_interval: u64,
    },
    PlanExecutionEnd {
        plan_execution_id: String,
        status: Status,
    },
    PlanExecutionAbort {
        plan_execution_id: String,
        principal: String,
    },
}

impl OrchestrationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeExecutionStart { .. } => events::NODE_EXECUTION_START,
            Self::NodeStatusUpdate { .. } => events::NODE_STATUS_UPDATE,
            Self::NodeRetry { .. } => events::NODE_RETRY,
            Self::PlanExecutionEnd { .. } => events::PLAN_EXECUTION_END,
            Self::PlanExecutionAbort { .. } => events::PLAN_EXECUTION_ABORT,
        }
    }

    pub fn plan_execution_id(&self) -> &str {
        match self {
            Self::NodeExecutionStart { plan_execution_id, .. }
            | Self::NodeStatusUpdate { plan_execution_id, .. }
            | Self::NodeRetry { plan_execution_id, .. }
            | Self::PlanExecutionEnd { plan_execution_id, .. }
            | Self::PlanExecutionAbort { plan_execution_id, .. } => plan_execution_id,
        }
    }
}
