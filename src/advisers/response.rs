use crate::state_machine::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision produced by an adviser for a node that reached a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviserResponse {
    /// Re-run the node after `wait_interval` seconds
    Retry {
        wait_interval: u64,
        retry_node_execution_id: String,
    },
    IgnoreFailure {
        next_node_id: Option<String>,
    },
    MarkSuccess {
        next_node_id: Option<String>,
    },
    NextStep {
        next_node_id: Option<String>,
        to_status: Option<Status>,
    },
    EndPlan {
        is_abort: bool,
    },
    InterventionWait,
    MarkAsFailure {
        next_node_id: Option<String>,
    },
}

/// Discriminant of [`AdviserResponse`], used for dispatch and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviseType {
    Retry,
    IgnoreFailure,
    MarkSuccess,
    NextStep,
    EndPlan,
    InterventionWait,
    MarkAsFailure,
}

impl AdviserResponse {
    pub fn advise_type(&self) -> AdviseType {
        match self {
            Self::Retry { .. } => AdviseType::Retry,
            Self::IgnoreFailure { .. } => AdviseType::IgnoreFailure,
            Self::MarkSuccess { .. } => AdviseType::MarkSuccess,
            Self::NextStep { .. } => AdviseType::NextStep,
            Self::EndPlan { .. } => AdviseType::EndPlan,
            Self::InterventionWait => AdviseType::InterventionWait,
            Self::MarkAsFailure { .. } => AdviseType::MarkAsFailure,
        }
    }
}

impl fmt::Display for AdviseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Retry => "RETRY",
            Self::IgnoreFailure => "IGNORE_FAILURE",
            Self::MarkSuccess => "MARK_SUCCESS",
            Self::NextStep => "NEXT_STEP",
            Self::EndPlan => "END_PLAN",
            Self::InterventionWait => "INTERVENTION_WAIT",
            Self::MarkAsFailure => "MARK_AS_FAILURE",
        };
        f.write_str(name)
    }
}

/// Terminal action once a retry adviser has exhausted its attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairActionCode {
    Ignore,
    MarkAsSuccess,
    EndExecution,
    OnFail,
    ManualIntervention,
    MarkAsFailure,
}
