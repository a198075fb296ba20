//! Retry adviser: re-runs a failed node on a wait schedule, then falls back to a
//! configured repair action once attempts are used up.

use super::{Adviser, AdviserResponse, AdvisingEvent, RepairActionCode};
use crate::error::EngineResult;
use crate::logging::log_advise_operation;
use crate::models::FailureType;
use crate::state_machine::Status;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAdviserParameters {
    pub retry_count: u32,
    /// Seconds to wait before each attempt; the last entry repeats
    #[serde(default)]
    pub wait_interval_list: Vec<u64>,
    pub repair_action_code_after_retry: RepairActionCode,
    #[serde(default)]
    pub applicable_failure_types: HashSet<FailureType>,
    #[serde(default)]
    pub next_node_id: Option<String>,
}

impl RetryAdviserParameters {
    /// Wait before retry number `attempt` (0-based)
    pub fn wait_interval(&self, attempt: usize) -> u64 {
        match self.wait_interval_list.len() {
            0 => 0,
            len => self.wait_interval_list[attempt.min(len - 1)],
        }
    }

    /// Advise once retries are exhausted
    pub fn repair_action(&self) -> AdviserResponse {
        let next_node_id = self.next_node_id.clone();
        match self.repair_action_code_after_retry {
            RepairActionCode::Ignore => AdviserResponse::IgnoreFailure { next_node_id },
            RepairActionCode::MarkAsSuccess => AdviserResponse::MarkSuccess { next_node_id },
            RepairActionCode::EndExecution => AdviserResponse::EndPlan { is_abort: false },
            RepairActionCode::OnFail => AdviserResponse::NextStep {
                next_node_id,
                to_status: Some(Status::Failed),
            },
            RepairActionCode::ManualIntervention => AdviserResponse::InterventionWait,
            RepairActionCode::MarkAsFailure => AdviserResponse::MarkAsFailure { next_node_id },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAdviser;

#[async_trait]
impl Adviser for RetryAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        if !event.to_status.is_retryable() {
            return Ok(false);
        }
        let parameters: RetryAdviserParameters = event.parameters()?;
        Ok(event.failure_matches(&parameters.applicable_failure_types))
    }

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        let parameters: RetryAdviserParameters = event.parameters()?;
        let node = &event.node_execution;
        let attempt = node.retry_ids.len();

        let response = if attempt < parameters.retry_count as usize {
            AdviserResponse::Retry {
                wait_interval: parameters.wait_interval(attempt),
                retry_node_execution_id: node.uuid.clone(),
            }
        } else {
            parameters.repair_action()
        };

        let details = format!("attempt {attempt} of {}", parameters.retry_count);
        log_advise_operation(
            "RETRY",
            &node.uuid,
            &response.advise_type().to_string(),
            Some(&details),
        );
        Ok(response)
    }
}
