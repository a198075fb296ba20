//! # Advise Engine
//!
//! Walks a plan node's adviser obtainments in order and returns the first response an
//! adviser is willing to give. No taker means the node concludes with its own status.

use super::plans::PlanRegistry;
use crate::advisers::{AdviserRegistry, AdviserResponse, AdvisingEvent};
use crate::error::EngineResult;
use crate::logging::log_advise_operation;
use crate::models::NodeExecution;
use crate::state_machine::Status;
use std::sync::Arc;
use tracing::debug;

pub struct AdviseEngine {
    registry: AdviserRegistry,
    plans: Arc<PlanRegistry>,
}

impl AdviseEngine {
    pub fn new(registry: AdviserRegistry, plans: Arc<PlanRegistry>) -> Self {
        Self { registry, plans }
    }

    pub async fn advise(
        &self,
        node_execution: &NodeExecution,
        from_status: Status,
        to_status: Status,
    ) -> EngineResult<Option<AdviserResponse>> {
        let plan_node = self
            .plans
            .fetch_node(node_execution.plan_execution_id(), &node_execution.node_id)?;

        for obtainment in &plan_node.adviser_obtainments {
            let adviser = self.registry.obtain(&obtainment.adviser_type)?;
            let event = AdvisingEvent::new(
                node_execution.clone(),
                from_status,
                to_status,
                obtainment.parameters.clone(),
            );

            if !adviser.can_advise(&event).await? {
                continue;
            }

            let response = adviser.on_advise_event(&event).await?;
            log_advise_operation(
                &obtainment.adviser_type,
                &node_execution.uuid,
                &response.advise_type().to_string(),
                Some(to_status.as_str()),
            );
            return Ok(Some(response));
        }

        debug!(
            node_execution_id = %node_execution.uuid,
            status = %to_status,
            "No adviser took the event"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisers::{adviser_types, NextStepAdviserParameters, RetryAdviserParameters, RepairActionCode};
    use crate::models::{
        AdviserObtainment, Ambiance, FailureInfo, FailureType, Plan, PlanNode, StepCategory, StepType,
    };
    use std::collections::HashSet;

    fn engine() -> AdviseEngine {
        let node = PlanNode::new("node-1", "http", StepType::new("HTTP", StepCategory::Step))
            .with_adviser(
                AdviserObtainment::new(
                    adviser_types::RETRY,
                    &RetryAdviserParameters {
                        retry_count: 1,
                        wait_interval_list: vec![2],
                        repair_action_code_after_retry: RepairActionCode::OnFail,
                        applicable_failure_types: HashSet::from([FailureType::ConnectivityFailure]),
                        next_node_id: None,
                    },
                )
                .unwrap(),
            )
            .with_adviser(
                AdviserObtainment::new(
                    adviser_types::ON_SUCCESS,
                    &NextStepAdviserParameters {
                        next_node_id: Some("node-2".into()),
                        ..Default::default()
                    },
                )
                .unwrap(),
            );
        let plans = Arc::new(PlanRegistry::new());
        plans.register("pe-1", Plan::new("plan-1", "node-1").with_node(node));
        AdviseEngine::new(AdviserRegistry::with_defaults(), plans)
    }

    fn node(status: Status, failure: Option<FailureType>) -> NodeExecution {
        let ambiance = Ambiance::new("pe-1", "plan-1");
        let mut node = NodeExecution::queued("ne-1", ambiance, "node-1").with_status(status);
        if let Some(failure) = failure {
            node = node.with_failure_info(FailureInfo::new("boom", vec![failure]));
        }
        node
    }

    #[tokio::test]
    async fn test_first_accepting_adviser_wins() {
        let engine = engine();

        let failed = node(Status::Failed, Some(FailureType::ConnectivityFailure));
        let response = engine.advise(&failed, Status::Running, Status::Failed).await.unwrap();
        assert!(matches!(response, Some(AdviserResponse::Retry { wait_interval: 2, .. })));

        let succeeded = node(Status::Succeeded, None);
        let response = engine.advise(&succeeded, Status::Running, Status::Succeeded).await.unwrap();
        assert_eq!(
            response,
            Some(AdviserResponse::NextStep { next_node_id: Some("node-2".into()), to_status: None })
        );
    }

    #[tokio::test]
    async fn test_no_taker_returns_none() {
        let engine = engine();
        let failed = node(Status::Failed, Some(FailureType::AuthenticationFailure));
        assert!(engine.advise(&failed, Status::Running, Status::Failed).await.unwrap().is_none());
    }
}
