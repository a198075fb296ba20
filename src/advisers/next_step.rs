//! Advisers that hand control to a following node: on success, or on a matching failure.

use super::{Adviser, AdviserResponse, AdvisingEvent};
use crate::error::EngineResult;
use crate::models::FailureType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStepAdviserParameters {
    #[serde(default)]
    pub next_node_id: Option<String>,
    /// Only consulted by the on-fail adviser
    #[serde(default)]
    pub applicable_failure_types: HashSet<FailureType>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OnSuccessAdviser;

#[async_trait]
impl Adviser for OnSuccessAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        Ok(event.to_status.is_positive())
    }

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        let parameters: NextStepAdviserParameters = event.parameters()?;
        Ok(AdviserResponse::NextStep {
            next_node_id: parameters.next_node_id,
            to_status: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OnFailAdviser;

#[async_trait]
impl Adviser for OnFailAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        if !event.to_status.is_broke() {
            return Ok(false);
        }
        let parameters: NextStepAdviserParameters = event.parameters()?;
        Ok(event.failure_matches(&parameters.applicable_failure_types))
    }

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        let parameters: NextStepAdviserParameters = event.parameters()?;
        Ok(AdviserResponse::NextStep {
            next_node_id: parameters.next_node_id,
            to_status: Some(event.to_status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisers::test_support::{event, failed_node};
    use crate::state_machine::Status;

    fn params() -> NextStepAdviserParameters {
        NextStepAdviserParameters {
            next_node_id: Some("n2".into()),
            applicable_failure_types: HashSet::from([FailureType::AuthorizationFailure]),
        }
    }

    #[tokio::test]
    async fn test_on_success_takes_positive_statuses() {
        let node = failed_node(vec![], 0);
        for status in [Status::Succeeded, Status::Skipped, Status::IgnoreFailed] {
            assert!(OnSuccessAdviser.can_advise(&event(node.clone(), status, &params())).await.unwrap());
        }
        assert!(!OnSuccessAdviser.can_advise(&event(node.clone(), Status::Failed, &params())).await.unwrap());

        let response = OnSuccessAdviser
            .on_advise_event(&event(node, Status::Succeeded, &params()))
            .await
            .unwrap();
        assert_eq!(response, AdviserResponse::NextStep { next_node_id: Some("n2".into()), to_status: None });
    }

    #[tokio::test]
    async fn test_on_fail_carries_failed_status_forward() {
        let node = failed_node(vec![FailureType::AuthorizationFailure], 0);
        let evt = event(node, Status::Failed, &params());

        assert!(OnFailAdviser.can_advise(&evt).await.unwrap());
        assert_eq!(
            OnFailAdviser.on_advise_event(&evt).await.unwrap(),
            AdviserResponse::NextStep { next_node_id: Some("n2".into()), to_status: Some(Status::Failed) }
        );
    }

    #[tokio::test]
    async fn test_on_fail_skips_unmatched_failures() {
        let node = failed_node(vec![FailureType::TimeoutFailure], 0);
        assert!(!OnFailAdviser.can_advise(&event(node, Status::Failed, &params())).await.unwrap());
    }
}
