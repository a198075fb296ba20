use super::{Adviser, AdviserResponse, AdvisingEvent};
use crate::error::EngineResult;
use crate::models::FailureType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortAdviserParameters {
    #[serde(default)]
    pub applicable_failure_types: HashSet<FailureType>,
}

/// Ends the whole plan execution on a matching failure
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortAdviser;

#[async_trait]
impl Adviser for AbortAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        if !event.to_status.is_broke() {
            return Ok(false);
        }
        let parameters: AbortAdviserParameters = event.parameters()?;
        Ok(event.failure_matches(&parameters.applicable_failure_types))
    }

    async fn on_advise_event(&self, _event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        Ok(AdviserResponse::EndPlan { is_abort: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisers::test_support::{event, failed_node};
    use crate::state_machine::Status;

    #[tokio::test]
    async fn test_abort_on_matching_failure() {
        let params = AbortAdviserParameters {
            applicable_failure_types: HashSet::from([FailureType::PolicyEvaluationFailure]),
        };
        let evt = event(failed_node(vec![FailureType::PolicyEvaluationFailure], 0), Status::Failed, &params);

        assert!(AbortAdviser.can_advise(&evt).await.unwrap());
        assert_eq!(
            AbortAdviser.on_advise_event(&evt).await.unwrap(),
            AdviserResponse::EndPlan { is_abort: true }
        );
    }
}
