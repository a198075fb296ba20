use super::{Adviser, AdviserResponse, AdvisingEvent};
use crate::error::EngineResult;
use crate::models::FailureType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreAdviserParameters {
    #[serde(default)]
    pub applicable_failure_types: HashSet<FailureType>,
    #[serde(default)]
    pub next_node_id: Option<String>,
}

/// Swallows matching failures and lets the flow continue
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAdviser;

#[async_trait]
impl Adviser for IgnoreAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        if !event.to_status.is_broke() {
            return Ok(false);
        }
        let parameters: IgnoreAdviserParameters = event.parameters()?;
        Ok(event.failure_matches(&parameters.applicable_failure_types))
    }

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        let parameters: IgnoreAdviserParameters = event.parameters()?;
        Ok(AdviserResponse::IgnoreFailure {
            next_node_id: parameters.next_node_id,
        })
    }
}
