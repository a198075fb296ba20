use super::{Adviser, AdviserResponse, AdvisingEvent};
use crate::error::EngineResult;
use crate::models::FailureType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSuccessAdviserParameters {
    #[serde(default)]
    pub applicable_failure_types: HashSet<FailureType>,
    #[serde(default)]
    pub next_node_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkSuccessAdviser;

#[async_trait]
impl Adviser for MarkSuccessAdviser {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool> {
        if !event.to_status.is_broke() {
            return Ok(false);
        }
        let parameters: MarkSuccessAdviserParameters = event.parameters()?;
        Ok(event.failure_matches(&parameters.applicable_failure_types))
    }

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse> {
        let parameters: MarkSuccessAdviserParameters = event.parameters()?;
        Ok(AdviserResponse::MarkSuccess {
            next_node_id: parameters.next_node_id,
        })
    }
}
