use crate::models::failure::FailureInfo;
use crate::state_machine::Status;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Result a step reports when it finishes, directly or through a delegate task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub status: Status,
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    /// Named outcomes published into the plan expansion
    #[serde(default)]
    pub outcomes: BTreeMap<String, Value>,
}

impl StepResponse {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            failure_info: None,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn with_failure_info(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }

    pub fn with_outcome(mut self, name: impl Into<String>, outcome: Value) -> Self {
        self.outcomes.insert(name.into(), outcome);
        self
    }
}
