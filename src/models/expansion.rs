use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Denormalized JSON projection of one plan execution's tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanExecutionExpansion {
    pub plan_execution_id: String,
    pub expanded_json: Value,
    pub created_at: DateTime<Utc>,
}

impl PlanExecutionExpansion {
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            expanded_json: Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }
}
