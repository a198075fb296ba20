use crate::models::{Ambiance, ExecutableResponse, StepResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message a step runtime sends back about a node it is executing.
///
/// Delivery is at-least-once; `event_id` is the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkResponseEvent {
    pub event_id: String,
    pub ambiance: Ambiance,
    pub node_execution_id: String,
    pub payload: SdkResponsePayload,
}

impl SdkResponseEvent {
    pub fn new(
        event_id: impl Into<String>,
        ambiance: Ambiance,
        node_execution_id: impl Into<String>,
        payload: SdkResponsePayload,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            ambiance,
            node_execution_id: node_execution_id.into(),
            payload,
        }
    }

    pub fn response_type(&self) -> SdkResponseType {
        self.payload.response_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SdkResponsePayload {
    /// The step delegated work to an external task and waits for its result
    QueueTask { task_id: String },
    HandleProgress { progress_json: Value },
    AddStepDetails { name: String, details: Value },
    AddExecutableResponse { response: ExecutableResponse },
    HandleStepResponse(StepResponse),
    ResolveStepInputs { step_inputs: Value },
}

impl SdkResponsePayload {
    pub fn response_type(&self) -> SdkResponseType {
        match self {
            Self::QueueTask { .. } => SdkResponseType::QueueTask,
            Self::HandleProgress { .. } => SdkResponseType::HandleProgress,
            Self::AddStepDetails { .. } => SdkResponseType::AddStepDetails,
            Self::AddExecutableResponse { .. } => SdkResponseType::AddExecutableResponse,
            Self::HandleStepResponse(_) => SdkResponseType::HandleStepResponse,
            Self::ResolveStepInputs { .. } => SdkResponseType::ResolveStepInputs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SdkResponseType {
    QueueTask,
    HandleProgress,
    AddStepDetails,
    AddExecutableResponse,
    HandleStepResponse,
    ResolveStepInputs,
}

impl SdkResponseType {
    pub const ALL: [SdkResponseType; 6] = [
        Self::QueueTask,
        Self::HandleProgress,
        Self::AddStepDetails,
        Self::AddExecutableResponse,
        Self::HandleStepResponse,
        Self::ResolveStepInputs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueTask => "QUEUE_TASK",
            Self::HandleProgress => "HANDLE_PROGRESS",
            Self::AddStepDetails => "ADD_STEP_DETAILS",
            Self::AddExecutableResponse => "ADD_EXECUTABLE_RESPONSE",
            Self::HandleStepResponse => "HANDLE_STEP_RESPONSE",
            Self::ResolveStepInputs => "RESOLVE_STEP_INPUTS",
        }
    }
}

impl fmt::Display for SdkResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Status;

    #[test]
    fn test_payload_wire_format() {
        let payload: SdkResponsePayload = serde_json::from_value(serde_json::json!({
            "type": "HANDLE_STEP_RESPONSE",
            "status": "SUCCEEDED",
            "outcomes": {"output": {"code": 200}}
        }))
        .unwrap();
        match &payload {
            SdkResponsePayload::HandleStepResponse(response) => {
                assert_eq!(response.status, Status::Succeeded);
                assert!(response.failure_info.is_none());
                assert_eq!(response.outcomes["output"]["code"], 200);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(payload.response_type().to_string(), "HANDLE_STEP_RESPONSE");
    }
}
