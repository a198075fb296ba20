//! # Node Execution
//!
//! One record per execution attempt of a plan node. Records link to their parent and
//! siblings by uuid and keep retry history through `retry_ids`/`old_retry`; they are
//! never removed while the plan execution is live.

use crate::advisers::AdviserResponse;
use crate::models::ambiance::{Ambiance, StepCategory, StepType};
use crate::models::failure::FailureInfo;
use crate::state_machine::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How the node's step executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeExecutionMode {
    #[default]
    Unknown,
    Sync,
    Async,
    Task,
    Child,
    Children,
    ChildChain,
    Wait,
}

/// What a running step is blocked on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutableResponse {
    Task { task_id: String },
    Async { callback_ids: Vec<String> },
    Child { child_node_id: String },
    Sync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub uuid: String,
    pub ambiance: Ambiance,
    /// Plan node this execution belongs to
    pub node_id: String,
    pub name: String,
    pub identifier: String,
    pub step_type: StepType,
    pub parent_id: Option<String>,
    pub previous_id: Option<String>,
    pub next_id: Option<String>,
    pub status: Status,
    pub mode: NodeExecutionMode,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub failure_info: Option<FailureInfo>,
    pub retry_ids: Vec<String>,
    pub old_retry: bool,
    pub resolved_step_parameters: Option<Value>,
    pub adviser_response: Option<AdviserResponse>,
    pub stage_fqn: Option<String>,
    pub step_details: HashMap<String, Value>,
    pub progress_data: Option<Value>,
    pub executable_responses: Vec<ExecutableResponse>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl NodeExecution {
    /// A fresh QUEUED attempt positioned at the ambiance's current level
    pub fn queued(uuid: impl Into<String>, ambiance: Ambiance, node_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let current = ambiance.obtain_current_level().cloned().unwrap_or_default();
        Self {
            uuid: uuid.into(),
            node_id: node_id.into(),
            name: current.identifier.clone(),
            identifier: current.identifier,
            step_type: current.step_type,
            ambiance,
            parent_id: None,
            previous_id: None,
            next_id: None,
            status: Status::Queued,
            mode: NodeExecutionMode::Unknown,
            start_ts: Some(now.timestamp_millis()),
            end_ts: None,
            failure_info: None,
            retry_ids: Vec::new(),
            old_retry: false,
            resolved_step_parameters: None,
            adviser_response: None,
            stage_fqn: None,
            step_details: HashMap::new(),
            progress_data: None,
            executable_responses: Vec::new(),
            version: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn with_parent_id(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_previous_id(mut self, previous_id: Option<String>) -> Self {
        self.previous_id = previous_id;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: NodeExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stage_fqn(mut self, stage_fqn: Option<String>) -> Self {
        self.stage_fqn = stage_fqn;
        self
    }

    pub fn with_retry_ids(mut self, retry_ids: Vec<String>) -> Self {
        self.retry_ids = retry_ids;
        self
    }

    pub fn with_old_retry(mut self, old_retry: bool) -> Self {
        self.old_retry = old_retry;
        self
    }

    pub fn with_failure_info(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }

    pub fn plan_execution_id(&self) -> &str {
        &self.ambiance.plan_execution_id
    }

    pub fn category(&self) -> StepCategory {
        self.step_type.step_category
    }

    /// Apply field mutations in order; status is changed separately through a conditional update
    pub fn apply(&mut self, updates: &[NodeExecutionUpdate]) {
        for update in updates {
            match update {
                NodeExecutionUpdate::StepDetails { name, details } => {
                    self.step_details.insert(name.clone(), details.clone());
                }
                NodeExecutionUpdate::ProgressData(data) => {
                    self.progress_data = Some(data.clone());
                }
                NodeExecutionUpdate::AddExecutableResponse(response) => {
                    self.executable_responses.push(response.clone());
                }
                NodeExecutionUpdate::ResolvedStepParameters(parameters) => {
                    self.resolved_step_parameters = Some(parameters.clone());
                }
                NodeExecutionUpdate::FailureInfo(info) => {
                    self.failure_info = Some(info.clone());
                }
                NodeExecutionUpdate::AdviserResponse(response) => {
                    self.adviser_response = Some(response.clone());
                }
                NodeExecutionUpdate::Mode(mode) => {
                    self.mode = *mode;
                }
                NodeExecutionUpdate::NextId(next_id) => {
                    self.next_id = Some(next_id.clone());
                }
                NodeExecutionUpdate::PreviousId(previous_id) => {
                    self.previous_id = Some(previous_id.clone());
                }
                NodeExecutionUpdate::EndTs(end_ts) => {
                    self.end_ts = Some(*end_ts);
                }
            }
        }
        self.last_updated_at = Utc::now();
    }
}

/// Field-level mutation applied to a stored node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeExecutionUpdate {
    StepDetails { name: String, details: Value },
    ProgressData(Value),
    AddExecutableResponse(ExecutableResponse),
    ResolvedStepParameters(Value),
    FailureInfo(FailureInfo),
    AdviserResponse(AdviserResponse),
    Mode(NodeExecutionMode),
    NextId(String),
    PreviousId(String),
    EndTs(i64),
}
