use crate::error::{EngineError, EngineResult};
use crate::models::ambiance::{Level, StepType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Adviser attached to a plan node together with its serialized parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviserObtainment {
    pub adviser_type: String,
    pub parameters: Vec<u8>,
}

impl AdviserObtainment {
    pub fn new<P: Serialize>(adviser_type: impl Into<String>, parameters: &P) -> EngineResult<Self> {
        Ok(Self {
            adviser_type: adviser_type.into(),
            parameters: serde_json::to_vec(parameters)?,
        })
    }

    pub fn without_parameters(adviser_type: impl Into<String>) -> Self {
        Self {
            adviser_type: adviser_type.into(),
            parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanNode {
    pub uuid: String,
    pub identifier: String,
    pub name: String,
    pub step_type: StepType,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub skip_expression_chain: bool,
    /// Consulted in order, the first adviser that accepts the event decides
    #[serde(default)]
    pub adviser_obtainments: Vec<AdviserObtainment>,
    #[serde(default)]
    pub stage_fqn: Option<String>,
    #[serde(default)]
    pub step_parameters: Option<Value>,
}

impl PlanNode {
    pub fn new(uuid: impl Into<String>, identifier: impl Into<String>, step_type: StepType) -> Self {
        let identifier = identifier.into();
        Self {
            uuid: uuid.into(),
            name: identifier.clone(),
            identifier,
            step_type,
            ..Default::default()
        }
    }

    pub fn with_adviser(mut self, obtainment: AdviserObtainment) -> Self {
        self.adviser_obtainments.push(obtainment);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_skip_expression_chain(mut self, skip: bool) -> Self {
        self.skip_expression_chain = skip;
        self
    }

    pub fn with_stage_fqn(mut self, stage_fqn: impl Into<String>) -> Self {
        self.stage_fqn = Some(stage_fqn.into());
        self
    }

    pub fn with_step_parameters(mut self, parameters: Value) -> Self {
        self.step_parameters = Some(parameters);
        self
    }

    /// Level describing one execution attempt of this node
    pub fn to_level(&self, runtime_id: impl Into<String>, start_ts: i64, retry_index: u32) -> Level {
        Level::new(runtime_id, self.uuid.clone(), self.identifier.clone(), self.step_type.clone())
            .with_group(self.group.clone())
            .with_skip_expression_chain(self.skip_expression_chain)
            .with_start_ts(start_ts)
            .with_retry_index(retry_index)
            .with_node_type("PLAN_NODE")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub uuid: String,
    pub starting_node_id: String,
    pub nodes: HashMap<String, PlanNode>,
}

impl Plan {
    pub fn new(uuid: impl Into<String>, starting_node_id: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            starting_node_id: starting_node_id.into(),
            nodes: HashMap::new(),
        }
    }

    pub fn with_node(mut self, node: PlanNode) -> Self {
        self.nodes.insert(node.uuid.clone(), node);
        self
    }

    pub fn fetch_node(&self, node_id: &str) -> EngineResult<&PlanNode> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| EngineError::not_found("PlanNode", node_id))
    }

    pub fn starting_node(&self) -> EngineResult<&PlanNode> {
        self.fetch_node(&self.starting_node_id)
    }
}
