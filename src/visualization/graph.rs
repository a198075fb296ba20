use crate::models::NodeExecution;
use crate::state_machine::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rendering view of one node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVertex {
    pub uuid: String,
    pub plan_node_id: String,
    pub identifier: String,
    pub name: String,
    pub step_type: String,
    pub status: Status,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub retry_ids: Vec<String>,
    pub failure_message: Option<String>,
    pub stage_fqn: Option<String>,
}

impl From<&NodeExecution> for GraphVertex {
    fn from(node: &NodeExecution) -> Self {
        Self {
            uuid: node.uuid.clone(),
            plan_node_id: node.node_id.clone(),
            identifier: node.identifier.clone(),
            name: node.name.clone(),
            step_type: node.step_type.step_type.clone(),
            status: node.status,
            start_ts: node.start_ts,
            end_ts: node.end_ts,
            retry_ids: node.retry_ids.clone(),
            failure_message: node.failure_info.as_ref().map(|f| f.error_message.clone()),
            stage_fqn: node.stage_fqn.clone(),
        }
    }
}

/// Execution tree of a plan execution as seen by a UI: vertices plus parent→children
/// and previous→next adjacency. Superseded retry attempts are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationGraph {
    pub plan_execution_id: String,
    pub root_id: Option<String>,
    pub vertices: HashMap<String, GraphVertex>,
    pub children: HashMap<String, Vec<String>>,
    pub next: HashMap<String, String>,
}

impl OrchestrationGraph {
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            ..Default::default()
        }
    }

    pub fn build(plan_execution_id: impl Into<String>, mut nodes: Vec<NodeExecution>) -> Self {
        let mut graph = Self::new(plan_execution_id);
        nodes.sort_by_key(|n| n.created_at);
        for node in nodes.iter().filter(|n| !n.old_retry) {
            graph.apply_update(node);
        }
        graph
    }

    /// Upsert the vertex for `node`. A newer retry attempt takes over its predecessor's
    /// position; a superseded attempt is dropped.
    pub fn apply_update(&mut self, node: &NodeExecution) {
        if node.old_retry {
            self.remove_vertex(&node.uuid);
            return;
        }

        if let Some(previous_attempt) = node.retry_ids.last() {
            if self.vertices.contains_key(previous_attempt) {
                self.replace_vertex(previous_attempt, &node.uuid);
            }
        }

        self.vertices.insert(node.uuid.clone(), GraphVertex::from(node));

        match &node.parent_id {
            Some(parent_id) => {
                let siblings = self.children.entry(parent_id.clone()).or_default();
                if !siblings.contains(&node.uuid) {
                    siblings.push(node.uuid.clone());
                }
            }
            None if node.previous_id.is_none() => self.root_id = Some(node.uuid.clone()),
            None => {}
        }

        if let Some(previous_id) = &node.previous_id {
            self.next.insert(previous_id.clone(), node.uuid.clone());
        }
        if let Some(next_id) = &node.next_id {
            self.next.insert(node.uuid.clone(), next_id.clone());
        }
    }

    pub fn vertex(&self, uuid: &str) -> Option<&GraphVertex> {
        self.vertices.get(uuid)
    }

    pub fn children_of(&self, uuid: &str) -> &[String] {
        self.children.get(uuid).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn replace_vertex(&mut self, old_id: &str, new_id: &str) {
        self.vertices.remove(old_id);
        for siblings in self.children.values_mut() {
            for id in siblings.iter_mut().filter(|id| *id == old_id) {
                *id = new_id.to_string();
            }
        }
        for next_id in self.next.values_mut().filter(|id| *id == old_id) {
            *next_id = new_id.to_string();
        }
        if let Some(next_id) = self.next.remove(old_id) {
            self.next.insert(new_id.to_string(), next_id);
        }
        self.children.remove(old_id);
        if self.root_id.as_deref() == Some(old_id) {
            self.root_id = Some(new_id.to_string());
        }
    }

    fn remove_vertex(&mut self, uuid: &str) {
        if self.vertices.remove(uuid).is_none() {
            return;
        }
        for siblings in self.children.values_mut() {
            siblings.retain(|id| id != uuid);
        }
        self.children.remove(uuid);
        self.next.remove(uuid);
        self.next.retain(|_, next_id| next_id != uuid);
        if self.root_id.as_deref() == Some(uuid) {
            self.root_id = None;
        }
    }
}
