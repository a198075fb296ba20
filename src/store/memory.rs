//! In-memory store backends built on `dashmap`.
//!
//! Per-key entry locking makes conditional status updates atomic, matching the
//! compare-and-set semantics of the PostgreSQL backend.

use super::{
    stamp_status, NodeExecutionStore, PlanExpansionStore, StoreError, StoreResult, NODE_EXECUTION,
    PLAN_EXECUTION_EXPANSION,
};
use crate::constants::DELETE_BATCH_SIZE;
use crate::expansion::path::{project_paths, set_at_path};
use crate::models::{ExecutableResponse, NodeExecution, NodeExecutionUpdate, PlanExecutionExpansion};
use crate::state_machine::Status;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InMemoryNodeExecutionStore {
    records: DashMap<String, NodeExecution>,
}

impl InMemoryNodeExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl NodeExecutionStore for InMemoryNodeExecutionStore {
    async fn save(&self, node_execution: NodeExecution) -> StoreResult<NodeExecution> {
        match self.records.entry(node_execution.uuid.clone()) {
            Entry::Occupied(_) => Err(StoreError::duplicate_key(NODE_EXECUTION, &node_execution.uuid)),
            Entry::Vacant(slot) => {
                slot.insert(node_execution.clone());
                Ok(node_execution)
            }
        }
    }

    async fn save_all(&self, node_executions: Vec<NodeExecution>) -> StoreResult<()> {
        for node in node_executions {
            self.save(node).await?;
        }
        Ok(())
    }

    async fn get(&self, node_execution_id: &str) -> StoreResult<NodeExecution> {
        self.records
            .get(node_execution_id)
            .map(|n| n.value().clone())
            .ok_or_else(|| StoreError::not_found(NODE_EXECUTION, node_execution_id))
    }

    async fn get_many(&self, node_execution_ids: &[String]) -> StoreResult<Vec<NodeExecution>> {
        Ok(node_execution_ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|n| n.value().clone()))
            .collect())
    }

    async fn fetch_all_for_plan_execution(
        &self,
        plan_execution_id: &str,
    ) -> StoreResult<Vec<NodeExecution>> {
        let mut nodes: Vec<NodeExecution> = self
            .records
            .iter()
            .filter(|n| n.plan_execution_id() == plan_execution_id)
            .map(|n| n.value().clone())
            .collect();
        nodes.sort_by_key(|n| n.created_at);
        Ok(nodes)
    }

    async fn update_status_with_ops(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
        allowed_from: &[Status],
    ) -> StoreResult<Option<NodeExecution>> {
        let Some(mut node) = self.records.get_mut(node_execution_id) else {
            return Err(StoreError::not_found(NODE_EXECUTION, node_execution_id));
        };
        if !allowed_from.contains(&node.status) {
            debug!(
                node_execution_id = %node_execution_id,
                current = %node.status,
                target = %status,
                "Conditional status update skipped"
            );
            return Ok(None);
        }
        node.apply(updates);
        stamp_status(&mut node, status);
        Ok(Some(node.clone()))
    }

    async fn update(
        &self,
        node_execution_id: &str,
        updates: &[NodeExecutionUpdate],
    ) -> StoreResult<NodeExecution> {
        let Some(mut node) = self.records.get_mut(node_execution_id) else {
            return Err(StoreError::not_found(NODE_EXECUTION, node_execution_id));
        };
        node.apply(updates);
        node.version += 1;
        Ok(node.clone())
    }

    async fn add_executable_response(
        &self,
        node_execution_id: &str,
        response: &ExecutableResponse,
    ) -> StoreResult<Option<NodeExecution>> {
        let Some(mut node) = self.records.get_mut(node_execution_id) else {
            return Err(StoreError::not_found(NODE_EXECUTION, node_execution_id));
        };
        if node.executable_responses.contains(response) {
            return Ok(None);
        }
        node.apply(&[NodeExecutionUpdate::AddExecutableResponse(response.clone())]);
        node.version += 1;
        Ok(Some(node.clone()))
    }

    async fn mark_retried(&self, node_execution_id: &str) -> StoreResult<bool> {
        Ok(match self.records.get_mut(node_execution_id) {
            Some(mut node) => {
                node.old_retry = true;
                node.version += 1;
                true
            }
            None => false,
        })
    }

    async fn update_relationships_for_retry_node(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> StoreResult<bool> {
        let mut updated = false;
        for mut node in self.records.iter_mut() {
            if node.uuid == new_id {
                continue;
            }
            if node.previous_id.as_deref() == Some(old_id) {
                node.previous_id = Some(new_id.to_string());
                updated = true;
            }
            if node.next_id.as_deref() == Some(old_id) {
                node.next_id = Some(new_id.to_string());
                updated = true;
            }
        }
        Ok(updated)
    }

    async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>> {
        let mut children: Vec<NodeExecution> = self
            .records
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .map(|n| n.value().clone())
            .collect();
        children.sort_by_key(|n| n.created_at);
        Ok(children)
    }

    async fn bulk_update_status(
        &self,
        node_execution_ids: &[String],
        status: Status,
    ) -> StoreResult<usize> {
        let mut changed = 0;
        for id in node_execution_ids {
            if let Some(mut node) = self.records.get_mut(id) {
                if node.status != status {
                    stamp_status(&mut node, status);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn delete_all_for_plan_executions(
        &self,
        plan_execution_ids: &[String],
    ) -> StoreResult<usize> {
        let targets: HashSet<&str> = plan_execution_ids.iter().map(String::as_str).collect();
        let ids: Vec<String> = self
            .records
            .iter()
            .filter(|n| targets.contains(n.plan_execution_id()))
            .map(|n| n.uuid.clone())
            .collect();

        let mut deleted = 0;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            for id in batch {
                if self.records.remove(id).is_some() {
                    deleted += 1;
                }
            }
            debug!(batch_size = batch.len(), "Deleted node execution batch");
        }
        Ok(deleted)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPlanExpansionStore {
    documents: DashMap<String, PlanExecutionExpansion>,
}

impl InMemoryPlanExpansionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanExpansionStore for InMemoryPlanExpansionStore {
    async fn create(&self, expansion: PlanExecutionExpansion) -> StoreResult<()> {
        match self.documents.entry(expansion.plan_execution_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::duplicate_key(
                PLAN_EXECUTION_EXPANSION,
                &expansion.plan_execution_id,
            )),
            Entry::Vacant(slot) => {
                slot.insert(expansion);
                Ok(())
            }
        }
    }

    async fn fetch(&self, plan_execution_id: &str) -> StoreResult<Option<PlanExecutionExpansion>> {
        Ok(self.documents.get(plan_execution_id).map(|d| d.value().clone()))
    }

    async fn upsert_paths(
        &self,
        plan_execution_id: &str,
        updates: Vec<(String, Value)>,
    ) -> StoreResult<()> {
        let mut document = self
            .documents
            .entry(plan_execution_id.to_string())
            .or_insert_with(|| PlanExecutionExpansion::new(plan_execution_id));
        for (path, value) in updates {
            set_at_path(&mut document.expanded_json, &path, value);
        }
        Ok(())
    }

    async fn project(&self, plan_execution_id: &str, paths: &[String]) -> StoreResult<Option<Value>> {
        Ok(self
            .documents
            .get(plan_execution_id)
            .map(|d| project_paths(&d.expanded_json, paths)))
    }

    async fn delete_all_for_plan_executions(
        &self,
        plan_execution_ids: &[String],
    ) -> StoreResult<usize> {
        Ok(plan_execution_ids
            .iter()
            .filter(|id| self.documents.remove(id.as_str()).is_some())
            .count())
    }
}
