//! # Persistence Contracts
//!
//! Storage traits for node executions and plan expansion documents, plus the
//! [`StoreError`] model shared by every backend.
//!
//! ## Backends
//!
//! - [`memory`]: `dashmap`-backed, used in tests and embedded mode
//! - [`crate::database`]: PostgreSQL via `sqlx` (feature `postgres`)
//! - [`retrying`]: decorator applying the `store` retry policy to transient failures
//!
//! Tree-shaped queries (`find_all_children_with_status_in`,
//! `fetch_children_recursively_without_old_retries`) have default implementations built
//! on [`NodeExecutionStore::fetch_all_for_plan_execution`], so backends only provide the
//! primitive reads and writes.

pub mod memory;
pub mod retrying;

use crate::models::{
    ExecutableResponse, NodeExecution, NodeExecutionUpdate, PlanExecutionExpansion, StepCategory,
};
use crate::state_machine::Status;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

pub use memory::{InMemoryNodeExecutionStore, InMemoryPlanExpansionStore};
pub use retrying::RetryingNodeExecutionStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate key for {entity}: {id}")]
    DuplicateKey { entity: String, id: String },

    #[error("Concurrent modification of {entity} {id}")]
    OptimisticLockConflict { entity: String, id: String },

    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate_key(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateKey {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Conflicts and timeouts that a bounded retry can resolve
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::OptimisticLockConflict { .. } | Self::DuplicateKey { .. } | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub const NODE_EXECUTION: &str = "NodeExecution";
pub const PLAN_EXECUTION_EXPANSION: &str = "PlanExecutionExpansion";

#[async_trait]
pub trait NodeExecutionStore: Send + Sync {
    /// Insert a new record, failing with [`StoreError::DuplicateKey`] if the uuid exists
    async fn save(&self, node_execution: NodeExecution) -> StoreResult<NodeExecution>;

    async fn save_all(&self, node_executions: Vec<NodeExecution>) -> StoreResult<()>;

    async fn get(&self, node_execution_id: &str) -> StoreResult<NodeExecution>;

    /// Missing ids are skipped
    async fn get_many(&self, node_execution_ids: &[String]) -> StoreResult<Vec<NodeExecution>>;

    async fn fetch_all_for_plan_execution(
        &self,
        plan_execution_id: &str,
    ) -> StoreResult<Vec<NodeExecution>>;

    /// Set `status` and apply `updates` only if the current status is in `allowed_from`.
    /// Returns `None` when the condition does not hold.
    async fn update_status_with_ops(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
        allowed_from: &[Status],
    ) -> StoreResult<Option<NodeExecution>>;

    async fn update(
        &self,
        node_execution_id: &str,
        updates: &[NodeExecutionUpdate],
    ) -> StoreResult<NodeExecution>;

    /// Append `response` unless an equal one is already recorded, in one atomic step.
    /// Returns `None` when it was already present.
    async fn add_executable_response(
        &self,
        node_execution_id: &str,
        response: &ExecutableResponse,
    ) -> StoreResult<Option<NodeExecution>>;

    /// Flag a superseded attempt; `false` when no record exists
    async fn mark_retried(&self, node_execution_id: &str) -> StoreResult<bool>;

    /// Point sibling links that referenced `old_id` at `new_id`
    async fn update_relationships_for_retry_node(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> StoreResult<bool>;

    async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>>;

    /// Bulk-set `status` on the given ids, without transition checks. Returns the number changed.
    async fn bulk_update_status(&self, node_execution_ids: &[String], status: Status)
        -> StoreResult<usize>;

    /// Remove every record of the given plan executions, in batches
    async fn delete_all_for_plan_executions(&self, plan_execution_ids: &[String])
        -> StoreResult<usize>;

    async fn get_by_plan_node_uuid(
        &self,
        plan_node_id: &str,
        plan_execution_id: &str,
    ) -> StoreResult<NodeExecution> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        nodes
            .into_iter()
            .filter(|n| n.node_id == plan_node_id && !n.old_retry)
            .max_by_key(|n| n.created_at)
            .ok_or_else(|| {
                StoreError::InvalidRequest(format!(
                    "Node Execution is null for planNodeUuid: {plan_node_id}"
                ))
            })
    }

    async fn fetch_children_recursively_without_old_retries(
        &self,
        plan_execution_id: &str,
        parent_ids: &[String],
    ) -> StoreResult<Vec<NodeExecution>> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        Ok(descendants_without_old_retries(nodes, parent_ids))
    }

    async fn find_all_children_with_status_in(
        &self,
        plan_execution_id: &str,
        parent_id: &str,
        statuses: &[Status],
        include_parent: bool,
        include_children_of_strategy: bool,
    ) -> StoreResult<Vec<NodeExecution>> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        Ok(children_with_status_in(
            nodes,
            parent_id,
            statuses,
            include_parent,
            include_children_of_strategy,
        ))
    }

    async fn count_by_parent_id_and_status_in(
        &self,
        parent_id: &str,
        statuses: &[Status],
    ) -> StoreResult<usize> {
        let children = self.fetch_children(parent_id).await?;
        Ok(children
            .iter()
            .filter(|n| !n.old_retry && statuses.contains(&n.status))
            .count())
    }

    async fn fetch_non_final_nodes(&self, plan_execution_id: &str) -> StoreResult<Vec<NodeExecution>> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        Ok(nodes
            .into_iter()
            .filter(|n| !n.old_retry && !n.status.is_final())
            .collect())
    }

    /// Move every non-final node to ERRORED
    async fn error_out_active_nodes(&self, plan_execution_id: &str) -> StoreResult<usize> {
        let ids: Vec<String> = self
            .fetch_non_final_nodes(plan_execution_id)
            .await?
            .into_iter()
            .map(|n| n.uuid)
            .collect();
        self.bulk_update_status(&ids, Status::Errored).await
    }

    async fn mark_leaves_discontinuing(&self, node_execution_ids: &[String]) -> StoreResult<usize> {
        let nodes = self.get_many(node_execution_ids).await?;
        let ids: Vec<String> = nodes
            .into_iter()
            .filter(|n| n.status.is_abort_and_expire() && n.status != Status::Discontinuing)
            .map(|n| n.uuid)
            .collect();
        self.bulk_update_status(&ids, Status::Discontinuing).await
    }

    /// Leaves whose status is in `statuses`, plus every QUEUED node, become DISCONTINUING
    async fn mark_all_leaves_and_queued_nodes_discontinuing(
        &self,
        plan_execution_id: &str,
        statuses: &[Status],
    ) -> StoreResult<usize> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        let parents: HashSet<&str> = nodes
            .iter()
            .filter(|n| !n.old_retry)
            .filter_map(|n| n.parent_id.as_deref())
            .collect();

        let ids: Vec<String> = nodes
            .iter()
            .filter(|n| !n.old_retry)
            .filter(|n| {
                n.status == Status::Queued
                    || (statuses.contains(&n.status) && !parents.contains(n.uuid.as_str()))
            })
            .map(|n| n.uuid.clone())
            .collect();
        self.bulk_update_status(&ids, Status::Discontinuing).await
    }

    async fn fetch_stage_fqns_from_stage_identifiers(
        &self,
        plan_execution_id: &str,
        stage_identifiers: &[String],
    ) -> StoreResult<Vec<String>> {
        let nodes = self.fetch_all_for_plan_execution(plan_execution_id).await?;
        let mut fqns: Vec<String> = nodes
            .into_iter()
            .filter(|n| n.category() == StepCategory::Stage)
            .filter(|n| stage_identifiers.contains(&n.identifier))
            .filter_map(|n| n.stage_fqn)
            .collect();
        fqns.sort();
        fqns.dedup();
        Ok(fqns)
    }
}

#[async_trait]
pub trait PlanExpansionStore: Send + Sync {
    async fn create(&self, expansion: PlanExecutionExpansion) -> StoreResult<()>;

    async fn fetch(&self, plan_execution_id: &str) -> StoreResult<Option<PlanExecutionExpansion>>;

    /// Write each `(dotted_path, value)` pair, creating the document if absent
    async fn upsert_paths(
        &self,
        plan_execution_id: &str,
        updates: Vec<(String, Value)>,
    ) -> StoreResult<()>;

    /// Read only the given dotted paths; `None` when the document does not exist
    async fn project(&self, plan_execution_id: &str, paths: &[String]) -> StoreResult<Option<Value>>;

    async fn delete_all_for_plan_executions(&self, plan_execution_ids: &[String])
        -> StoreResult<usize>;
}

/// Set `status` and bump the version; final statuses also stamp `end_ts`
pub fn stamp_status(node: &mut NodeExecution, status: Status) {
    let now = chrono::Utc::now();
    node.status = status;
    if status.is_final() {
        node.end_ts = Some(now.timestamp_millis());
    }
    node.version += 1;
    node.last_updated_at = now;
}

/// Breadth-first descendants of `parent_ids`, skipping superseded retry attempts
pub fn descendants_without_old_retries(
    nodes: Vec<NodeExecution>,
    parent_ids: &[String],
) -> Vec<NodeExecution> {
    let children = children_index(nodes.into_iter().filter(|n| !n.old_retry));
    let mut queue: VecDeque<String> = parent_ids.iter().cloned().collect();
    let mut result = Vec::new();

    while let Some(parent) = queue.pop_front() {
        if let Some(kids) = children.get(&parent) {
            for kid in kids {
                queue.push_back(kid.uuid.clone());
                result.push(kid.clone());
            }
        }
    }
    result
}

/// Walk down from `parent_id`, not descending below STRATEGY nodes unless asked to
pub fn children_with_status_in(
    nodes: Vec<NodeExecution>,
    parent_id: &str,
    statuses: &[Status],
    include_parent: bool,
    include_children_of_strategy: bool,
) -> Vec<NodeExecution> {
    let parent = nodes.iter().find(|n| n.uuid == parent_id).cloned();
    let children = children_index(nodes.into_iter());

    let mut result = Vec::new();
    if include_parent {
        if let Some(parent) = parent {
            result.push(parent);
        }
    }

    let mut queue = VecDeque::from([parent_id.to_string()]);
    while let Some(current) = queue.pop_front() {
        let Some(kids) = children.get(&current) else {
            continue;
        };
        for kid in kids {
            if statuses.is_empty() || statuses.contains(&kid.status) {
                result.push(kid.clone());
            }
            if kid.category() != StepCategory::Strategy || include_children_of_strategy {
                queue.push_back(kid.uuid.clone());
            }
        }
    }
    result
}

fn children_index(nodes: impl Iterator<Item = NodeExecution>) -> HashMap<String, Vec<NodeExecution>> {
    let mut index: HashMap<String, Vec<NodeExecution>> = HashMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.clone() {
            index.entry(parent_id).or_default().push(node);
        }
    }
    for kids in index.values_mut() {
        kids.sort_by_key(|n| n.created_at);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::duplicate_key("NodeExecution", "a").is_transient());
        assert!(StoreError::Timeout("slow".into()).is_transient());
        assert!(!StoreError::not_found("NodeExecution", "a").is_transient());
        assert!(!StoreError::backend("down").is_transient());
    }
}
