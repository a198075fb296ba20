//! Store doubles for failure paths

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_engine::models::{ExecutableResponse, NodeExecution, NodeExecutionUpdate};
use pipeline_engine::state_machine::Status;
use pipeline_engine::store::{InMemoryNodeExecutionStore, NodeExecutionStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory store whose plan-wide reads time out while `unavailable` is set
#[derive(Debug, Default)]
pub struct UnavailableReadsStore {
    inner: InMemoryNodeExecutionStore,
    unavailable: AtomicBool,
    pub failed_reads: AtomicUsize,
}

impl UnavailableReadsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeExecutionStore for UnavailableReadsStore {
    async fn save(&self, node_execution: NodeExecution) -> StoreResult<NodeExecution> {
        self.inner.save(node_execution).await
    }

    async fn save_all(&self, node_executions: Vec<NodeExecution>) -> StoreResult<()> {
        self.inner.save_all(node_executions).await
    }

    async fn get(&self, node_execution_id: &str) -> StoreResult<NodeExecution> {
        self.inner.get(node_execution_id).await
    }

    async fn get_many(&self, node_execution_ids: &[String]) -> StoreResult<Vec<NodeExecution>> {
        self.inner.get_many(node_execution_ids).await
    }

    async fn fetch_all_for_plan_execution(&self, plan_execution_id: &str) -> StoreResult<Vec<NodeExecution>> {
        if self.unavailable.load(Ordering::SeqCst) {
            self.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Timeout("statement timeout".into()));
        }
        self.inner.fetch_all_for_plan_execution(plan_execution_id).await
    }

    async fn update_status_with_ops(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
        allowed_from: &[Status],
    ) -> StoreResult<Option<NodeExecution>> {
        self.inner
            .update_status_with_ops(node_execution_id, status, updates, allowed_from)
            .await
    }

    async fn update(&self, node_execution_id: &str, updates: &[NodeExecutionUpdate]) -> StoreResult<NodeExecution> {
        self.inner.update(node_execution_id, updates).await
    }

    async fn add_executable_response(
        &self,
        node_execution_id: &str,
        response: &ExecutableResponse,
    ) -> StoreResult<Option<NodeExecution>> {
        self.inner.add_executable_response(node_execution_id, response).await
    }

    async fn mark_retried(&self, node_execution_id: &str) -> StoreResult<bool> {
        self.inner.mark_retried(node_execution_id).await
    }

    async fn update_relationships_for_retry_node(&self, old_id: &str, new_id: &str) -> StoreResult<bool> {
        self.inner.update_relationships_for_retry_node(old_id, new_id).await
    }

    async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>> {
        self.inner.fetch_children(parent_id).await
    }

    async fn bulk_update_status(&self, node_execution_ids: &[String], status: Status) -> StoreResult<usize> {
        self.inner.bulk_update_status(node_execution_ids, status).await
    }

    async fn delete_all_for_plan_executions(&self, plan_execution_ids: &[String]) -> StoreResult<usize> {
        self.inner.delete_all_for_plan_executions(plan_execution_ids).await
    }
}
