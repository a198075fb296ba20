//! Store decorator that retries transient failures with the `store` retry policy.

use super::{NodeExecutionStore, StoreError, StoreResult};
use crate::models::{ExecutableResponse, NodeExecution, NodeExecutionUpdate};
use crate::resilience::RetryPolicy;
use crate::state_machine::Status;
use async_trait::async_trait;
use std::sync::Arc;

pub struct RetryingNodeExecutionStore {
    inner: Arc<dyn NodeExecutionStore>,
    policy: RetryPolicy,
}

impl RetryingNodeExecutionStore {
    pub fn new(inner: Arc<dyn NodeExecutionStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn transient(error: &StoreError) -> bool {
    error.is_transient()
}

/// A duplicate uuid on insert is a caller bug, not a race
fn transient_for_insert(error: &StoreError) -> bool {
    error.is_transient() && !matches!(error, StoreError::DuplicateKey { .. })
}

#[async_trait]
impl NodeExecutionStore for RetryingNodeExecutionStore {
    async fn save(&self, node_execution: NodeExecution) -> StoreResult<NodeExecution> {
        self.policy
            .execute(|| self.inner.save(node_execution.clone()), transient_for_insert)
            .await
    }

    async fn save_all(&self, node_executions: Vec<NodeExecution>) -> StoreResult<()> {
        self.policy
            .execute(|| self.inner.save_all(node_executions.clone()), transient_for_insert)
            .await
    }

    async fn get(&self, node_execution_id: &str) -> StoreResult<NodeExecution> {
        self.policy
            .execute(|| self.inner.get(node_execution_id), transient)
            .await
    }

    async fn get_many(&self, node_execution_ids: &[String]) -> StoreResult<Vec<NodeExecution>> {
        self.policy
            .execute(|| self.inner.get_many(node_execution_ids), transient)
            .await
    }

    async fn fetch_all_for_plan_execution(
        &self,
        plan_execution_id: &str,
    ) -> StoreResult<Vec<NodeExecution>> {
        self.policy
            .execute(|| self.inner.fetch_all_for_plan_execution(plan_execution_id), transient)
            .await
    }

    async fn update_status_with_ops(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
        allowed_from: &[Status],
    ) -> StoreResult<Option<NodeExecution>> {
        self.policy
            .execute(
                || {
                    self.inner
                        .update_status_with_ops(node_execution_id, status, updates, allowed_from)
                },
                transient,
            )
            .await
    }

    async fn update(
        &self,
        node_execution_id: &str,
        updates: &[NodeExecutionUpdate],
    ) -> StoreResult<NodeExecution> {
        self.policy
            .execute(|| self.inner.update(node_execution_id, updates), transient)
            .await
    }

    async fn add_executable_response(
        &self,
        node_execution_id: &str,
        response: &ExecutableResponse,
    ) -> StoreResult<Option<NodeExecution>> {
        self.policy
            .execute(
                || self.inner.add_executable_response(node_execution_id, response),
                transient,
            )
            .await
    }

    async fn mark_retried(&self, node_execution_id: &str) -> StoreResult<bool> {
        self.policy
            .execute(|| self.inner.mark_retried(node_execution_id), transient)
            .await
    }

    async fn update_relationships_for_retry_node(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> StoreResult<bool> {
        self.policy
            .execute(
                || self.inner.update_relationships_for_retry_node(old_id, new_id),
                transient,
            )
            .await
    }

    async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>> {
        self.policy
            .execute(|| self.inner.fetch_children(parent_id), transient)
            .await
    }

    async fn bulk_update_status(
        &self,
        node_execution_ids: &[String],
        status: Status,
    ) -> StoreResult<usize> {
        self.policy
            .execute(|| self.inner.bulk_update_status(node_execution_ids, status), transient)
            .await
    }

    async fn delete_all_for_plan_executions(
        &self,
        plan_execution_ids: &[String],
    ) -> StoreResult<usize> {
        self.policy
            .execute(
                || self.inner.delete_all_for_plan_executions(plan_execution_ids),
                transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ambiance;
    use crate::store::InMemoryNodeExecutionStore;
    use crate::state_machine::allowed_start_statuses;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` conditional updates with an optimistic-lock conflict
    struct FlakyStore {
        inner: InMemoryNodeExecutionStore,
        failures: AtomicU32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl NodeExecutionStore for FlakyStore {
        async fn save(&self, node: NodeExecution) -> StoreResult<NodeExecution> {
            self.inner.save(node).await
        }
        async fn save_all(&self, nodes: Vec<NodeExecution>) -> StoreResult<()> {
            self.inner.save_all(nodes).await
        }
        async fn get(&self, id: &str) -> StoreResult<NodeExecution> {
            self.inner.get(id).await
        }
        async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<NodeExecution>> {
            self.inner.get_many(ids).await
        }
        async fn fetch_all_for_plan_execution(&self, id: &str) -> StoreResult<Vec<NodeExecution>> {
            self.inner.fetch_all_for_plan_execution(id).await
        }
        async fn update_status_with_ops(
            &self,
            id: &str,
            status: Status,
            updates: &[NodeExecutionUpdate],
            allowed_from: &[Status],
        ) -> StoreResult<Option<NodeExecution>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::OptimisticLockConflict {
                    entity: "NodeExecution".into(),
                    id: id.into(),
                });
            }
            self.inner
                .update_status_with_ops(id, status, updates, allowed_from)
                .await
        }
        async fn update(&self, id: &str, updates: &[NodeExecutionUpdate]) -> StoreResult<NodeExecution> {
            self.inner.update(id, updates).await
        }
        async fn add_executable_response(
            &self,
            id: &str,
            response: &ExecutableResponse,
        ) -> StoreResult<Option<NodeExecution>> {
            self.inner.add_executable_response(id, response).await
        }
        async fn mark_retried(&self, id: &str) -> StoreResult<bool> {
            self.inner.mark_retried(id).await
        }
        async fn update_relationships_for_retry_node(&self, old: &str, new: &str) -> StoreResult<bool> {
            self.inner.update_relationships_for_retry_node(old, new).await
        }
        async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>> {
            self.inner.fetch_children(parent_id).await
        }
        async fn bulk_update_status(&self, ids: &[String], status: Status) -> StoreResult<usize> {
            self.inner.bulk_update_status(ids, status).await
        }
        async fn delete_all_for_plan_executions(&self, ids: &[String]) -> StoreResult<usize> {
            self.inner.delete_all_for_plan_executions(ids).await
        }
    }

    fn flaky(failures: u32) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: InMemoryNodeExecutionStore::new(),
            failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_transient_conflicts_are_retried() {
        let inner = flaky(2);
        let store = RetryingNodeExecutionStore::new(
            inner.clone(),
            RetryPolicy::fixed("store", 3, Duration::from_millis(1)),
        );
        store
            .save(NodeExecution::queued("ne-1", Ambiance::new("pe", "p"), "n"))
            .await
            .unwrap();

        let updated = store
            .update_status_with_ops("ne-1", Status::Running, &[], &allowed_start_statuses(Status::Running))
            .await
            .unwrap();
        assert_eq!(updated.unwrap().status, Status::Running);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = flaky(5);
        let store = RetryingNodeExecutionStore::new(
            inner.clone(),
            RetryPolicy::fixed("store", 2, Duration::from_millis(1)),
        );
        store
            .save(NodeExecution::queued("ne-1", Ambiance::new("pe", "p"), "n"))
            .await
            .unwrap();

        let err = store
            .update_status_with_ops("ne-1", Status::Running, &[], &[Status::Queued])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_not_retried() {
        let store = RetryingNodeExecutionStore::new(
            Arc::new(InMemoryNodeExecutionStore::new()),
            RetryPolicy::fixed("store", 3, Duration::from_millis(1)),
        );
        let node = NodeExecution::queued("ne-1", Ambiance::new("pe", "p"), "n");
        store.save(node.clone()).await.unwrap();
        assert!(matches!(
            store.save(node).await,
            Err(StoreError::DuplicateKey { .. })
        ));
    }
}
