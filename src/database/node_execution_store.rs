//! PostgreSQL node execution store.
//!
//! Each record is a JSONB document; `status`, `parent_id`, `old_retry` and `version` are
//! lifted into columns so conditional updates and tree queries can use indexes. Mutations
//! run in a transaction holding `SELECT ... FOR UPDATE` on the row.

use crate::constants::DELETE_BATCH_SIZE;
use crate::models::{ExecutableResponse, NodeExecution, NodeExecutionUpdate};
use crate::state_machine::Status;
use crate::store::{stamp_status, NodeExecutionStore, StoreError, StoreResult, NODE_EXECUTION};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

const SELECT_DOCUMENT: &str = "SELECT document FROM node_executions";

#[derive(Debug, Clone)]
pub struct PgNodeExecutionStore {
    pool: PgPool,
}

impl PgNodeExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        node_execution_id: &str,
    ) -> StoreResult<NodeExecution> {
        let row: Option<Json<NodeExecution>> =
            sqlx::query_scalar(&format!("{SELECT_DOCUMENT} WHERE uuid = $1 FOR UPDATE"))
                .bind(node_execution_id)
                .fetch_optional(&mut **tx)
                .await?;
        row.map(|Json(node)| node)
            .ok_or_else(|| StoreError::not_found(NODE_EXECUTION, node_execution_id))
    }

    async fn write_row(tx: &mut Transaction<'_, Postgres>, node: &NodeExecution) -> StoreResult<()> {
        sqlx::query(
            "UPDATE node_executions
             SET status = $2, parent_id = $3, old_retry = $4, version = $5, document = $6
             WHERE uuid = $1",
        )
        .bind(&node.uuid)
        .bind(node.status.as_str())
        .bind(&node.parent_id)
        .bind(node.old_retry)
        .bind(node.version)
        .bind(Json(node))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        node: &NodeExecution,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO node_executions
                 (uuid, plan_execution_id, parent_id, status, old_retry, version, created_at, document)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&node.uuid)
        .bind(node.plan_execution_id())
        .bind(&node.parent_id)
        .bind(node.status.as_str())
        .bind(node.old_retry)
        .bind(node.version)
        .bind(node.created_at)
        .bind(Json(node))
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn fetch_where(&self, clause: &str, bind: &str) -> StoreResult<Vec<NodeExecution>> {
        let rows: Vec<Json<NodeExecution>> =
            sqlx::query_scalar(&format!("{SELECT_DOCUMENT} WHERE {clause} ORDER BY created_at"))
                .bind(bind)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(node)| node).collect())
    }

    async fn relink(&self, field: &str, old_id: &str, new_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE node_executions
             SET document = jsonb_set(document, '{{{field}}}', to_jsonb($2::text))
             WHERE uuid <> $2 AND document->>'{field}' = $1"
        ))
        .bind(old_id)
        .bind(new_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NodeExecutionStore for PgNodeExecutionStore {
    async fn save(&self, node_execution: NodeExecution) -> StoreResult<NodeExecution> {
        Self::insert(&self.pool, &node_execution).await?;
        Ok(node_execution)
    }

    async fn save_all(&self, node_executions: Vec<NodeExecution>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for node in &node_executions {
            Self::insert(&mut *tx, node).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, node_execution_id: &str) -> StoreResult<NodeExecution> {
        self.fetch_where("uuid = $1", node_execution_id)
            .await?
            .pop()
            .ok_or_else(|| StoreError::not_found(NODE_EXECUTION, node_execution_id))
    }

    async fn get_many(&self, node_execution_ids: &[String]) -> StoreResult<Vec<NodeExecution>> {
        let rows: Vec<Json<NodeExecution>> =
            sqlx::query_scalar(&format!("{SELECT_DOCUMENT} WHERE uuid = ANY($1) ORDER BY created_at"))
                .bind(node_execution_ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(node)| node).collect())
    }

    async fn fetch_all_for_plan_execution(
        &self,
        plan_execution_id: &str,
    ) -> StoreResult<Vec<NodeExecution>> {
        self.fetch_where("plan_execution_id = $1", plan_execution_id).await
    }

    async fn update_status_with_ops(
        &self,
        node_execution_id: &str,
        status: Status,
        updates: &[NodeExecutionUpdate],
        allowed_from: &[Status],
    ) -> StoreResult<Option<NodeExecution>> {
        let mut tx = self.pool.begin().await?;
        let mut node = Self::lock_row(&mut tx, node_execution_id).await?;

        if !allowed_from.contains(&node.status) {
            debug!(
                node_execution_id = %node_execution_id,
                current = %node.status,
                target = %status,
                "Conditional status update skipped"
            );
            tx.rollback().await?;
            return Ok(None);
        }

        node.apply(updates);
        stamp_status(&mut node, status);
        Self::write_row(&mut tx, &node).await?;
        tx.commit().await?;
        Ok(Some(node))
    }

    async fn update(
        &self,
        node_execution_id: &str,
        updates: &[NodeExecutionUpdate],
    ) -> StoreResult<NodeExecution> {
        let mut tx = self.pool.begin().await?;
        let mut node = Self::lock_row(&mut tx, node_execution_id).await?;
        node.apply(updates);
        node.version += 1;
        Self::write_row(&mut tx, &node).await?;
        tx.commit().await?;
        Ok(node)
    }

    async fn add_executable_response(
        &self,
        node_execution_id: &str,
        response: &ExecutableResponse,
    ) -> StoreResult<Option<NodeExecution>> {
        let mut tx = self.pool.begin().await?;
        let mut node = Self::lock_row(&mut tx, node_execution_id).await?;
        if node.executable_responses.contains(response) {
            tx.rollback().await?;
            return Ok(None);
        }

        node.apply(&[NodeExecutionUpdate::AddExecutableResponse(response.clone())]);
        node.version += 1;
        Self::write_row(&mut tx, &node).await?;
        tx.commit().await?;
        Ok(Some(node))
    }

    async fn mark_retried(&self, node_execution_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE node_executions
             SET old_retry = TRUE,
                 version = version + 1,
                 document = jsonb_set(jsonb_set(document, '{old_retry}', 'true'),
                                      '{version}', to_jsonb(version + 1))
             WHERE uuid = $1",
        )
        .bind(node_execution_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_relationships_for_retry_node(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> StoreResult<bool> {
        let previous = self.relink("previous_id", old_id, new_id).await?;
        let next = self.relink("next_id", old_id, new_id).await?;
        Ok(previous + next > 0)
    }

    async fn fetch_children(&self, parent_id: &str) -> StoreResult<Vec<NodeExecution>> {
        self.fetch_where("parent_id = $1", parent_id).await
    }

    async fn bulk_update_status(
        &self,
        node_execution_ids: &[String],
        status: Status,
    ) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<Json<NodeExecution>> = sqlx::query_scalar(&format!(
            "{SELECT_DOCUMENT} WHERE uuid = ANY($1) AND status <> $2 FOR UPDATE"
        ))
        .bind(node_execution_ids)
        .bind(status.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let changed = rows.len();
        for Json(mut node) in rows {
            stamp_status(&mut node, status);
            Self::write_row(&mut tx, &node).await?;
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn delete_all_for_plan_executions(
        &self,
        plan_execution_ids: &[String],
    ) -> StoreResult<usize> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT uuid FROM node_executions WHERE plan_execution_id = ANY($1)")
                .bind(plan_execution_ids)
                .fetch_all(&self.pool)
                .await?;

        let mut deleted = 0;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let result = sqlx::query("DELETE FROM node_executions WHERE uuid = ANY($1)")
                .bind(batch)
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected() as usize;
            debug!(batch_size = batch.len(), "Deleted node execution batch");
        }
        Ok(deleted)
    }

    async fn count_by_parent_id_and_status_in(
        &self,
        parent_id: &str,
        statuses: &[Status],
    ) -> StoreResult<usize> {
        let statuses: Vec<&str> = statuses.iter().map(Status::as_str).collect();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM node_executions
             WHERE parent_id = $1 AND NOT old_retry AND status = ANY($2)",
        )
        .bind(parent_id)
        .bind(&statuses)
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
