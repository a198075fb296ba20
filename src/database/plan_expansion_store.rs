use crate::expansion::path::set_at_path;
use crate::models::PlanExecutionExpansion;
use crate::store::{PlanExpansionStore, StoreError, StoreResult, PLAN_EXECUTION_EXPANSION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;

/// Expansion documents in `plan_execution_expansions`
#[derive(Debug, Clone)]
pub struct PgPlanExpansionStore {
    pool: PgPool,
}

impl PgPlanExpansionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanExpansionStore for PgPlanExpansionStore {
    async fn create(&self, expansion: PlanExecutionExpansion) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO plan_execution_expansions (plan_execution_id, expanded_json, created_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (plan_execution_id) DO NOTHING",
        )
        .bind(&expansion.plan_execution_id)
        .bind(Json(&expansion.expanded_json))
        .bind(expansion.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate_key(
                PLAN_EXECUTION_EXPANSION,
                &expansion.plan_execution_id,
            ));
        }
        Ok(())
    }

    async fn fetch(&self, plan_execution_id: &str) -> StoreResult<Option<PlanExecutionExpansion>> {
        let row: Option<(Json<Value>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT expanded_json, created_at FROM plan_execution_expansions
             WHERE plan_execution_id = $1",
        )
        .bind(plan_execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(expanded_json), created_at)| PlanExecutionExpansion {
            plan_execution_id: plan_execution_id.to_string(),
            expanded_json,
            created_at,
        }))
    }

    async fn upsert_paths(
        &self,
        plan_execution_id: &str,
        updates: Vec<(String, Value)>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO plan_execution_expansions (plan_execution_id)
             VALUES ($1)
             ON CONFLICT (plan_execution_id) DO NOTHING",
        )
        .bind(plan_execution_id)
        .execute(&mut *tx)
        .await?;

        let Json(mut document): Json<Value> = sqlx::query_scalar(
            "SELECT expanded_json FROM plan_execution_expansions
             WHERE plan_execution_id = $1 FOR UPDATE",
        )
        .bind(plan_execution_id)
        .fetch_one(&mut *tx)
        .await?;

        for (path, value) in updates {
            set_at_path(&mut document, &path, value);
        }

        sqlx::query(
            "UPDATE plan_execution_expansions SET expanded_json = $2 WHERE plan_execution_id = $1",
        )
        .bind(plan_execution_id)
        .bind(Json(&document))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn project(&self, plan_execution_id: &str, paths: &[String]) -> StoreResult<Option<Value>> {
        // Flat {path: value} map built server side, so only the requested subtrees leave the database
        let row: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT (
                 SELECT COALESCE(
                     jsonb_object_agg(p.path, e.expanded_json #> string_to_array(p.path, '.')),
                     '{}'::jsonb)
                 FROM unnest($2::text[]) AS p(path)
                 WHERE e.expanded_json #> string_to_array(p.path, '.') IS NOT NULL
             )
             FROM plan_execution_expansions e
             WHERE e.plan_execution_id = $1",
        )
        .bind(plan_execution_id)
        .bind(paths)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|Json(flat)| {
            let mut projected = Value::Object(Map::new());
            if let Value::Object(entries) = flat {
                for (path, value) in entries {
                    set_at_path(&mut projected, &path, value);
                }
            }
            projected
        }))
    }

    async fn delete_all_for_plan_executions(
        &self,
        plan_execution_ids: &[String],
    ) -> StoreResult<usize> {
        let result = sqlx::query(
            "DELETE FROM plan_execution_expansions WHERE plan_execution_id = ANY($1)",
        )
        .bind(plan_execution_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
