//! # Plan Expansion Service
//!
//! Incrementally projects node inputs, outcomes and statuses into one JSON document per
//! plan execution, so readers can resolve expressions without walking the node tree.
//!
//! ## Write path
//!
//! 1. Check the `PIPELINE_EXPANSION` flag for the ambiance's account (every call)
//! 2. Compute the node path from the ambiance levels
//! 3. Take the per-document lease, retrying acquisition with a fixed policy
//! 4. Upsert the value at `<path>.<field>`
//!
//! When the lease cannot be obtained the write still goes through unguarded and a
//! warning is logged; the document converges once later writes land.

use super::feature_flags::FeatureFlagProvider;
use super::path::{expansion_path, join};
use crate::config::PlanExpansionConfig;
use crate::constants::{expansion, feature_flags};
use crate::error::EngineResult;
use crate::lock::{wait_to_acquire_lock, LockError, PersistentLocker};
use crate::models::{Ambiance, PlanExecutionExpansion};
use crate::resilience::RetryPolicy;
use crate::state_machine::Status;
use crate::store::PlanExpansionStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct PlanExpansionService {
    store: Arc<dyn PlanExpansionStore>,
    locker: Arc<dyn PersistentLocker>,
    feature_flags: Arc<dyn FeatureFlagProvider>,
    config: PlanExpansionConfig,
    lock_policy: RetryPolicy,
}

impl PlanExpansionService {
    pub fn new(
        store: Arc<dyn PlanExpansionStore>,
        locker: Arc<dyn PersistentLocker>,
        feature_flags: Arc<dyn FeatureFlagProvider>,
        config: PlanExpansionConfig,
    ) -> Self {
        let lock_policy = RetryPolicy::fixed(
            "plan_expansion_lock",
            config.lock_acquire_attempts,
            Duration::from_millis(config.lock_retry_delay_ms),
        );
        Self {
            store,
            locker,
            feature_flags,
            config,
            lock_policy,
        }
    }

    pub async fn is_enabled(&self, ambiance: &Ambiance) -> bool {
        let account_id = ambiance.account_id().unwrap_or_default();
        self.feature_flags
            .is_enabled(account_id, feature_flags::PIPELINE_EXPANSION)
            .await
    }

    pub async fn create(&self, ambiance: &Ambiance) -> EngineResult<()> {
        if !self.is_enabled(ambiance).await {
            return Ok(());
        }
        self.store
            .create(PlanExecutionExpansion::new(&ambiance.plan_execution_id))
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, ambiance: &Ambiance) -> EngineResult<Option<PlanExecutionExpansion>> {
        if !self.is_enabled(ambiance).await {
            return Ok(None);
        }
        Ok(self.store.fetch(&ambiance.plan_execution_id).await?)
    }

    /// Oversized inputs are skipped rather than failing the step
    pub async fn add_step_inputs(&self, ambiance: &Ambiance, step_inputs: &Value) -> EngineResult<()> {
        if !self.is_enabled(ambiance).await {
            return Ok(());
        }

        let serialized = serde_json::to_vec(step_inputs)?;
        if serialized.len() > self.config.max_step_inputs_bytes {
            debug!(
                plan_execution_id = %ambiance.plan_execution_id,
                size_bytes = serialized.len(),
                limit_bytes = self.config.max_step_inputs_bytes,
                "Step inputs too large for plan expansion, skipping"
            );
            return Ok(());
        }

        let path = join(&expansion_path(ambiance), expansion::STEP_INPUTS);
        self.guarded_update(ambiance, vec![(path, step_inputs.clone())]).await
    }

    pub async fn add_outcomes(&self, ambiance: &Ambiance, name: &str, outcome: &Value) -> EngineResult<()> {
        if !self.is_enabled(ambiance).await {
            return Ok(());
        }
        let path = join(
            &join(&expansion_path(ambiance), expansion::OUTCOME),
            name,
        );
        self.guarded_update(ambiance, vec![(path, outcome.clone())]).await
    }

    pub async fn update_status(&self, ambiance: &Ambiance, status: Status) -> EngineResult<()> {
        if !self.is_enabled(ambiance).await {
            return Ok(());
        }
        let path = join(&expansion_path(ambiance), expansion::STATUS);
        self.guarded_update(ambiance, vec![(path, Value::String(status.to_string()))])
            .await
    }

    /// Only the requested dotted paths, nested as in the document
    pub async fn resolve_expressions(
        &self,
        ambiance: &Ambiance,
        expressions: &[String],
    ) -> EngineResult<Option<Value>> {
        if !self.is_enabled(ambiance).await {
            return Ok(None);
        }
        Ok(self
            .store
            .project(&ambiance.plan_execution_id, expressions)
            .await?)
    }

    async fn guarded_update(&self, ambiance: &Ambiance, updates: Vec<(String, Value)>) -> EngineResult<()> {
        let plan_execution_id = ambiance.plan_execution_id.as_str();
        let lock_name = format!("{}{}", expansion::LOCK_PREFIX, plan_execution_id);

        let lock = self
            .lock_policy
            .execute(
                || {
                    wait_to_acquire_lock(
                        &self.locker,
                        &lock_name,
                        self.config.lock_lease(),
                        self.config.lock_wait_timeout(),
                    )
                },
                |e| matches!(e, LockError::Timeout { .. }),
            )
            .await;

        let lock = match lock {
            Ok(lock) => Some(lock),
            Err(error) => {
                warn!(
                    plan_execution_id = %plan_execution_id,
                    lock = %lock_name,
                    error = %error,
                    "Could not acquire plan expansion lock, writing without it"
                );
                None
            }
        };

        let result = self.store.upsert_paths(plan_execution_id, updates).await;

        if let Some(lock) = lock {
            if let Err(error) = lock.release().await {
                warn!(lock = %lock_name, error = %error, "Failed to release plan expansion lock");
            }
        }

        Ok(result?)
    }
}
