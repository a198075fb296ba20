//! # Orchestration Engine
//!
//! Composition root. Every collaborator is handed in through [`EngineComponents`] and
//! wired by the constructor; nothing is looked up from global state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_engine::config::EngineConfig;
//! use pipeline_engine::models::{Ambiance, Plan, PlanNode, StepCategory, StepType};
//! use pipeline_engine::orchestration::{EngineComponents, OrchestrationEngine};
//!
//! # async fn example() -> pipeline_engine::error::EngineResult<()> {
//! let engine = OrchestrationEngine::new(EngineComponents::in_memory(EngineConfig::default()));
//!
//! let plan = Plan::new("plan-1", "pipeline")
//!     .with_node(PlanNode::new("pipeline", "pipeline", StepType::new("PIPELINE", StepCategory::Pipeline)));
//! let root = engine
//!     .start_plan_execution(plan, Ambiance::new("pe-1", "plan-1"))
//!     .await?;
//! println!("started {}", root.uuid);
//! # Ok(())
//! # }
//! ```

use super::advise_engine::AdviseEngine;
use super::advise_handlers::interrupt_plan_execution;
use super::node_executor::NodeExecutor;
use super::plans::PlanRegistry;
use crate::access_control::{
    check_for_access_or_throw, AccessControlClient, PermissionCheck, Principal,
    StaticAccessControlClient,
};
use crate::advisers::AdviserRegistry;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventPublisher, OrchestrationEvent, PublishedEvent, SdkResponseEvent, SdkResponseEventHandler};
use crate::expansion::{FeatureFlagProvider, InMemoryFeatureFlags, PlanExpansionService};
use crate::lock::{InMemoryPersistentLocker, PersistentLocker};
use crate::models::{Ambiance, NodeExecution, Plan, StepResponse};
use crate::resilience::RetryPolicies;
use crate::state_machine::Status;
use crate::store::{
    InMemoryNodeExecutionStore, InMemoryPlanExpansionStore, NodeExecutionStore,
    PlanExpansionStore, RetryingNodeExecutionStore,
};
use crate::visualization::OrchestrationGraph;
use crate::wait_notify::WaitNotifyEngine;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const ABORT_PERMISSION: &str = "core_pipeline_abort";
pub const PIPELINE_RESOURCE: &str = "PIPELINE";

/// Everything the engine needs from the outside
pub struct EngineComponents {
    pub node_store: Arc<dyn NodeExecutionStore>,
    pub expansion_store: Arc<dyn PlanExpansionStore>,
    pub locker: Arc<dyn PersistentLocker>,
    pub feature_flags: Arc<dyn FeatureFlagProvider>,
    pub access_control: Arc<dyn AccessControlClient>,
    pub advisers: AdviserRegistry,
    pub config: EngineConfig,
}

impl EngineComponents {
    /// In-process stores and locks; access control denies everything until configured
    pub fn in_memory(config: EngineConfig) -> Self {
        Self {
            node_store: Arc::new(InMemoryNodeExecutionStore::new()),
            expansion_store: Arc::new(InMemoryPlanExpansionStore::new()),
            locker: Arc::new(InMemoryPersistentLocker::new()),
            feature_flags: Arc::new(InMemoryFeatureFlags::new(
                config.plan_expansion.enabled_by_default,
            )),
            access_control: Arc::new(StaticAccessControlClient::new()),
            advisers: AdviserRegistry::with_defaults(),
            config,
        }
    }

    /// Node executions and expansion documents in PostgreSQL; locks and flags stay in-process
    #[cfg(feature = "postgres")]
    pub fn postgres(pool: sqlx::PgPool, config: EngineConfig) -> Self {
        use crate::database::{PgNodeExecutionStore, PgPlanExpansionStore};

        Self {
            node_store: Arc::new(PgNodeExecutionStore::new(pool.clone())),
            expansion_store: Arc::new(PgPlanExpansionStore::new(pool)),
            ..Self::in_memory(config)
        }
    }

    pub fn with_access_control(mut self, client: Arc<dyn AccessControlClient>) -> Self {
        self.access_control = client;
        self
    }

    pub fn with_feature_flags(mut self, feature_flags: Arc<dyn FeatureFlagProvider>) -> Self {
        self.feature_flags = feature_flags;
        self
    }
}

pub struct OrchestrationEngine {
    executor: Arc<NodeExecutor>,
    events: SdkResponseEventHandler,
    wait_notify: Arc<WaitNotifyEngine>,
    expansion: Arc<PlanExpansionService>,
    expansion_store: Arc<dyn PlanExpansionStore>,
    publisher: EventPublisher,
    access_control: Arc<dyn AccessControlClient>,
    retry_policies: RetryPolicies,
}

impl OrchestrationEngine {
    pub fn new(components: EngineComponents) -> Self {
        let config = components.config;
        let retry_policies = RetryPolicies::from_config(&config.retry_policies);

        let store: Arc<dyn NodeExecutionStore> = Arc::new(RetryingNodeExecutionStore::new(
            components.node_store,
            retry_policies.store.clone(),
        ));
        let publisher = EventPublisher::new(config.events.publisher_capacity);
        let expansion = Arc::new(PlanExpansionService::new(
            components.expansion_store.clone(),
            components.locker,
            components.feature_flags,
            config.plan_expansion.clone(),
        ));
        let plans = Arc::new(PlanRegistry::new());
        let advise_engine = AdviseEngine::new(components.advisers, plans.clone());

        let executor = Arc::new(NodeExecutor::new(
            store,
            plans,
            advise_engine,
            expansion.clone(),
            publisher.clone(),
        ));
        let wait_notify = Arc::new(WaitNotifyEngine::with_fired_capacity(
            config.wait_notify.default_timeout(),
            config.wait_notify.fired_cache_size,
        ));
        let events = SdkResponseEventHandler::with_defaults(
            executor.clone(),
            wait_notify.clone(),
            config.events.dedup_cache_size,
        );

        info!(
            publisher_capacity = config.events.publisher_capacity,
            dedup_cache_size = config.events.dedup_cache_size,
            "🚀 Orchestration engine initialized"
        );

        Self {
            executor,
            events,
            wait_notify,
            expansion,
            expansion_store: components.expansion_store,
            publisher,
            access_control: components.access_control,
            retry_policies,
        }
    }

    /// Register `plan` for the execution named by `ambiance` and trigger its starting node
    pub async fn start_plan_execution(&self, plan: Plan, ambiance: Ambiance) -> EngineResult<NodeExecution> {
        let starting_node_id = plan.starting_node()?.uuid.clone();
        self.executor
            .plans()
            .register(ambiance.plan_execution_id.clone(), plan);

        if let Err(error) = self.expansion.create(&ambiance).await {
            warn!(
                plan_execution_id = %ambiance.plan_execution_id,
                error = %error,
                "Could not create plan expansion document"
            );
        }

        info!(
            plan_execution_id = %ambiance.plan_execution_id,
            plan_id = %ambiance.plan_id,
            "▶️ Starting plan execution"
        );
        self.executor
            .trigger_node(&ambiance, &starting_node_id, None, None)
            .await
    }

    pub async fn trigger_node(
        &self,
        ambiance: &Ambiance,
        plan_node_id: &str,
        parent_id: Option<String>,
        previous_id: Option<String>,
    ) -> EngineResult<NodeExecution> {
        self.executor
            .trigger_node(ambiance, plan_node_id, parent_id, previous_id)
            .await
    }

    /// Process an inbound SDK event. `false` means it was a recognised duplicate.
    pub async fn handle_event(&self, event: SdkResponseEvent) -> EngineResult<bool> {
        self.events.handle_event(&event).await
    }

    /// Deliver a delegate task's result to the node waiting on it
    pub async fn notify_task(&self, task_id: &str, response: StepResponse) -> EngineResult<bool> {
        self.wait_notify.notify(task_id, response).await
    }

    /// Expire delegate waits that exceeded the configured timeout
    pub async fn expire_timed_out_waits(&self) -> EngineResult<usize> {
        self.wait_notify.expire_timed_out().await
    }

    /// Start retry attempts whose wait interval elapsed
    pub async fn start_due_retries(&self) -> EngineResult<usize> {
        self.executor.start_due_retries().await
    }

    /// Start retry attempts of `plan_execution_id` saved but never started, e.g. by a
    /// process that stopped during the wait
    pub async fn resume_pending_retries(&self, plan_execution_id: &str) -> EngineResult<usize> {
        self.executor.resume_pending_retries(plan_execution_id).await
    }

    /// Abort every running node of the execution, after checking the principal may do so
    pub async fn abort_plan_execution(&self, principal: &Principal, ambiance: &Ambiance) -> EngineResult<usize> {
        check_for_access_or_throw(
            self.access_control.as_ref(),
            principal,
            vec![PermissionCheck::request(
                PIPELINE_RESOURCE,
                ambiance.pipeline_identifier(),
                ABORT_PERMISSION,
            )],
        )
        .await?;

        let plan_execution_id = ambiance.plan_execution_id.as_str();
        let store = self.executor.store();
        let aborted = self
            .retry_policies
            .store
            .execute(
                || interrupt_plan_execution(store.as_ref(), plan_execution_id, true),
                |e| matches!(e, EngineError::Store(_) | EngineError::Timeout(_)),
            )
            .await?;

        info!(
            plan_execution_id = %plan_execution_id,
            principal = %principal.identifier,
            aborted,
            "🛑 Plan execution aborted"
        );

        let abort = OrchestrationEvent::PlanExecutionAbort {
            plan_execution_id: plan_execution_id.to_string(),
            principal: principal.identifier.clone(),
        };
        if let Err(error) = self.publisher.publish_event(&abort) {
            warn!(error = %error, "Failed to publish plan abort");
        }
        self.executor.end_plan(plan_execution_id, Status::Aborted);
        Ok(aborted)
    }

    pub async fn resolve_expressions(
        &self,
        ambiance: &Ambiance,
        expressions: &[String],
    ) -> EngineResult<Option<Value>> {
        self.expansion.resolve_expressions(ambiance, expressions).await
    }

    pub async fn graph(&self, plan_execution_id: &str) -> EngineResult<OrchestrationGraph> {
        let nodes = self
            .executor
            .store()
            .fetch_all_for_plan_execution(plan_execution_id)
            .await?;
        Ok(OrchestrationGraph::build(plan_execution_id, nodes))
    }

    /// Drop all stored state of finished plan executions
    pub async fn delete_plan_executions(&self, plan_execution_ids: &[String]) -> EngineResult<usize> {
        let store = self.executor.store();
        let deleted = self
            .retry_policies
            .teardown
            .execute(
                || async move {
                    let deleted = store.delete_all_for_plan_executions(plan_execution_ids).await?;
                    self.expansion_store
                        .delete_all_for_plan_executions(plan_execution_ids)
                        .await?;
                    Ok::<_, EngineError>(deleted)
                },
                |e| matches!(e, EngineError::Store(_) | EngineError::Timeout(_)),
            )
            .await?;
        self.wait_notify.purge_plan_executions(plan_execution_ids);
        for id in plan_execution_ids {
            self.executor.plans().remove(id);
        }
        Ok(deleted)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    pub fn node_store(&self) -> &Arc<dyn NodeExecutionStore> {
        self.executor.store()
    }

    pub fn scheduled_retries(&self) -> usize {
        self.executor.retries.len()
    }

    pub fn wait_notify(&self) -> &Arc<WaitNotifyEngine> {
        &self.wait_notify
    }

    pub fn retry_policies(&self) -> &RetryPolicies {
        &self.retry_policies
    }
}
