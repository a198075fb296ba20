use crate::error::{EngineError, EngineResult};
use crate::models::{Plan, PlanNode};
use dashmap::DashMap;
use std::sync::Arc;

/// Plans of running executions, keyed by plan execution id
#[derive(Debug, Default)]
pub struct PlanRegistry {
    plans: DashMap<String, Arc<Plan>>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plan_execution_id: impl Into<String>, plan: Plan) -> Arc<Plan> {
        let plan = Arc::new(plan);
        self.plans.insert(plan_execution_id.into(), plan.clone());
        plan
    }

    pub fn fetch(&self, plan_execution_id: &str) -> EngineResult<Arc<Plan>> {
        self.plans
            .get(plan_execution_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| EngineError::not_found("Plan", plan_execution_id))
    }

    pub fn fetch_node(&self, plan_execution_id: &str, node_id: &str) -> EngineResult<PlanNode> {
        let plan = self.fetch(plan_execution_id)?;
        plan.fetch_node(node_id).cloned()
    }

    pub fn remove(&self, plan_execution_id: &str) -> Option<Arc<Plan>> {
        self.plans.remove(plan_execution_id).map(|(_, plan)| plan)
    }
}
