//! # Advisers
//!
//! Pluggable decision-makers consulted when a node reaches a status. Each plan node
//! lists adviser obtainments in order; the first adviser that accepts the event
//! produces the [`AdviserResponse`] the engine then acts on.
//!
//! ## Usage
//!
//! ```rust
//! use pipeline_engine::advisers::AdviserRegistry;
//!
//! let registry = AdviserRegistry::with_defaults();
//! assert!(registry.get("RETRY").is_some());
//! ```

pub mod abort;
pub mod ignore;
pub mod mark_success;
pub mod next_step;
pub mod response;
pub mod retry;

pub use abort::{AbortAdviser, AbortAdviserParameters};
pub use ignore::{IgnoreAdviser, IgnoreAdviserParameters};
pub use mark_success::{MarkSuccessAdviser, MarkSuccessAdviserParameters};
pub use next_step::{NextStepAdviserParameters, OnFailAdviser, OnSuccessAdviser};
pub use response::{AdviseType, AdviserResponse, RepairActionCode};
pub use retry::{RetryAdviser, RetryAdviserParameters};

use crate::error::{EngineError, EngineResult};
use crate::models::{FailureType, NodeExecution};
use crate::state_machine::Status;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Adviser type names as they appear in plan node obtainments
pub mod adviser_types {
    pub const RETRY: &str = "RETRY";
    pub const IGNORE: &str = "IGNORE";
    pub const ON_SUCCESS: &str = "ON_SUCCESS";
    pub const ON_FAIL: &str = "ON_FAIL";
    pub const MARK_SUCCESS: &str = "MARK_SUCCESS";
    pub const ABORT: &str = "ABORT";
}

/// Input to an adviser: the node, the status it reached and the adviser's own parameters
#[derive(Debug, Clone)]
pub struct AdvisingEvent {
    pub node_execution: NodeExecution,
    pub to_status: Status,
    pub from_status: Status,
    /// JSON-encoded parameters from the plan node obtainment
    pub adviser_parameters: Vec<u8>,
    pub is_previous_adviser_expired: bool,
}

impl AdvisingEvent {
    pub fn new(
        node_execution: NodeExecution,
        from_status: Status,
        to_status: Status,
        adviser_parameters: Vec<u8>,
    ) -> Self {
        Self {
            node_execution,
            to_status,
            from_status,
            adviser_parameters,
            is_previous_adviser_expired: false,
        }
    }

    pub fn parameters<P: DeserializeOwned>(&self) -> EngineResult<P> {
        serde_json::from_slice(&self.adviser_parameters).map_err(|e| {
            EngineError::invalid_request(format!("Invalid adviser parameters: {e}"))
        })
    }

    /// Whether the node's failure intersects `applicable`; `false` without failure info
    pub fn failure_matches(&self, applicable: &HashSet<FailureType>) -> bool {
        self.node_execution
            .failure_info
            .as_ref()
            .is_some_and(|info| info.intersects(applicable))
    }
}

#[async_trait]
pub trait Adviser: Send + Sync {
    async fn can_advise(&self, event: &AdvisingEvent) -> EngineResult<bool>;

    async fn on_advise_event(&self, event: &AdvisingEvent) -> EngineResult<AdviserResponse>;
}

/// Adviser type name to implementation, assembled at start-up
#[derive(Clone, Default)]
pub struct AdviserRegistry {
    advisers: HashMap<String, Arc<dyn Adviser>>,
}

impl AdviserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(adviser_types::RETRY, Arc::new(RetryAdviser));
        registry.register(adviser_types::IGNORE, Arc::new(IgnoreAdviser));
        registry.register(adviser_types::ON_SUCCESS, Arc::new(OnSuccessAdviser));
        registry.register(adviser_types::ON_FAIL, Arc::new(OnFailAdviser));
        registry.register(adviser_types::MARK_SUCCESS, Arc::new(MarkSuccessAdviser));
        registry.register(adviser_types::ABORT, Arc::new(AbortAdviser));
        registry
    }

    pub fn register(&mut self, adviser_type: impl Into<String>, adviser: Arc<dyn Adviser>) {
        self.advisers.insert(adviser_type.into(), adviser);
    }

    pub fn get(&self, adviser_type: &str) -> Option<Arc<dyn Adviser>> {
        self.advisers.get(adviser_type).cloned()
    }

    pub fn obtain(&self, adviser_type: &str) -> EngineResult<Arc<dyn Adviser>> {
        self.get(adviser_type)
            .ok_or_else(|| EngineError::not_found("Adviser", adviser_type))
    }

    pub fn len(&self) -> usize {
        self.advisers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisers.is_empty()
    }
}

impl std::fmt::Debug for AdviserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.advisers.keys().collect();
        types.sort();
        f.debug_struct("AdviserRegistry").field("advisers", &types).finish()
    }
}
