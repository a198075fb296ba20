//! # Orchestration
//!
//! Node lifecycle driving, advising and the engine composition root.

pub mod advise_engine;
pub mod advise_handlers;
pub mod engine;
pub mod node_executor;
pub mod plans;
pub mod retry_helper;

pub use advise_engine::AdviseEngine;
pub use advise_handlers::interrupt_plan_execution;
pub use engine::{EngineComponents, OrchestrationEngine};
pub use node_executor::{aggregate_children, NodeExecutor};
pub use plans::PlanRegistry;
pub use retry_helper::{build_retry_attempt, RetryScheduler};
