//! # Data Models
//!
//! Plain data carried through the engine: the [`Ambiance`] execution context, node
//! execution records, plans and the plan expansion document.

pub mod ambiance;
pub mod expansion;
pub mod failure;
pub mod node_execution;
pub mod plan;
pub mod step_response;

pub use ambiance::{
    fqn_using_levels, strategy_postfix, Ambiance, ExecutionMetadata, ExecutionMode, ForMetadata,
    Level, MatrixMetadata, PipelineVersion, StepCategory, StepType, StrategyMetadata, TriggerInfo,
    TriggerType, TriggeredBy,
};
pub use expansion::PlanExecutionExpansion;
pub use failure::{FailureData, FailureInfo, FailureType};
pub use node_execution::{ExecutableResponse, NodeExecution, NodeExecutionMode, NodeExecutionUpdate};
pub use plan::{AdviserObtainment, Plan, PlanNode};
pub use step_response::StepResponse;
