//! # System Constants
//!
//! Well-known keys shared across the engine: orchestration event names, setup
//! abstraction keys, pipeline setting names, feature flags and the field names used
//! inside the plan expansion document.

/// Orchestration events published through the [`crate::events::EventPublisher`]
pub mod events {
    pub const NODE_EXECUTION_START: &str = "node.execution_start";
    pub const NODE_STATUS_UPDATE: &str = "node.status_update";
    pub const NODE_RETRY: &str = "node.retry";
    pub const PLAN_EXECUTION_END: &str = "plan.execution_end";
    pub const PLAN_EXECUTION_ABORT: &str = "plan.execution_abort";
}

/// Keys stored in [`crate::models::Ambiance::setup_abstractions`]
pub mod setup_abstractions {
    pub const ACCOUNT_ID: &str = "accountId";
    pub const ORG_IDENTIFIER: &str = "orgIdentifier";
    pub const PROJECT_IDENTIFIER: &str = "projectIdentifier";
    pub const APP_ID: &str = "appId";
}

/// Pipeline settings carried in the execution metadata
pub mod settings {
    pub const ENABLE_MATRIX_FIELD_NAME_SETTING: &str = "enable_matrix_label_by_name";
    pub const ENABLE_NODE_EXECUTION_AUDIT_EVENTS: &str = "enable_node_execution_audit_events";
    pub const ENABLE_EXPRESSION_ENGINE_V2: &str = "enable_expression_engine_v2";
}

/// Feature flags evaluated per account
pub mod feature_flags {
    /// Gates every plan expansion write and read
    pub const PIPELINE_EXPANSION: &str = "PIE_EXPRESSION_ENGINE_V2_EXPANSION";
}

/// Field names inside the plan expansion document
pub mod expansion {
    pub const STEP_INPUTS: &str = "stepInputs";
    pub const OUTCOME: &str = "outcome";
    pub const STATUS: &str = "status";
    pub const LOCK_PREFIX: &str = "PLAN_EXPANSION_LOCK_";
}

/// YAML field names with special meaning while building qualified names
pub mod yaml {
    pub const PARALLEL: &str = "parallel";
    pub const ROLLBACK_STEPS: &str = "rollbackSteps";
    pub const STAGES: &str = "STAGES";
}

/// Matrix value key holding the de-duplication suffix for repeated combinations
pub const MATRIX_IDENTIFIER_POSTFIX_FOR_DUPLICATES: &str = "matrixIdentifierPostfixForDuplicates";

/// Records deleted per batch during retention cleanup
pub const DELETE_BATCH_SIZE: usize = 1000;
