#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Engine
//!
//! Execution core for CI/CD pipelines: it drives a tree of node executions through a
//! status state machine, asks advisers what to do when a node finishes, consumes the
//! events step runners send back and keeps a denormalized expansion document of every
//! execution for expression resolution.
//!
//! ## Architecture
//!
//! An [`orchestration::OrchestrationEngine`] is built from [`orchestration::EngineComponents`]
//! and owns everything else:
//!
//! - SDK events enter through [`events::SdkResponseEventHandler`], which deduplicates by
//!   event id and dispatches to one processor per response type
//! - Status changes go through [`state_machine::NodeStatusUpdater`], which only applies a
//!   transition when the node's current status allows it
//! - Finished nodes are advised by [`advisers`]; the response (retry, ignore, next step,
//!   end plan) decides how the plan proceeds
//! - Delegate task results arrive through [`wait_notify::WaitNotifyEngine`]
//!
//! ## Module Organization
//!
//! - [`models`] - Ambiance, levels, node executions, plans
//! - [`state_machine`] - Statuses, status groups and allowed transitions
//! - [`store`] - Persistence contracts and in-memory backends
//! - [`database`] - PostgreSQL backends (feature `postgres`)
//! - [`advisers`] - Retry, ignore, on-success, on-fail, mark-success and abort advisers
//! - [`events`] - SDK event processing and orchestration event publishing
//! - [`expansion`] - Plan expansion document updates under a named lock
//! - [`resilience`] - Named retry policies
//! - [`enforcement`] - License limit validators for settings
//! - [`access_control`] - Permission checks for user-initiated operations
//! - [`visualization`] - Execution graph built from node executions
//! - [`config`] - Layered YAML configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_engine::config::EngineConfig;
//! use pipeline_engine::logging::init_structured_logging;
//! use pipeline_engine::orchestration::{EngineComponents, OrchestrationEngine};
//!
//! init_structured_logging();
//! let engine = OrchestrationEngine::new(EngineComponents::in_memory(EngineConfig::default()));
//! let mut events = engine.subscribe();
//! # let _ = &mut events;
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests, in-memory backends only
//! ```

pub mod access_control;
pub mod advisers;
pub mod config;
pub mod constants;
#[cfg(feature = "postgres")]
pub mod database;
pub mod enforcement;
pub mod error;
pub mod events;
pub mod expansion;
pub mod lock;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod store;
pub mod visualization;
pub mod wait_notify;

pub use config::{ConfigManager, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use models::{Ambiance, Level, NodeExecution, Plan, PlanNode, StepResponse};
pub use orchestration::{EngineComponents, OrchestrationEngine};
pub use state_machine::Status;
