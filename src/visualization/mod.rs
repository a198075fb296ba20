//! Orchestration graph for rendering a plan execution's tree.

pub mod graph;

pub use graph::{GraphVertex, OrchestrationGraph};
