//! # Node Status State Machine
//!
//! Statuses, their groupings, the legal-transition table and the conditional updater
//! every status change goes through.
//!
//! A target status is never in its own allowed-from set, so applying the same
//! transition twice leaves the record untouched. Re-delivered events rely on this.

pub mod node_status_updater;
pub mod states;
pub mod transitions;

pub use node_status_updater::NodeStatusUpdater;
pub use states::{groups, Status};
pub use transitions::{allowed_start_statuses, can_transition};
