//! # Resilience Module
//!
//! Bounded retry with fixed or exponential backoff. Every retry loop in the engine
//! goes through [`RetryPolicy`], configured per concern in `retry_policies`.

pub mod retry_policy;

pub use retry_policy::{Backoff, RetryPolicies, RetryPolicy};
