//! Plan execution expansion: a denormalized, incrementally-updated JSON view of a
//! running plan, gated per account by feature flag.

pub mod feature_flags;
pub mod path;
pub mod service;

pub use feature_flags::{FeatureFlagProvider, InMemoryFeatureFlags};
pub use path::expansion_path;
pub use service::PlanExpansionService;
