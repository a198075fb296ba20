//! # Settings Enforcement
//!
//! Validators that reject setting updates exceeding the limits of the account's
//! licensing plan. Limits come from a [`LicenseLimitProvider`]; a missing limit means
//! the setting is unrestricted.

pub mod duration;
pub mod validators;

pub use duration::{format_limit_seconds, parse_timeout};
pub use validators::{
    EnforcementMaxLimitValidator, InMemoryLicenseLimits, LicenseLimitProvider,
    SettingEnforcementValidator, TimeoutMaxLimitEnforcementValidator,
};
