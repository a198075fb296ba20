use super::duration::{format_limit_seconds, parse_timeout};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of per-account static limits from the licensing plan
#[async_trait]
pub trait LicenseLimitProvider: Send + Sync {
    async fn static_limit(&self, account_id: &str, restriction: &str) -> EngineResult<Option<i64>>;
}

#[derive(Debug, Default)]
pub struct InMemoryLicenseLimits {
    limits: DashMap<(String, String), i64>,
}

impl InMemoryLicenseLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, account_id: impl Into<String>, restriction: impl Into<String>, limit: i64) {
        self.limits.insert((account_id.into(), restriction.into()), limit);
    }
}

#[async_trait]
impl LicenseLimitProvider for InMemoryLicenseLimits {
    async fn static_limit(&self, account_id: &str, restriction: &str) -> EngineResult<Option<i64>> {
        Ok(self
            .limits
            .get(&(account_id.to_string(), restriction.to_string()))
            .map(|limit| *limit))
    }
}

/// Checks a proposed setting value against the account's plan
#[async_trait]
pub trait SettingEnforcementValidator: Send + Sync {
    async fn validate(&self, account_id: &str, setting_identifier: &str, value: &str) -> EngineResult<()>;
}

fn exceeds_limit(setting_identifier: &str, value: &str, limit: &str) -> EngineError {
    EngineError::invalid_request(format!(
        "{setting_identifier} value {value} exceeds the maximum limit of {limit} allowed for your plan"
    ))
}

/// Numeric settings capped by a static license limit
pub struct EnforcementMaxLimitValidator {
    limits: Arc<dyn LicenseLimitProvider>,
    restriction: String,
}

impl EnforcementMaxLimitValidator {
    pub fn new(limits: Arc<dyn LicenseLimitProvider>, restriction: impl Into<String>) -> Self {
        Self {
            limits,
            restriction: restriction.into(),
        }
    }
}

#[async_trait]
impl SettingEnforcementValidator for EnforcementMaxLimitValidator {
    async fn validate(&self, account_id: &str, setting_identifier: &str, value: &str) -> EngineResult<()> {
        let parsed: i64 = value.trim().parse().map_err(|_| {
            EngineError::invalid_request(format!(
                "{setting_identifier} value {value} is not a valid number"
            ))
        })?;

        let Some(limit) = self.limits.static_limit(account_id, &self.restriction).await? else {
            debug!(restriction = %self.restriction, "No static limit configured, accepting value");
            return Ok(());
        };

        if parsed > limit {
            return Err(exceeds_limit(setting_identifier, value, &limit.to_string()));
        }
        Ok(())
    }
}

/// Timeout settings (`1d 2h`) capped by a static limit expressed in seconds
pub struct TimeoutMaxLimitEnforcementValidator {
    limits: Arc<dyn LicenseLimitProvider>,
    restriction: String,
}

impl TimeoutMaxLimitEnforcementValidator {
    pub fn new(limits: Arc<dyn LicenseLimitProvider>, restriction: impl Into<String>) -> Self {
        Self {
            limits,
            restriction: restriction.into(),
        }
    }
}

#[async_trait]
impl SettingEnforcementValidator for TimeoutMaxLimitEnforcementValidator {
    async fn validate(&self, account_id: &str, setting_identifier: &str, value: &str) -> EngineResult<()> {
        let requested = parse_timeout(value)?;

        let Some(limit) = self.limits.static_limit(account_id, &self.restriction).await? else {
            return Ok(());
        };
        let limit = u64::try_from(limit).unwrap_or(0);

        if requested > Duration::from_secs(limit) {
            return Err(exceeds_limit(setting_identifier, value, &format_limit_seconds(limit)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Arc<InMemoryLicenseLimits> {
        let limits = Arc::new(InMemoryLicenseLimits::new());
        limits.set("acc", "MAX_CONCURRENT_EXECUTIONS", 10);
        limits.set("acc", "MAX_PIPELINE_TIMEOUT", 2 * 86_400);
        limits.set("acc", "MAX_STEP_TIMEOUT", 2 * 3_600);
        limits
    }

    #[tokio::test]
    async fn test_numeric_limit() {
        let validator = EnforcementMaxLimitValidator::new(limits(), "MAX_CONCURRENT_EXECUTIONS");

        assert!(validator.validate("acc", "concurrent_executions", "10").await.is_ok());

        let error = validator
            .validate("acc", "concurrent_executions", "11")
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid request: concurrent_executions value 11 exceeds the maximum limit of 10 allowed for your plan"
        );
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_rejected() {
        let validator = EnforcementMaxLimitValidator::new(limits(), "MAX_CONCURRENT_EXECUTIONS");
        assert!(matches!(
            validator.validate("acc", "concurrent_executions", "ten").await,
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_limit_accepts() {
        let validator = EnforcementMaxLimitValidator::new(limits(), "MAX_CONCURRENT_EXECUTIONS");
        assert!(validator.validate("other", "concurrent_executions", "1000").await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_limit_rendered_in_days() {
        let validator = TimeoutMaxLimitEnforcementValidator::new(limits(), "MAX_PIPELINE_TIMEOUT");
        assert!(validator.validate("acc", "pipeline_timeout", "1d 23h").await.is_ok());

        let error = validator
            .validate("acc", "pipeline_timeout", "3d")
            .await
            .unwrap_err();
        assert!(error
            .to_string()
            .ends_with("pipeline_timeout value 3d exceeds the maximum limit of 2 days allowed for your plan"));
    }

    #[tokio::test]
    async fn test_timeout_limit_rendered_in_hours() {
        let validator = TimeoutMaxLimitEnforcementValidator::new(limits(), "MAX_STEP_TIMEOUT");
        let error = validator.validate("acc", "step_timeout", "2h 1s").await.unwrap_err();
        assert!(error.to_string().contains("maximum limit of 2 hours"));
    }

    #[tokio::test]
    async fn test_timeout_limit_counts_milliseconds() {
        let validator = TimeoutMaxLimitEnforcementValidator::new(limits(), "MAX_STEP_TIMEOUT");
        assert!(validator.validate("acc", "step_timeout", "2h").await.is_ok());

        let error = validator.validate("acc", "step_timeout", "2h 500ms").await.unwrap_err();
        assert!(error
            .to_string()
            .ends_with("step_timeout value 2h 500ms exceeds the maximum limit of 2 hours allowed for your plan"));
    }
}
