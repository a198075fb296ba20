use async_trait::async_trait;
use dashmap::DashMap;

/// Per-account feature flag lookup, consulted on every call so flips take effect mid-run
#[async_trait]
pub trait FeatureFlagProvider: Send + Sync {
    async fn is_enabled(&self, account_id: &str, flag: &str) -> bool;
}

/// Flags held in memory with a global default and per-account overrides
#[derive(Debug, Default)]
pub struct InMemoryFeatureFlags {
    default_enabled: bool,
    overrides: DashMap<(String, String), bool>,
}

impl InMemoryFeatureFlags {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            default_enabled,
            overrides: DashMap::new(),
        }
    }

    pub fn set(&self, account_id: impl Into<String>, flag: impl Into<String>, enabled: bool) {
        self.overrides.insert((account_id.into(), flag.into()), enabled);
    }
}

#[async_trait]
impl FeatureFlagProvider for InMemoryFeatureFlags {
    async fn is_enabled(&self, account_id: &str, flag: &str) -> bool {
        self.overrides
            .get(&(account_id.to_string(), flag.to_string()))
            .map(|v| *v)
            .unwrap_or(self.default_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_override_beats_default() {
        let flags = InMemoryFeatureFlags::new(false);
        assert!(!flags.is_enabled("acc", "FLAG").await);
        flags.set("acc", "FLAG", true);
        assert!(flags.is_enabled("acc", "FLAG").await);
        assert!(!flags.is_enabled("other", "FLAG").await);
    }
}
