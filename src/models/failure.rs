use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Failure taxonomy advisers match against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    DelegateProvisioningFailure,
    ConnectivityFailure,
    AuthenticationFailure,
    VerificationFailure,
    ApplicationFailure,
    AuthorizationFailure,
    TimeoutFailure,
    SkippingFailure,
    PolicyEvaluationFailure,
    InputTimeoutFailure,
    ApprovalRejection,
    DelegateRestart,
    UserMarkedFailure,
    UnknownFailure,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        f.write_str(value.as_str().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureData {
    pub code: String,
    pub level: String,
    pub message: String,
    pub failure_types: Vec<FailureType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureInfo {
    pub error_message: String,
    pub failure_types: Vec<FailureType>,
    #[serde(default)]
    pub failure_data: Vec<FailureData>,
}

impl FailureInfo {
    pub fn new(error_message: impl Into<String>, failure_types: Vec<FailureType>) -> Self {
        Self {
            error_message: error_message.into(),
            failure_types,
            failure_data: Vec::new(),
        }
    }

    /// Every failure type reported, including those nested in failure data
    pub fn all_failure_types(&self) -> HashSet<FailureType> {
        self.failure_types
            .iter()
            .chain(self.failure_data.iter().flat_map(|d| d.failure_types.iter()))
            .copied()
            .collect()
    }

    pub fn intersects(&self, applicable: &HashSet<FailureType>) -> bool {
        self.all_failure_types()
            .iter()
            .any(|failure_type| applicable.contains(failure_type))
    }
}
