//! # Engine Error Types
//!
//! Crate-wide error model. Subsystems keep their own `thiserror` enums
//! ([`StoreError`], [`LockError`], [`ConfigurationError`]) and convert into
//! [`EngineError`] at the service boundary.
//!
//! Every [`EngineError`] carries a stable [`ErrorCode`] and maps to an HTTP status,
//! so transport layers can turn it into an [`ErrorDto`] without matching on variants.

use crate::access_control::PermissionCheck;
use crate::config::ConfigurationError;
use crate::lock::LockError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("General error: {0}")]
    General(String),
    #[error("{message}")]
    AccessDenied {
        message: String,
        failed_permission_checks: Vec<PermissionCheck>,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid status transition for {node_execution_id}: {from} -> {to}")]
    StateTransition {
        node_execution_id: String,
        from: String,
        to: String,
    },
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl EngineError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn access_denied(
        message: impl Into<String>,
        failed_permission_checks: Vec<PermissionCheck>,
    ) -> Self {
        Self::AccessDenied {
            message: message.into(),
            failed_permission_checks,
        }
    }

    pub fn state_transition(
        node_execution_id: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::StateTransition {
            node_execution_id: node_execution_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable error code surfaced to clients
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::General(_) => ErrorCode::GeneralError,
            Self::AccessDenied { .. } => ErrorCode::NgAccessDenied,
            Self::NotFound { .. } => ErrorCode::ResourceNotFound,
            Self::Store(_) => ErrorCode::DatabaseError,
            Self::Lock(_) => ErrorCode::LockAcquisitionFailed,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Configuration(_) => ErrorCode::InvalidConfiguration,
            Self::StateTransition { .. } => ErrorCode::InvalidStatusTransition,
            Self::Timeout(_) => ErrorCode::Timeout,
        }
    }

    /// HTTP status the error maps to when surfaced through an API layer
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::Serialization(_) => 400,
            Self::AccessDenied { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::StateTransition { .. } | Self::Lock(_) => 409,
            Self::Timeout(_) => 504,
            Self::General(_) | Self::Store(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::InvalidRequest(message) => EngineError::InvalidRequest(message),
            other => EngineError::Store(other.to_string()),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(error: LockError) -> Self {
        EngineError::Lock(error.to_string())
    }
}

impl From<ConfigurationError> for EngineError {
    fn from(error: ConfigurationError) -> Self {
        EngineError::Configuration(error.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error codes shared with API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    GeneralError,
    NgAccessDenied,
    ResourceNotFound,
    DatabaseError,
    LockAcquisitionFailed,
    SerializationError,
    InvalidConfiguration,
    InvalidStatusTransition,
    Timeout,
}

/// Structured error body returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDto {
    pub status: String,
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_permission_checks: Vec<PermissionCheck>,
}

impl From<&EngineError> for ErrorDto {
    fn from(error: &EngineError) -> Self {
        let failed_permission_checks = match error {
            EngineError::AccessDenied {
                failed_permission_checks,
                ..
            } => failed_permission_checks.clone(),
            _ => Vec::new(),
        };

        Self {
            status: "ERROR".to_string(),
            code: error.error_code(),
            message: error.to_string(),
            failed_permission_checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_maps_to_dto_with_checks() {
        let check = PermissionCheck::denied("PIPELINE", "p1", "core_pipeline_execute");
        let error = EngineError::access_denied("Missing permission", vec![check.clone()]);

        let dto = ErrorDto::from(&error);
        assert_eq!(dto.code, ErrorCode::NgAccessDenied);
        assert_eq!(dto.failed_permission_checks, vec![check]);
        assert_eq!(error.http_status(), 403);
    }

    #[test]
    fn test_store_not_found_becomes_not_found() {
        let error: EngineError = StoreError::not_found("NodeExecution", "abc").into();
        assert_eq!(error.http_status(), 404);
        assert_eq!(error.to_string(), "NodeExecution not found: abc");
    }

    #[test]
    fn test_dto_omits_empty_checks() {
        let dto = ErrorDto::from(&EngineError::invalid_request("bad"));
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("failedPermissionChecks").is_none());
        assert_eq!(json["code"], "INVALID_REQUEST");
    }
}
