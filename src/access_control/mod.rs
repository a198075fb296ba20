//! # Access Control
//!
//! Explicit permission checks invoked before guarded operations. The engine does not
//! decide permissions itself; an [`AccessControlClient`] answers each batch of checks
//! and [`check_for_access_or_throw`] turns any denial into
//! [`EngineError::AccessDenied`] carrying the failed checks.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub principal_type: PrincipalType,
    pub identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    User,
    ServiceAccount,
    Service,
    ApiKey,
}

impl Principal {
    pub fn user(identifier: impl Into<String>) -> Self {
        Self {
            principal_type: PrincipalType::User,
            identifier: identifier.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheck {
    pub resource_type: String,
    pub resource_identifier: String,
    pub permission: String,
    pub permitted: bool,
}

impl PermissionCheck {
    /// A check to be evaluated
    pub fn request(
        resource_type: impl Into<String>,
        resource_identifier: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_identifier: resource_identifier.into(),
            permission: permission.into(),
            permitted: false,
        }
    }

    pub fn denied(
        resource_type: impl Into<String>,
        resource_identifier: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::request(resource_type, resource_identifier, permission)
    }

    pub fn granted(mut self) -> Self {
        self.permitted = true;
        self
    }
}

#[async_trait]
pub trait AccessControlClient: Send + Sync {
    /// Evaluate every check; the returned checks carry `permitted`
    async fn check_for_access(
        &self,
        principal: &Principal,
        checks: Vec<PermissionCheck>,
    ) -> EngineResult<Vec<PermissionCheck>>;
}

pub async fn check_for_access_or_throw(
    client: &dyn AccessControlClient,
    principal: &Principal,
    checks: Vec<PermissionCheck>,
) -> EngineResult<()> {
    let evaluated = client.check_for_access(principal, checks).await?;
    let failed: Vec<PermissionCheck> = evaluated.into_iter().filter(|c| !c.permitted).collect();
    if failed.is_empty() {
        return Ok(());
    }

    let permissions: Vec<&str> = failed.iter().map(|c| c.permission.as_str()).collect();
    warn!(
        principal = %principal.identifier,
        permissions = ?permissions,
        "Access denied"
    );
    Err(EngineError::access_denied(
        format!(
            "Missing permission {} on {}",
            permissions.join(", "),
            failed[0].resource_type.to_lowercase()
        ),
        failed,
    ))
}

/// Grants exactly the configured `(principal, permission)` pairs
#[derive(Debug, Default)]
pub struct StaticAccessControlClient {
    grants: HashSet<(String, String)>,
}

impl StaticAccessControlClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_all_for(self, principal: &Principal, permissions: &[&str]) -> Self {
        let mut client = self;
        for permission in permissions {
            client
                .grants
                .insert((principal.identifier.clone(), permission.to_string()));
        }
        client
    }
}

#[async_trait]
impl AccessControlClient for StaticAccessControlClient {
    async fn check_for_access(
        &self,
        principal: &Principal,
        checks: Vec<PermissionCheck>,
    ) -> EngineResult<Vec<PermissionCheck>> {
        Ok(checks
            .into_iter()
            .map(|mut check| {
                check.permitted = self
                    .grants
                    .contains(&(principal.identifier.clone(), check.permission.clone()));
                check
            })
            .collect())
    }
}
