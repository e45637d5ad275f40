//! Authorization checks for client-submitted batch operation commands.
//!
//! Only commands processed for the first time are authorized; distributed
//! copies were already authorized on the partition that received them.

use crate::models::{BatchOperationType, Rejection, RejectionType};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    BatchOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionType {
    Create,
    Update,
    /// Fine-grained permission to create batch operations of one type
    CreateBatchOperation(BatchOperationType),
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("CREATE"),
            Self::Update => f.write_str("UPDATE"),
            Self::CreateBatchOperation(operation_type) => {
                write!(f, "CREATE_BATCH_OPERATION_{operation_type}")
            }
        }
    }
}

/// A request is granted when the user holds any one of `permissions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub username: Option<String>,
    pub resource_type: ResourceType,
    pub permissions: Vec<PermissionType>,
}

impl AuthorizationRequest {
    pub fn for_create(username: Option<&str>, operation_type: BatchOperationType) -> Self {
        Self {
            username: username.map(str::to_string),
            resource_type: ResourceType::BatchOperation,
            permissions: vec![
                PermissionType::Create,
                PermissionType::CreateBatchOperation(operation_type),
            ],
        }
    }

    pub fn for_update(username: Option<&str>) -> Self {
        Self {
            username: username.map(str::to_string),
            resource_type: ResourceType::BatchOperation,
            permissions: vec![PermissionType::Update],
        }
    }

    fn forbidden(&self) -> Rejection {
        let required = self
            .permissions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        Rejection::new(
            RejectionType::Forbidden,
            format!(
                "Insufficient permissions to perform operation: {required} on {:?} for user '{}'",
                self.resource_type,
                self.username.as_deref().unwrap_or("<anonymous>")
            ),
        )
    }
}

pub trait AuthorizationCheck: Send + Sync {
    fn is_authorized(&self, request: &AuthorizationRequest) -> Result<(), Rejection>;
}

/// Grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationCheck for AllowAll {
    fn is_authorized(&self, _request: &AuthorizationRequest) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Explicit per-user grants
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizations {
    grants: HashMap<String, HashSet<(ResourceType, PermissionType)>>,
}

impl StaticAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(
        mut self,
        username: impl Into<String>,
        resource_type: ResourceType,
        permission: PermissionType,
    ) -> Self {
        self.grants
            .entry(username.into())
            .or_default()
            .insert((resource_type, permission));
        self
    }
}

impl AuthorizationCheck for StaticAuthorizations {
    fn is_authorized(&self, request: &AuthorizationRequest) -> Result<(), Rejection> {
        let granted = request
            .username
            .as_ref()
            .and_then(|username| self.grants.get(username))
            .is_some_and(|grants| {
                request
                    .permissions
                    .iter()
                    .any(|permission| grants.contains(&(request.resource_type, *permission)))
            });

        if granted {
            Ok(())
        } else {
            Err(request.forbidden())
        }
    }
}
