//! Directory read interface.

use serde::{Deserialize, Serialize};

use archerp_core::{DepartmentId, DomainError, RoleCode, UserId};

/// A user as the directory sees them.
///
/// `email` / `wecom_id` are optional delivery identifiers; the notification
/// layer skips a channel when its identifier is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    pub name: String,
    pub department: Option<DepartmentId>,
    pub roles: Vec<RoleCode>,
    pub email: Option<String>,
    pub wecom_id: Option<String>,
    pub active: bool,
}

impl DirectoryUser {
    pub fn has_any_role(&self, roles: &[RoleCode]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }
}

/// Directory lookup failure.
///
/// The directory is external and potentially slow; `Unavailable` maps to
/// `DomainError::DirectoryUnavailable` at the engine boundary and aborts the
/// surrounding mutation cleanly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl From<DirectoryError> for DomainError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(msg) => DomainError::directory_unavailable(msg),
            DirectoryError::UnknownUser(id) => {
                DomainError::directory_unavailable(format!("unknown user {id}"))
            }
        }
    }
}

/// Read port consumed by approver resolution and notification escalation.
///
/// Implementations must be callable outside database critical sections; the
/// engine reads the directory before taking its store lock.
pub trait Directory: Send + Sync {
    /// Look up one user.
    fn user(&self, id: UserId) -> DirectoryResult<Option<DirectoryUser>>;

    /// Active users holding any of the given roles.
    fn users_with_roles(&self, roles: &[RoleCode]) -> DirectoryResult<Vec<DirectoryUser>>;

    /// Active members of the given departments.
    fn department_members(
        &self,
        departments: &[DepartmentId],
    ) -> DirectoryResult<Vec<DirectoryUser>>;

    /// Manager of a user's primary department, if any.
    fn department_manager(&self, of: UserId) -> DirectoryResult<Option<UserId>>;

    /// Direct reporting superior of a user, if any.
    fn superior(&self, of: UserId) -> DirectoryResult<Option<UserId>>;
}
