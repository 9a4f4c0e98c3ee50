//! In-memory directory for tests and in-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use archerp_core::{DepartmentId, RoleCode, UserId};

use crate::port::{Directory, DirectoryError, DirectoryResult, DirectoryUser};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, DirectoryUser>,
    managers: HashMap<DepartmentId, UserId>,
    superiors: HashMap<UserId, UserId>,
}

/// Hash-map backed directory.
///
/// Populated once through the builder-style `add_*` methods; concurrent reads
/// afterwards.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Inner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: DirectoryUser) {
        self.inner.write().unwrap().users.insert(user.id, user);
    }

    pub fn set_department_manager(&self, department: DepartmentId, manager: UserId) {
        self.inner
            .write()
            .unwrap()
            .managers
            .insert(department, manager);
    }

    pub fn set_superior(&self, of: UserId, superior: UserId) {
        self.inner.write().unwrap().superiors.insert(of, superior);
    }

    pub fn deactivate(&self, id: UserId) {
        if let Some(user) = self.inner.write().unwrap().users.get_mut(&id) {
            user.active = false;
        }
    }
}

impl Directory for InMemoryDirectory {
    fn user(&self, id: UserId) -> DirectoryResult<Option<DirectoryUser>> {
        Ok(self.inner.read().unwrap().users.get(&id).cloned())
    }

    fn users_with_roles(&self, roles: &[RoleCode]) -> DirectoryResult<Vec<DirectoryUser>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .users
            .values()
            .filter(|u| u.active && u.has_any_role(roles))
            .cloned()
            .collect())
    }

    fn department_members(
        &self,
        departments: &[DepartmentId],
    ) -> DirectoryResult<Vec<DirectoryUser>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .users
            .values()
            .filter(|u| u.active && u.department.is_some_and(|d| departments.contains(&d)))
            .cloned()
            .collect())
    }

    fn department_manager(&self, of: UserId) -> DirectoryResult<Option<UserId>> {
        let inner = self.inner.read().unwrap();
        let user = inner
            .users
            .get(&of)
            .ok_or(DirectoryError::UnknownUser(of))?;
        Ok(user.department.and_then(|d| inner.managers.get(&d).copied()))
    }

    fn superior(&self, of: UserId) -> DirectoryResult<Option<UserId>> {
        Ok(self.inner.read().unwrap().superiors.get(&of).copied())
    }
}
