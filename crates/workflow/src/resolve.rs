//! Approver resolution: node spec → concrete user list.
//!
//! Pure over (spec, applicant, directory read); no instance state involved,
//! which keeps it testable without persisting anything. The caller applies
//! the skip-or-fail rule for empty results.

use archerp_core::{DomainResult, UserId};
use archerp_directory::Directory;

use crate::node::ApproverSpec;

/// Resolve the approver list for a node at activation time.
///
/// Deduplicates while preserving resolution order. For
/// `department_manager_of_applicant`, a manager who is the applicant
/// themselves is filtered out; the emptied set then follows the caller's
/// skip-or-fail rule.
pub fn resolve_approvers(
    spec: &ApproverSpec,
    applicant: UserId,
    directory: &dyn Directory,
) -> DomainResult<Vec<UserId>> {
    let resolved: Vec<UserId> = match spec {
        ApproverSpec::SpecificUsers { users } => users.clone(),
        ApproverSpec::RoleMembers { roles } => directory
            .users_with_roles(roles)?
            .into_iter()
            .map(|u| u.id)
            .collect(),
        ApproverSpec::DepartmentManagerOfApplicant => directory
            .department_manager(applicant)?
            .into_iter()
            .filter(|manager| *manager != applicant)
            .collect(),
        ApproverSpec::ApplicantSuperior => {
            directory.superior(applicant)?.into_iter().collect()
        }
        ApproverSpec::DepartmentMembers { departments } => directory
            .department_members(departments)?
            .into_iter()
            .map(|u| u.id)
            .collect(),
    };

    let mut deduped = Vec::with_capacity(resolved.len());
    for user in resolved {
        if !deduped.contains(&user) {
            deduped.push(user);
        }
    }
    Ok(deduped)
}

#[cfg(test)]
mod tests {
    use super::*;

    use archerp_core::{DepartmentId, RoleCode};
    use archerp_directory::{DirectoryUser, InMemoryDirectory};

    fn add_user(
        dir: &InMemoryDirectory,
        department: Option<DepartmentId>,
        roles: Vec<RoleCode>,
    ) -> UserId {
        let id = UserId::new();
        dir.add_user(DirectoryUser {
            id,
            name: format!("u-{id}"),
            department,
            roles,
            email: None,
            wecom_id: None,
            active: true,
        });
        id
    }

    #[test]
    fn specific_users_pass_through_deduplicated() {
        let dir = InMemoryDirectory::new();
        let a = UserId::new();
        let b = UserId::new();
        let spec = ApproverSpec::SpecificUsers { users: vec![a, b, a] };
        assert_eq!(resolve_approvers(&spec, UserId::new(), &dir).unwrap(), vec![a, b]);
    }

    #[test]
    fn role_members_resolves_active_holders() {
        let dir = InMemoryDirectory::new();
        let role = RoleCode::new("general_manager");
        let holder = add_user(&dir, None, vec![role.clone()]);
        add_user(&dir, None, vec![RoleCode::new("clerk")]);

        let spec = ApproverSpec::RoleMembers { roles: vec![role] };
        assert_eq!(
            resolve_approvers(&spec, UserId::new(), &dir).unwrap(),
            vec![holder]
        );
    }

    #[test]
    fn manager_resolution_filters_out_the_applicant() {
        let dir = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let applicant = add_user(&dir, Some(dept), vec![]);
        dir.set_department_manager(dept, applicant);

        let spec = ApproverSpec::DepartmentManagerOfApplicant;
        assert!(resolve_approvers(&spec, applicant, &dir).unwrap().is_empty());

        // A distinct manager resolves normally.
        let manager = add_user(&dir, Some(dept), vec![]);
        dir.set_department_manager(dept, manager);
        assert_eq!(
            resolve_approvers(&spec, applicant, &dir).unwrap(),
            vec![manager]
        );
    }

    #[test]
    fn superior_resolution() {
        let dir = InMemoryDirectory::new();
        let applicant = add_user(&dir, None, vec![]);
        let boss = add_user(&dir, None, vec![]);
        dir.set_superior(applicant, boss);

        let spec = ApproverSpec::ApplicantSuperior;
        assert_eq!(resolve_approvers(&spec, applicant, &dir).unwrap(), vec![boss]);

        // No superior configured → empty, caller decides.
        assert!(resolve_approvers(&spec, boss, &dir).unwrap().is_empty());
    }

    #[test]
    fn department_members_resolution() {
        let dir = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let a = add_user(&dir, Some(dept), vec![]);
        add_user(&dir, Some(DepartmentId::new()), vec![]);

        let spec = ApproverSpec::DepartmentMembers { departments: vec![dept] };
        assert_eq!(resolve_approvers(&spec, UserId::new(), &dir).unwrap(), vec![a]);
    }
}
