//! API-side authorization guards.
//!
//! Handlers call these before touching the queue or the stores, keeping the
//! infra layer auth-agnostic.

use payrun_auth::{AuthzError, Role, require_any_role};

use crate::context::UserContext;

/// Roles allowed to run payroll and read its artifacts.
pub const PAYROLL_ROLES: &[&str] = &[Role::ADMIN, Role::HR];

/// Create employees and read department stats.
pub const EMPLOYEE_ADMIN_ROLES: &[&str] = &[Role::ADMIN, Role::HR];

/// Edit existing employee records.
pub const EMPLOYEE_EDIT_ROLES: &[&str] = &[Role::ADMIN, Role::HR, Role::MANAGER];

/// Terminate (soft delete) employees.
pub const EMPLOYEE_TERMINATE_ROLES: &[&str] = &[Role::ADMIN];

pub fn authorize_payroll(user: &UserContext) -> Result<(), AuthzError> {
    authorize(user, PAYROLL_ROLES)
}

pub fn authorize(user: &UserContext, allowed: &[&str]) -> Result<(), AuthzError> {
    require_any_role(user.role(), allowed)
}

#[cfg(test)]
mod tests {
    use payrun_core::UserId;

    use super::*;

    fn user(role: Role) -> UserContext {
        UserContext::new(UserId::new(), "someone@example.com", role)
    }

    #[test]
    fn payroll_access_follows_role() {
        assert!(authorize_payroll(&user(Role::admin())).is_ok());
        assert!(authorize_payroll(&user(Role::hr())).is_ok());
        assert!(authorize_payroll(&user(Role::manager())).is_err());
        assert!(authorize_payroll(&user(Role::employee())).is_err());
    }

    #[test]
    fn employee_management_tiers() {
        let manager = user(Role::manager());
        assert!(authorize(&manager, EMPLOYEE_EDIT_ROLES).is_ok());
        assert!(authorize(&manager, EMPLOYEE_ADMIN_ROLES).is_err());

        assert!(authorize(&user(Role::hr()), EMPLOYEE_TERMINATE_ROLES).is_err());
        assert!(authorize(&user(Role::admin()), EMPLOYEE_TERMINATE_ROLES).is_ok());
        assert!(authorize(&user(Role::employee()), EMPLOYEE_EDIT_ROLES).is_err());
    }
}
