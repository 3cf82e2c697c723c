//! Authorization - department scopes and approval authority
//!
//! This module implements the department-scoped access model:
//! - Principal with a closed set of roles, one of which carries a department set
//! - Scope resolution (all departments vs. a finite set)
//! - Task visibility (scope, plus assignee/creator override)
//! - Approval authority for pending status change requests
//!
//! Everything here is pure; callers pass the principal explicitly.

mod approval;
mod principal;
mod scope;
mod visibility;

pub use approval::{may_decide, required_approvers};
pub use principal::{ordered_departments, Department, Principal, Role, RoleKind};
pub use scope::{can_access, scope, AccessScope};
pub use visibility::{is_visible, TaskVisibility};

use crate::errors::AppError;

/// Well-known role names
pub mod roles {
    pub const USER: &str = "user";
    pub const MANAGER: &str = "manager";
    pub const ADMIN: &str = "admin";
    pub const CROSS_DEPARTMENT: &str = "cross_department";
    /// Older name of `cross_department`, accepted on input only.
    pub const LEGACY_DIGITAL_MARKETING: &str = "digital_marketing";
}

/// Fails with `Forbidden` unless the principal may touch `department`.
pub fn ensure_department_access(principal: &Principal, department: &Department) -> Result<(), AppError> {
    if can_access(principal, department) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("no access to department {department}")))
    }
}

/// Scope for a listing with an optional department filter.
///
/// `None` means nothing is reachable and the listing is empty. A requested
/// department outside the scope is `Forbidden`.
pub fn listing_scope(principal: &Principal, department: Option<&Department>) -> Result<Option<AccessScope>, AppError> {
    let access = scope(principal);
    if access.is_empty() {
        return Ok(None);
    }

    match department.filter(|d| !d.is_blank()) {
        None => Ok(Some(access)),
        Some(department) => access
            .narrow(department)
            .map(Some)
            .ok_or_else(|| AppError::forbidden(format!("no access to department {department}"))),
    }
}
