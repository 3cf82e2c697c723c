use std::collections::BTreeSet;

use sqlx::{QueryBuilder, Sqlite};

use super::principal::{Department, Principal, Role};

/// Departments a principal may read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    AllDepartments,
    Departments(BTreeSet<Department>),
}

impl AccessScope {
    pub fn contains(&self, department: &Department) -> bool {
        match self {
            AccessScope::AllDepartments => true,
            AccessScope::Departments(set) => set.contains(department),
        }
    }

    /// True when no department at all is reachable.
    pub fn is_empty(&self) -> bool {
        matches!(self, AccessScope::Departments(set) if set.is_empty())
    }

    /// Narrows the scope to one requested department.
    ///
    /// Returns `None` when the department lies outside the scope.
    pub fn narrow(&self, department: &Department) -> Option<AccessScope> {
        if self.contains(department) {
            Some(AccessScope::Departments(BTreeSet::from([department.clone()])))
        } else {
            None
        }
    }

    /// Appends ` AND <column> IN (...)`; an empty scope matches no rows.
    pub fn push_filter<'args>(&self, builder: &mut QueryBuilder<'args, Sqlite>, column: &str) {
        match self {
            AccessScope::AllDepartments => {}
            AccessScope::Departments(set) if set.is_empty() => {
                builder.push(" AND 0 = 1");
            }
            AccessScope::Departments(set) => {
                builder.push(format!(" AND {column} IN ("));
                let mut separated = builder.separated(", ");
                for department in set {
                    separated.push_bind(department.as_str().to_owned());
                }
                separated.push_unseparated(")");
            }
        }
    }
}

/// Resolves the access scope of a principal.
///
/// - admin: every department
/// - user / manager: the home department
/// - cross_department: exactly the allowed set, which may be empty
pub fn scope(principal: &Principal) -> AccessScope {
    match &principal.role {
        Role::Admin => AccessScope::AllDepartments,
        Role::User | Role::Manager => {
            AccessScope::Departments(BTreeSet::from([principal.home_department.clone()]))
        }
        Role::CrossDepartment { allowed } => AccessScope::Departments(allowed.iter().cloned().collect()),
    }
}

pub fn can_access(principal: &Principal, department: &Department) -> bool {
    let allowed = scope(principal).contains(department);
    tracing::debug!(
        user_id = %principal.user_id,
        role = %principal.kind(),
        department = %department,
        allowed,
        "department access check"
    );
    allowed
}
