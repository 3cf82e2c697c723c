use std::collections::BTreeSet;

use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::principal::{Department, Principal};
use super::scope::{scope, AccessScope};

/// Whether a single task is visible to a principal.
///
/// A non-admin sees a task when its department is in scope, or when they are
/// the assignee or the creator, whatever the task's department. An empty
/// scope sees nothing, so single reads agree with [`TaskVisibility::Nothing`].
pub fn is_visible(principal: &Principal, department: &Department, assigned_to: Uuid, created_by: Uuid) -> bool {
    match scope(principal) {
        AccessScope::AllDepartments => true,
        AccessScope::Departments(set) if set.is_empty() => false,
        AccessScope::Departments(set) => {
            set.contains(department) || assigned_to == principal.user_id || created_by == principal.user_id
        }
    }
}

/// Row filter for task listings, derived from a principal's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskVisibility {
    All,
    Scoped {
        departments: BTreeSet<Department>,
        user_id: Uuid,
    },
    /// Empty scope: nothing is listed, not even the principal's own tasks.
    Nothing,
}

impl TaskVisibility {
    pub fn for_principal(principal: &Principal) -> Self {
        match scope(principal) {
            AccessScope::AllDepartments => TaskVisibility::All,
            AccessScope::Departments(set) if set.is_empty() => TaskVisibility::Nothing,
            AccessScope::Departments(departments) => TaskVisibility::Scoped {
                departments,
                user_id: principal.user_id,
            },
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, TaskVisibility::Nothing)
    }

    /// Appends ` AND <predicate>` for the task table aliased as `alias`.
    pub fn push_predicate<'args>(&self, builder: &mut QueryBuilder<'args, Sqlite>, alias: &str) {
        match self {
            TaskVisibility::All => {}
            TaskVisibility::Nothing => {
                builder.push(" AND 0 = 1");
            }
            TaskVisibility::Scoped { departments, user_id } => {
                builder.push(format!(" AND ({alias}.department IN ("));
                let mut separated = builder.separated(", ");
                for department in departments {
                    separated.push_bind(department.as_str().to_owned());
                }
                separated.push_unseparated(")");
                builder.push(format!(" OR {alias}.assigned_to = "));
                builder.push_bind(*user_id);
                builder.push(format!(" OR {alias}.created_by = "));
                builder.push_bind(*user_id);
                builder.push(")");
            }
        }
    }
}
