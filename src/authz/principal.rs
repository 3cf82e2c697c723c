use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Opaque department code such as `LBD` or `CR`. Codes are compared upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(from = "String", into = "String")]
#[schema(value_type = String, example = "LBD")]
pub struct Department(String);

impl Department {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Department {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Department {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Department> for String {
    fn from(value: Department) -> Self {
        value.0
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Department codes in the order given, without blanks or repeats.
pub fn ordered_departments<D: Into<Department>>(codes: impl IntoIterator<Item = D>) -> Vec<Department> {
    let mut departments: Vec<Department> = Vec::new();
    for department in codes.into_iter().map(Into::into) {
        if !department.is_blank() && !departments.contains(&department) {
            departments.push(department);
        }
    }
    departments
}

/// Role name as stored in the `users.role` column and exchanged on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    User,
    Manager,
    Admin,
    #[serde(alias = "digital_marketing")]
    CrossDepartment,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::User => super::roles::USER,
            RoleKind::Manager => super::roles::MANAGER,
            RoleKind::Admin => super::roles::ADMIN,
            RoleKind::CrossDepartment => super::roles::CROSS_DEPARTMENT,
        }
    }
}

impl FromStr for RoleKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            super::roles::USER => Ok(RoleKind::User),
            super::roles::MANAGER => Ok(RoleKind::Manager),
            super::roles::ADMIN => Ok(RoleKind::Admin),
            super::roles::CROSS_DEPARTMENT | super::roles::LEGACY_DIGITAL_MARKETING => {
                Ok(RoleKind::CrossDepartment)
            }
            other => Err(AppError::bad_request(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a principal. Only the cross-department role carries a department set;
/// every other role is scoped by the principal's home department or by nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Manager,
    Admin,
    /// `allowed` keeps the order the departments were assigned in.
    CrossDepartment { allowed: Vec<Department> },
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::User => RoleKind::User,
            Role::Manager => RoleKind::Manager,
            Role::Admin => RoleKind::Admin,
            Role::CrossDepartment { .. } => RoleKind::CrossDepartment,
        }
    }

    /// Rebuilds a role from its stored parts. The allowed set is ignored for
    /// every kind other than `CrossDepartment`.
    pub fn from_parts(kind: RoleKind, allowed: impl IntoIterator<Item = Department>) -> Self {
        match kind {
            RoleKind::User => Role::User,
            RoleKind::Manager => Role::Manager,
            RoleKind::Admin => Role::Admin,
            RoleKind::CrossDepartment => Role::CrossDepartment {
                allowed: ordered_departments(allowed),
            },
        }
    }
}

/// The authenticated actor of an operation. Every core operation takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub home_department: Department,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, home_department: impl Into<Department>, role: Role) -> Self {
        Self {
            user_id,
            home_department: home_department.into(),
            role,
        }
    }

    pub fn user(user_id: Uuid, department: impl Into<Department>) -> Self {
        Self::new(user_id, department, Role::User)
    }

    pub fn manager(user_id: Uuid, department: impl Into<Department>) -> Self {
        Self::new(user_id, department, Role::Manager)
    }

    pub fn admin(user_id: Uuid, department: impl Into<Department>) -> Self {
        Self::new(user_id, department, Role::Admin)
    }

    pub fn cross_department<D: Into<Department>>(
        user_id: Uuid,
        home_department: impl Into<Department>,
        allowed: impl IntoIterator<Item = D>,
    ) -> Self {
        Self::new(
            user_id,
            home_department,
            Role::CrossDepartment {
                allowed: ordered_departments(allowed),
            },
        )
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Managers and admins may assign work to others and administer users.
    pub fn can_manage_users(&self) -> bool {
        matches!(self.role, Role::Manager | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_codes_are_normalized() {
        assert_eq!(Department::new(" lbd "), Department::new("LBD"));
        assert_eq!(Department::from("cr").as_str(), "CR");
    }

    #[test]
    fn legacy_role_name_maps_to_cross_department() {
        assert_eq!("digital_marketing".parse::<RoleKind>().unwrap(), RoleKind::CrossDepartment);
        assert_eq!("cross_department".parse::<RoleKind>().unwrap(), RoleKind::CrossDepartment);
        assert!("owner".parse::<RoleKind>().is_err());

        let parsed: RoleKind = serde_json::from_str("\"digital_marketing\"").unwrap();
        assert_eq!(parsed, RoleKind::CrossDepartment);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"cross_department\"");
    }

    #[test]
    fn allowed_set_only_survives_for_cross_department() {
        let depts = vec![Department::new("LBD"), Department::new("CR")];
        assert_eq!(Role::from_parts(RoleKind::Manager, depts.clone()), Role::Manager);

        match Role::from_parts(RoleKind::CrossDepartment, depts) {
            Role::CrossDepartment { allowed } => assert_eq!(allowed.len(), 2),
            other => panic!("unexpected role {other:?}"),
        }
    }

    #[test]
    fn allowed_departments_keep_their_order() {
        let ordered = ordered_departments(["sn", "CR", "SN", " ", "lbd"]);
        assert_eq!(ordered, vec![Department::new("SN"), Department::new("CR"), Department::new("LBD")]);
    }

    #[test]
    fn manage_users_capability() {
        let id = Uuid::new_v4();
        assert!(Principal::manager(id, "LBD").can_manage_users());
        assert!(Principal::admin(id, "LBD").can_manage_users());
        assert!(!Principal::user(id, "LBD").can_manage_users());
        assert!(!Principal::cross_department(id, "LBD", ["LBD", "CR"]).can_manage_users());
    }
}
