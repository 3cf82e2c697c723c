use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::{Department, Principal, Role, RoleKind};
use crate::errors::AppError;

use super::parse_department_list;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub department: Department,
    pub role: RoleKind,
    /// Only populated for `cross_department` users.
    pub allowed_departments: Vec<Department>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub department: String,
    pub role: String,
    pub allowed_departments: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    /// Builds the principal this account acts as.
    pub fn principal(&self) -> Result<Principal, AppError> {
        let kind: RoleKind = self
            .role
            .parse()
            .map_err(|_| AppError::internal(format!("stored role is invalid: {}", self.role)))?;
        let allowed = parse_department_list(self.allowed_departments.as_deref())?;

        Ok(Principal::new(self.id, Department::new(&self.department), Role::from_parts(kind, allowed)))
    }
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let principal = value.principal()?;
        let allowed_departments = match &principal.role {
            Role::CrossDepartment { allowed } => allowed.clone(),
            _ => Vec::new(),
        };

        Ok(User {
            id: value.id,
            email: value.email,
            full_name: value.full_name,
            department: principal.home_department,
            role: principal.role.kind(),
            allowed_departments,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "somchai@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "Somchai Jaidee")]
    pub full_name: String,
    pub department: Department,
    pub role: RoleKind,
    pub allowed_departments: Option<Vec<Department>>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PasswordChangeRequest {
    pub current_password: Option<String>,
    #[schema(example = "N3wS3cureP@ss")]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub department: Option<Department>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "somchai@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_user(role: &str, allowed: Option<&str>) -> DbUser {
        let now = Utc::now();
        DbUser {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            full_name: "A".into(),
            password_hash: "x".into(),
            department: "lbd".into(),
            role: role.into(),
            allowed_departments: allowed.map(String::from),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cross_department_user_keeps_allowed_set() {
        let user: User = db_user("cross_department", Some(r#"["LBD","CR"]"#)).try_into().unwrap();
        assert_eq!(user.role, RoleKind::CrossDepartment);
        assert_eq!(user.department, Department::new("LBD"));
        assert_eq!(user.allowed_departments, vec![Department::new("LBD"), Department::new("CR")]);

        let reordered: User = db_user("cross_department", Some(r#"["SN","lbd","SN"]"#)).try_into().unwrap();
        assert_eq!(reordered.allowed_departments, vec![Department::new("SN"), Department::new("LBD")]);
    }

    #[test]
    fn allowed_set_is_dropped_for_other_roles() {
        let user: User = db_user("manager", Some(r#"["LBD","CR"]"#)).try_into().unwrap();
        assert!(user.allowed_departments.is_empty());
    }

    #[test]
    fn legacy_stored_role_still_resolves() {
        let principal = db_user("digital_marketing", None).principal().unwrap();
        assert_eq!(principal.kind(), RoleKind::CrossDepartment);
    }

    #[test]
    fn garbage_role_is_an_internal_error() {
        assert!(matches!(db_user("root", None).principal(), Err(AppError::Internal(_))));
    }
}
