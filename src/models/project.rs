use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub project_name: String,
    pub project_type: Option<String>,
    pub description: Option<String>,
    #[schema(example = "open")]
    pub status: String,
    pub department: Department,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub project_name: String,
    pub project_type: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub department: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        Ok(Project {
            id: value.id,
            customer_id: value.customer_id,
            project_name: value.project_name,
            project_type: value.project_type,
            description: value.description,
            status: value.status,
            department: Department::new(value.department),
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ProjectCreateRequest {
    pub customer_id: Uuid,
    #[schema(example = "Website redesign")]
    pub project_name: String,
    #[schema(example = "web")]
    pub project_type: Option<String>,
    pub description: Option<String>,
    #[schema(example = "open")]
    pub status: Option<String>,
    /// Defaults to the customer's department.
    pub department: Option<Department>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    pub customer_id: Option<Uuid>,
    pub department: Option<Department>,
}
