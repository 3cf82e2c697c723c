use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

/// A catalogue entry offered by one department.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Service {
    pub id: Uuid,
    pub service_name: String,
    pub department: Department,
    pub requires_quantity: bool,
    pub quantity_unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbService {
    pub id: Uuid,
    pub service_name: String,
    pub department: String,
    pub requires_quantity: bool,
    pub quantity_unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbService> for Service {
    type Error = AppError;

    fn try_from(value: DbService) -> Result<Self, Self::Error> {
        Ok(Service {
            id: value.id,
            service_name: value.service_name,
            department: Department::new(value.department),
            requires_quantity: value.requires_quantity,
            quantity_unit: value.quantity_unit,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServiceListQuery {
    pub department: Option<Department>,
}
