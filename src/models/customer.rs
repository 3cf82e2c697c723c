use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

pub const DEFAULT_LEAD_STATUS: &str = "Lead";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub id: Uuid,
    pub company_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    #[schema(example = "Lead")]
    pub lead_status: String,
    pub contract_value: Option<f64>,
    pub department: Department,
    pub sales_person_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCustomer {
    pub id: Uuid,
    pub company_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    pub lead_status: String,
    pub contract_value: Option<f64>,
    pub department: String,
    pub sales_person_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCustomer> for Customer {
    type Error = AppError;

    fn try_from(value: DbCustomer) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: value.id,
            company_name: value.company_name,
            email: value.email,
            phone: value.phone,
            contact_person: value.contact_person,
            lead_status: value.lead_status,
            contract_value: value.contract_value,
            department: Department::new(value.department),
            sales_person_id: value.sales_person_id,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CustomerCreateRequest {
    #[schema(example = "Siam Logistics Co., Ltd.")]
    pub company_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    pub lead_status: Option<String>,
    pub contract_value: Option<f64>,
    /// Defaults to the caller's home department.
    pub department: Option<Department>,
    pub sales_person_id: Option<Uuid>,
}

/// Fields left out keep their stored value.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CustomerUpdateRequest {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    pub lead_status: Option<String>,
    pub contract_value: Option<f64>,
    pub sales_person_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerListQuery {
    pub department: Option<Department>,
    pub lead_status: Option<String>,
}
