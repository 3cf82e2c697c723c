use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// One entry of a customer's contact history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[schema(example = "2025-10-01")]
    pub contact_date: NaiveDate,
    pub contact_subject: Option<String>,
    #[schema(example = "phone")]
    pub contact_channel: Option<String>,
    pub customer_contact_person: Option<String>,
    pub sales_person_id: Uuid,
    pub quotation_amount: Option<f64>,
    pub next_followup_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Lead status the customer moved to as a result of this contact.
    pub lead_status_updated: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ContactCreateRequest {
    pub customer_id: Uuid,
    /// Defaults to today (UTC).
    #[schema(example = "2025-10-01")]
    pub contact_date: Option<NaiveDate>,
    pub contact_subject: Option<String>,
    pub contact_channel: Option<String>,
    pub customer_contact_person: Option<String>,
    /// Defaults to the caller.
    pub sales_person_id: Option<Uuid>,
    pub quotation_amount: Option<f64>,
    pub next_followup_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[schema(example = "Negotiation")]
    pub lead_status_updated: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContactListQuery {
    pub customer_id: Uuid,
}
