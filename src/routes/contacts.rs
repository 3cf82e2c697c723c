use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{actions, record, AuditEntry};
use crate::authz::{can_access, ensure_department_access, Department};
use crate::errors::{AppError, AppResult};
use crate::extract::{Json, Query};
use crate::jwt::AuthUser;
use crate::models::clean_text;
use crate::models::contact::{Contact, ContactCreateRequest, ContactListQuery};
use crate::routes::customers::{ensure_active_user, fetch_customer};
use crate::utils::utc_now;

const CONTACT_COLUMNS: &str = "id, customer_id, contact_date, contact_subject, contact_channel, customer_contact_person,
        sales_person_id, quotation_amount, next_followup_date, notes, lead_status_updated, created_at";

#[utoipa::path(
    get,
    path = "/contacts",
    tag = "Customers",
    params(ContactListQuery),
    responses(
        (status = 200, description = "Contact history of a customer, latest first", body = [Contact]),
        (status = 403, description = "Customer belongs to another department"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Contact>>> {
    let customer = fetch_customer(&state.pool, query.customer_id).await?;
    ensure_department_access(&auth.principal, &customer.department)?;

    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contact_history WHERE customer_id = ? ORDER BY contact_date DESC, created_at DESC"
    );
    let contacts = sqlx::query_as::<_, Contact>(&sql)
        .bind(customer.id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(contacts))
}

#[utoipa::path(
    post,
    path = "/contacts",
    tag = "Customers",
    request_body = ContactCreateRequest,
    responses(
        (status = 201, description = "Contact recorded", body = Contact),
        (status = 400, description = "Sales person is not an active user"),
        (status = 403, description = "Customer or sales person outside the caller's scope"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn create_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ContactCreateRequest>,
) -> AppResult<(StatusCode, Json<Contact>)> {
    let principal = &auth.principal;
    let customer = fetch_customer(&state.pool, payload.customer_id).await?;
    ensure_department_access(principal, &customer.department)?;

    let sales_person_id = match payload.sales_person_id {
        Some(id) if id != principal.user_id => {
            let sales_person = ensure_active_user(&state.pool, id).await?;
            if !can_access(principal, &Department::new(&sales_person.department)) {
                return Err(AppError::forbidden("sales person belongs to a department outside your scope"));
            }
            id
        }
        _ => principal.user_id,
    };

    let lead_status_updated = clean_text(payload.lead_status_updated);
    let contact_id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO contact_history (id, customer_id, contact_date, contact_subject, contact_channel, customer_contact_person,
                sales_person_id, quotation_amount, next_followup_date, notes, lead_status_updated, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(contact_id)
    .bind(customer.id)
    .bind(payload.contact_date.unwrap_or_else(|| now.date_naive()))
    .bind(clean_text(payload.contact_subject))
    .bind(clean_text(payload.contact_channel))
    .bind(clean_text(payload.customer_contact_person))
    .bind(sales_person_id)
    .bind(payload.quotation_amount)
    .bind(payload.next_followup_date)
    .bind(clean_text(payload.notes))
    .bind(&lead_status_updated)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if lead_status_updated.is_some() || payload.quotation_amount.is_some() {
        sqlx::query(
            "UPDATE customers SET lead_status = COALESCE(?, lead_status), contract_value = COALESCE(?, contract_value), updated_at = ?
             WHERE id = ?",
        )
        .bind(&lead_status_updated)
        .bind(payload.quotation_amount)
        .bind(now)
        .bind(customer.id)
        .execute(&mut *tx)
        .await?;
    }

    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contact_history WHERE id = ?");
    let contact = sqlx::query_as::<_, Contact>(&sql)
        .bind(contact_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    record(
        state.audit.as_ref(),
        AuditEntry::about(&customer, actions::CONTACT_CREATED, principal.user_id)
            .meta(json!({
                "contact_id": contact.id,
                "lead_status_updated": contact.lead_status_updated,
                "quotation_amount": contact.quotation_amount,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(contact)))
}
