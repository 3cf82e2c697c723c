use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{actions, record, AuditEntry};
use crate::authz::{ensure_department_access, listing_scope};
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::clean_text;
use crate::models::customer::{
    Customer, CustomerCreateRequest, CustomerListQuery, CustomerUpdateRequest, DbCustomer, DEFAULT_LEAD_STATUS,
};
use crate::models::user::DbUser;
use crate::utils::utc_now;

const CUSTOMER_COLUMNS: &str = "id, company_name, email, phone, contact_person, lead_status, contract_value, department, sales_person_id, created_by, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/customers",
    tag = "Customers",
    params(CustomerListQuery),
    responses(
        (status = 200, description = "Customers in the caller's scope", body = [Customer]),
        (status = 403, description = "Requested department is outside the caller's scope")
    )
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Customer>>> {
    let Some(access) = listing_scope(&auth.principal, query.department.as_ref())? else {
        return Ok(Json(Vec::new()));
    };

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE 1 = 1"));
    access.push_filter(&mut builder, "department");
    if let Some(lead_status) = clean_text(query.lead_status) {
        builder.push(" AND lead_status = ").push_bind(lead_status);
    }
    builder.push(" ORDER BY updated_at DESC");

    let rows = builder.build_query_as::<DbCustomer>().fetch_all(&state.pool).await?;
    let customers = rows.into_iter().map(Customer::try_from).collect::<Result<Vec<_>, _>>()?;

    Ok(Json(customers))
}

#[utoipa::path(
    get,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer detail", body = Customer),
        (status = 403, description = "Customer belongs to another department"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Customer>> {
    let customer = fetch_customer(&state.pool, customer_id).await?;
    ensure_department_access(&auth.principal, &customer.department)?;
    Ok(Json(customer))
}

#[utoipa::path(
    post,
    path = "/customers",
    tag = "Customers",
    request_body = CustomerCreateRequest,
    responses(
        (status = 201, description = "Customer created", body = Customer),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "No access to the department")
    )
)]
pub async fn create_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CustomerCreateRequest>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let principal = &auth.principal;
    let company_name = payload.company_name.trim().to_string();
    if company_name.is_empty() {
        return Err(AppError::bad_request("company_name is required"));
    }

    let department = payload
        .department
        .filter(|department| !department.is_blank())
        .unwrap_or_else(|| principal.home_department.clone());
    state.config.ensure_known_department(&department)?;
    ensure_department_access(principal, &department)?;

    if let Some(sales_person_id) = payload.sales_person_id {
        ensure_active_user(&state.pool, sales_person_id).await?;
    }

    let customer_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO customers (id, company_name, email, phone, contact_person, lead_status, contract_value, department, sales_person_id, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(customer_id)
    .bind(&company_name)
    .bind(clean_text(payload.email))
    .bind(clean_text(payload.phone))
    .bind(clean_text(payload.contact_person))
    .bind(clean_text(payload.lead_status).unwrap_or_else(|| DEFAULT_LEAD_STATUS.to_string()))
    .bind(payload.contract_value)
    .bind(department.as_str())
    .bind(payload.sales_person_id)
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let customer = fetch_customer(&state.pool, customer_id).await?;
    record(
        state.audit.as_ref(),
        AuditEntry::about(&customer, actions::CUSTOMER_CREATED, principal.user_id)
            .message(format!("created customer {}", customer.company_name))
            .meta(json!({ "department": customer.department })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(customer)))
}

#[utoipa::path(
    put,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = CustomerUpdateRequest,
    responses(
        (status = 200, description = "Customer updated", body = Customer),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Customer belongs to another department"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<CustomerUpdateRequest>,
) -> AppResult<Json<Customer>> {
    let principal = &auth.principal;
    let existing = fetch_customer(&state.pool, customer_id).await?;
    ensure_department_access(principal, &existing.department)?;

    let company_name = match payload.company_name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("company_name is required")),
        Some(name) => name.to_string(),
        None => existing.company_name.clone(),
    };
    if let Some(sales_person_id) = payload.sales_person_id {
        ensure_active_user(&state.pool, sales_person_id).await?;
    }
    let changes = serde_json::to_value(&payload)?;

    sqlx::query(
        "UPDATE customers SET company_name = ?, email = ?, phone = ?, contact_person = ?, lead_status = ?,
                contract_value = ?, sales_person_id = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&company_name)
    .bind(clean_text(payload.email).or(existing.email))
    .bind(clean_text(payload.phone).or(existing.phone))
    .bind(clean_text(payload.contact_person).or(existing.contact_person))
    .bind(clean_text(payload.lead_status).unwrap_or(existing.lead_status))
    .bind(payload.contract_value.or(existing.contract_value))
    .bind(payload.sales_person_id.or(existing.sales_person_id))
    .bind(utc_now())
    .bind(customer_id)
    .execute(&state.pool)
    .await?;

    let customer = fetch_customer(&state.pool, customer_id).await?;
    record(
        state.audit.as_ref(),
        AuditEntry::about(&customer, actions::CUSTOMER_UPDATED, principal.user_id).meta(json!({ "changes": changes })),
    )
    .await;

    Ok(Json(customer))
}

#[utoipa::path(
    delete,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 403, description = "Customer belongs to another department"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    let principal = &auth.principal;
    let customer = fetch_customer(&state.pool, customer_id).await?;
    ensure_department_access(principal, &customer.department)?;

    sqlx::query("DELETE FROM customers WHERE id = ?")
        .bind(customer_id)
        .execute(&state.pool)
        .await?;

    record(
        state.audit.as_ref(),
        AuditEntry::about(&customer, actions::CUSTOMER_DELETED, principal.user_id)
            .message(format!("deleted customer {}", customer.company_name))
            .meta(json!({ "department": customer.department })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_customer(pool: &SqlitePool, customer_id: Uuid) -> AppResult<Customer> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?");
    let row = sqlx::query_as::<_, DbCustomer>(&sql)
        .bind(customer_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("customer not found"))?;

    row.try_into()
}

pub(crate) async fn ensure_active_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    fetch_user_by_id(pool, user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::bad_request("sales person must be an active user"))
}
