use axum::extract::State;
use sqlx::{QueryBuilder, Sqlite};

use crate::app::AppState;
use crate::authz::listing_scope;
use crate::errors::AppResult;
use crate::extract::{Json, Query};
use crate::jwt::AuthUser;
use crate::models::service::{DbService, Service, ServiceListQuery};

#[utoipa::path(
    get,
    path = "/services",
    tag = "Services",
    params(ServiceListQuery),
    responses(
        (status = 200, description = "Services of the departments in scope", body = [Service]),
        (status = 403, description = "Requested department is outside the caller's scope")
    )
)]
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Service>>> {
    let Some(access) = listing_scope(&auth.principal, query.department.as_ref())? else {
        return Ok(Json(Vec::new()));
    };

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, service_name, department, requires_quantity, quantity_unit, created_at FROM services WHERE 1 = 1",
    );
    access.push_filter(&mut builder, "department");
    builder.push(" ORDER BY department ASC, service_name ASC");

    let rows = builder.build_query_as::<DbService>().fetch_all(&state.pool).await?;
    let services = rows.into_iter().map(Service::try_from).collect::<Result<Vec<_>, _>>()?;

    Ok(Json(services))
}
