use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{models, routes};

/// Operations reachable without a bearer token.
const PUBLIC_OPERATIONS: [(&str, &str); 2] = [("/auth/login", "post"), ("/api/health", "get")];

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::me,
		routes::users::list_users,
		routes::users::create_user,
		routes::users::change_password,
		routes::tasks::list_tasks,
		routes::tasks::create_task,
		routes::tasks::get_task,
		routes::tasks::set_task_status,
		routes::tasks::list_status_requests,
		routes::tasks::list_task_activity,
		routes::status_requests::decide_status_request,
		routes::customers::list_customers,
		routes::customers::get_customer,
		routes::customers::create_customer,
		routes::customers::update_customer,
		routes::customers::delete_customer,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::services::list_services,
		routes::contacts::list_contacts,
		routes::contacts::create_contact
	),
	components(
		schemas(
			crate::authz::Department,
			crate::authz::RoleKind,
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::UserCreateRequest,
			models::user::PasswordChangeRequest,
			models::task::Task,
			models::task::TaskStatus,
			models::task::TaskCreateRequest,
			models::task::TaskStatusUpdateRequest,
			models::status_request::StatusChangeRequest,
			models::status_request::Decision,
			models::status_request::Verdict,
			models::status_request::DecisionRequest,
			models::status_request::DecisionResponse,
			models::status_request::StatusChangeResponse,
			models::activity::ActivityLog,
			models::customer::Customer,
			models::customer::CustomerCreateRequest,
			models::customer::CustomerUpdateRequest,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::service::Service,
			models::contact::Contact,
			models::contact::ContactCreateRequest
		)
	),
	tags(
		(name = "Health", description = "Liveness and database reachability"),
		(name = "Auth", description = "Login and current user"),
		(name = "Users", description = "User administration"),
		(name = "Tasks", description = "Tasks, status changes and approvals"),
		(name = "Customers", description = "Customers and contact history"),
		(name = "Projects", description = "Customer projects"),
		(name = "Services", description = "Service catalogue per department")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc)?;
	ensure_global_security(&mut doc)?;
	mark_public_operations(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root_object(doc: &mut Value) -> anyhow::Result<&mut Map<String, Value>> {
	doc.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))
}

fn ensure_security_components(doc: &mut Value) -> anyhow::Result<()> {
	let components = root_object(doc)?
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));

	let schemes = components
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("components must be an object"))?
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
	Ok(())
}

fn ensure_global_security(doc: &mut Value) -> anyhow::Result<()> {
	root_object(doc)?
		.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
	Ok(())
}

fn mark_public_operations(doc: &mut Value) {
	for (path, method) in PUBLIC_OPERATIONS {
		if let Some(operation) = doc
			.pointer_mut(&format!("/paths/{}/{}", path.replace('/', "~1"), method))
			.and_then(Value::as_object_mut)
		{
			operation.insert("security".to_string(), json!([]));
		}
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn login_and_health_need_no_token() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();
		assert_eq!(doc.pointer("/paths/~1auth~1login/post/security"), Some(&json!([])));
		assert_eq!(doc.pointer("/paths/~1api~1health/get/security"), Some(&json!([])));
		assert!(doc.pointer("/paths/~1tasks/get/security").is_none());
		assert!(doc.pointer("/components/securitySchemes/bearerAuth").is_some());
	}
}
