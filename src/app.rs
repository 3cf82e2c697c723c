use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::{AuditSink, SqliteAuditLog};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{auth, contacts, customers, health, projects, services, status_requests, tasks, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<AppConfig>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// State with the SQLite audit log writing to the same pool.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, config: AppConfig) -> Self {
        let audit = Arc::new(SqliteAuditLog::new(pool.clone()));
        Self::with_audit(pool, jwt, config, audit)
    }

    pub fn with_audit(pool: SqlitePool, jwt: JwtConfig, config: AppConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            audit,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let app_config = AppConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, app_config);

    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id/password", patch(users::change_password));

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/:id", get(tasks::get_task))
        .route("/:id/status", patch(tasks::set_task_status))
        .route("/:id/status-requests", get(tasks::list_status_requests))
        .route("/:id/activity", get(tasks::list_task_activity));

    let status_request_routes = Router::new().route("/:id", patch(status_requests::decide_status_request));

    let customer_routes = Router::new()
        .route("/", get(customers::list_customers).post(customers::create_customer))
        .route(
            "/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        );

    let project_routes = Router::new().route("/", get(projects::list_projects).post(projects::create_project));

    let contact_routes = Router::new().route("/", get(contacts::list_contacts).post(contacts::create_contact));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/tasks", task_routes)
        .nest("/status-requests", status_request_routes)
        .nest("/customers", customer_routes)
        .nest("/projects", project_routes)
        .route("/services", get(services::list_services))
        .nest("/contacts", contact_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
