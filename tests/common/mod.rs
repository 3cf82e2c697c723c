#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use socrm::authz::{Department, Principal, RoleKind};
use socrm::db::users::{insert_user, NewUser};
use socrm::utils::{hash_password, utc_now};

pub const PASSWORD: &str = "password123";

pub struct TestDb {
    pub pool: SqlitePool,
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
}

pub async fn setup_db() -> Result<TestDb> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    Ok(TestDb { pool, _dir: dir })
}

pub async fn setup_app() -> Result<(TestDb, Router)> {
    let db = setup_db().await?;
    std::env::set_var("JWT_SECRET", "test-secret");
    let app = socrm::create_app(db.pool.clone()).await?;
    Ok((db, app))
}

/// Inserts an active user with password [`PASSWORD`] and returns its principal.
pub async fn seed_user(
    pool: &SqlitePool,
    email: &str,
    role: RoleKind,
    department: &str,
    allowed: &[&str],
) -> Result<Principal> {
    let user = insert_user(
        pool,
        NewUser {
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: hash_password(PASSWORD)?,
            department: Department::new(department),
            role,
            allowed_departments: allowed.iter().map(|code| Department::new(*code)).collect(),
        },
    )
    .await?;

    Ok(user.principal()?)
}

/// Inserts a task row directly, bypassing creation rules and audit.
pub async fn seed_task(
    pool: &SqlitePool,
    department: &str,
    assigned_to: Uuid,
    created_by: Uuid,
    status: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO tasks (id, title, department, assigned_to, created_by, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("task in {department}"))
    .bind(department)
    .bind(assigned_to)
    .bind(created_by)
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn seed_customer(pool: &SqlitePool, company_name: &str, department: &str, created_by: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO customers (id, company_name, lead_status, department, created_by, created_at, updated_at)
         VALUES (?, ?, 'Lead', ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(company_name)
    .bind(department)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn seed_service(pool: &SqlitePool, name: &str, department: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO services (id, service_name, department, requires_quantity, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(department)
    .bind(utc_now())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn task_status(pool: &SqlitePool, task_id: Uuid) -> Result<(String, Option<String>)> {
    let row: (String, Option<String>) = sqlx::query_as("SELECT status, status_note FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Sends a JSON request and returns the status with the parsed body
/// (`Value::Null` when the body is empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body from {method} {uri}"))?
    };

    Ok((status, value))
}

pub async fn login(app: &Router, email: &str) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": PASSWORD })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "login failed for {email}: {status} {body}");

    body.get("token")
        .and_then(Value::as_str)
        .map(String::from)
        .context("missing token")
}
