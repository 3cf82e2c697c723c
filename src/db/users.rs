use std::sync::OnceLock;

use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::authz::{Department, RoleKind};
use crate::errors::{AppError, AppResult};
use crate::models::user::DbUser;
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

pub const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, department, role, allowed_departments, is_active, created_at, updated_at";

/// Values for a new `users` row. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub department: Department,
    pub role: RoleKind,
    pub allowed_departments: Vec<Department>,
}

pub async fn fetch_user_by_id<'e, E>(executor: E, user_id: Uuid) -> AppResult<Option<DbUser>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

pub async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Inserts a user; a taken email is reported as `Conflict`.
pub async fn insert_user(pool: &SqlitePool, new_user: NewUser) -> AppResult<DbUser> {
    let id = Uuid::new_v4();
    let now = utc_now();
    let allowed = match new_user.role {
        RoleKind::CrossDepartment => {
            let codes: Vec<&str> = new_user.allowed_departments.iter().map(Department::as_str).collect();
            Some(serde_json::to_string(&codes)?)
        }
        _ => None,
    };

    sqlx::query(
        "INSERT INTO users (id, email, full_name, password_hash, department, role, allowed_departments, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(id)
    .bind(normalize_email(&new_user.email))
    .bind(new_user.full_name.trim())
    .bind(&new_user.password_hash)
    .bind(new_user.department.as_str())
    .bind(new_user.role.as_str())
    .bind(allowed)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| AppError::conflict_on_unique(err, "email is already registered"))?;

    fetch_user_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("user vanished after insert"))
}

pub async fn update_password_hash(pool: &SqlitePool, user_id: Uuid, password_hash: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}

/// Hash checked when the email is unknown, so every login attempt pays for
/// one argon2 verification.
fn placeholder_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| hash_password("placeholder-password").ok()).as_deref()
}

/// Checks an email/password pair against an active account.
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> AppResult<DbUser> {
    let Some(user) = fetch_user_by_email(pool, email).await? else {
        if let Some(hash) = placeholder_hash() {
            let _ = verify_password(password, hash);
        }
        return Err(AppError::unauthorized("invalid credentials"));
    };

    let password_ok = verify_password(password, &user.password_hash)?;
    if !user.is_active {
        tracing::debug!(user_id = %user.id, "login to inactive account");
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !password_ok {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AppError::unauthorized("invalid credentials"));
    }

    Ok(user)
}
