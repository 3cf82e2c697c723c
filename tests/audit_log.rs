mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use socrm::audit::{record, verify_chain, AuditEntry, AuditSink, ChainStatus, SqliteAuditLog};
use socrm::authz::RoleKind;
use socrm::config::AppConfig;
use socrm::jwt::JwtConfig;
use socrm::{router, AppState};

use common::{login, seed_task, seed_user, send, setup_db, task_status};

#[tokio::test]
async fn chain_detects_edited_rows() -> Result<()> {
    let db = setup_db().await?;
    let audit = SqliteAuditLog::new(db.pool.clone());
    let actor = Uuid::new_v4();

    for action in ["customer_created", "customer_updated", "customer_deleted"] {
        record(
            &audit,
            AuditEntry::new("customer", Uuid::new_v4(), action, actor).meta(json!({ "department": "LBD" })),
        )
        .await;
    }
    assert_eq!(verify_chain(&db.pool).await?, ChainStatus::Intact { entries: 3 });

    sqlx::query("UPDATE activity_logs SET meta = '{\"department\":\"CR\"}' WHERE seq = 2")
        .execute(&db.pool)
        .await?;
    assert_eq!(verify_chain(&db.pool).await?, ChainStatus::Broken { seq: 2 });

    Ok(())
}

#[tokio::test]
async fn chain_detects_deleted_rows() -> Result<()> {
    let db = setup_db().await?;
    let audit = SqliteAuditLog::new(db.pool.clone());

    for _ in 0..3 {
        record(&audit, AuditEntry::new("task", Uuid::new_v4(), "task_created", Uuid::new_v4())).await;
    }
    sqlx::query("DELETE FROM activity_logs WHERE seq = 2").execute(&db.pool).await?;

    assert_eq!(verify_chain(&db.pool).await?, ChainStatus::Broken { seq: 3 });
    Ok(())
}

#[tokio::test]
async fn concurrent_appends_keep_the_chain_linear() -> Result<()> {
    let db = setup_db().await?;
    let audit = SqliteAuditLog::new(db.pool.clone());
    let actor = Uuid::new_v4();

    let writes = (0..8).map(|_| {
        let audit = audit.clone();
        tokio::spawn(async move {
            record(&audit, AuditEntry::new("task", Uuid::new_v4(), "status_updated", actor)).await;
        })
    });
    for handle in writes.collect::<Vec<_>>() {
        handle.await?;
    }

    assert_eq!(verify_chain(&db.pool).await?, ChainStatus::Intact { entries: 8 });
    Ok(())
}

#[tokio::test]
async fn separate_sinks_on_one_database_share_the_chain() -> Result<()> {
    let db = setup_db().await?;
    let actor = Uuid::new_v4();

    // Each sink serializes only its own appends, like two server processes.
    let writers = (0..2).map(|_| {
        let audit = SqliteAuditLog::new(db.pool.clone());
        tokio::spawn(async move {
            for _ in 0..3 {
                record(&audit, AuditEntry::new("task", Uuid::new_v4(), "status_updated", actor)).await;
            }
        })
    });
    for handle in writers.collect::<Vec<_>>() {
        handle.await?;
    }

    assert_eq!(verify_chain(&db.pool).await?, ChainStatus::Intact { entries: 6 });
    Ok(())
}

#[tokio::test]
async fn cancelled_appends_release_the_write_lock() -> Result<()> {
    let db = setup_db().await?;
    let audit = SqliteAuditLog::new(db.pool.clone());
    let creator = seed_user(&db.pool, "creator@example.com", RoleKind::Manager, "LBD", &[]).await?;

    for micros in [0, 1, 10, 50, 100, 500, 1_000] {
        let entry = AuditEntry::new("task", Uuid::new_v4(), "status_updated", creator.user_id);
        // Either finishes or is dropped mid-append, as when a client disconnects.
        let _ = tokio::time::timeout(Duration::from_micros(micros), audit.append(&entry)).await;
    }

    for _ in 0..3 {
        tokio::time::timeout(
            Duration::from_secs(2),
            seed_task(&db.pool, "LBD", creator.user_id, creator.user_id, "pending"),
        )
        .await??;
    }
    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks").fetch_one(&db.pool).await?;
    assert_eq!(tasks, 3);

    record(&audit, AuditEntry::new("task", Uuid::new_v4(), "status_updated", creator.user_id)).await;
    assert!(matches!(verify_chain(&db.pool).await?, ChainStatus::Intact { entries } if entries >= 1));
    Ok(())
}

struct BrokenSink;

#[async_trait]
impl AuditSink for BrokenSink {
    async fn append(&self, _entry: &AuditEntry) -> anyhow::Result<()> {
        anyhow::bail!("audit storage offline")
    }
}

#[tokio::test]
async fn audit_failures_do_not_block_status_changes() -> Result<()> {
    let db = setup_db().await?;
    let creator = seed_user(&db.pool, "creator@example.com", RoleKind::Manager, "LBD", &[]).await?;
    let assignee = seed_user(&db.pool, "assignee@example.com", RoleKind::User, "LBD", &[]).await?;
    let task_id = seed_task(&db.pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    let state = AppState::with_audit(
        db.pool.clone(),
        JwtConfig::new("test-secret", 1),
        AppConfig::default(),
        Arc::new(BrokenSink),
    );
    let app = router(state);
    let token = login(&app, "assignee@example.com").await?;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/tasks/{task_id}/status"),
        Some(&token),
        Some(json!({ "status": "in_progress" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "status change failed: {body}");
    assert_eq!(task_status(&db.pool, task_id).await?.0, "in_progress");

    let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_logs").fetch_one(&db.pool).await?;
    assert_eq!(logged, 0);

    Ok(())
}
