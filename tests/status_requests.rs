mod common;

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use socrm::audit::{list_entity_activity, verify_chain, ChainStatus, MemoryAuditSink, SqliteAuditLog};
use socrm::authz::{Principal, RoleKind};
use socrm::errors::AppError;
use socrm::models::status_request::{Decision, Verdict};
use socrm::models::task::TaskStatus;
use socrm::workflow::{self, StatusChange};

use common::{seed_task, seed_user, setup_db, task_status};

struct Cast {
    creator: Principal,
    assignee: Principal,
    bystander: Principal,
    admin: Principal,
}

async fn cast(pool: &SqlitePool) -> Result<Cast> {
    Ok(Cast {
        creator: seed_user(pool, "creator@example.com", RoleKind::Manager, "LBD", &[]).await?,
        assignee: seed_user(pool, "assignee@example.com", RoleKind::User, "LBD", &[]).await?,
        bystander: seed_user(pool, "bystander@example.com", RoleKind::Manager, "LBD", &[]).await?,
        admin: seed_user(pool, "admin@example.com", RoleKind::Admin, "CR", &[]).await?,
    })
}

#[tokio::test]
async fn postponed_request_is_approved_by_the_creator() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = SqliteAuditLog::new(pool.clone());
    let Cast { creator, assignee, bystander, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    let missing_note =
        workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::Postponed, None).await;
    assert!(matches!(missing_note, Err(AppError::BadRequest(_))), "got {missing_note:?}");
    assert_eq!(task_status(pool, task_id).await?, ("pending".to_string(), None));

    let change = workflow::set_task_status(
        pool,
        &audit,
        &assignee,
        task_id,
        TaskStatus::Postponed,
        Some("client asked to delay".into()),
    )
    .await?;
    let request = match change {
        StatusChange::PendingApproval(request) => request,
        other => panic!("expected a pending request, got {other:?}"),
    };
    assert_eq!(request.decision, Decision::Pending);
    assert_eq!(request.required_approver_ids, vec![creator.user_id]);
    assert_eq!(task_status(pool, task_id).await?.0, "pending");

    let task = workflow::get_task(pool, &assignee, task_id).await?;
    assert_eq!(task.pending_request_id, Some(request.id));
    assert_eq!(task.pending_requested_status, Some(TaskStatus::Postponed));

    let denied = workflow::decide(pool, &audit, &bystander, request.id, Verdict::Approved, None).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))), "got {denied:?}");

    let decided = workflow::decide(pool, &audit, &creator, request.id, Verdict::Approved, None).await?;
    assert_eq!(decided.request.decision, Decision::Approved);
    assert_eq!(decided.request.decided_by, Some(creator.user_id));
    assert_eq!(decided.task.status, TaskStatus::Postponed);
    assert_eq!(decided.task.status_note.as_deref(), Some("client asked to delay"));
    assert!(decided.task.pending_request_id.is_none());

    let activity = list_entity_activity(pool, "task", task_id).await?;
    let actions: Vec<&str> = activity.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(actions, vec!["status_change_requested", "status_request_approved"]);
    assert_eq!(verify_chain(pool).await?, ChainStatus::Intact { entries: 2 });

    Ok(())
}

#[tokio::test]
async fn second_submission_conflicts_while_one_is_pending() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "in_progress").await?;

    let first = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None).await?;
    assert!(first.is_pending());

    let second = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Cancelled, None).await;
    match second {
        Err(AppError::Conflict(message)) => assert!(message.contains("already pending")),
        other => panic!("expected conflict, got {other:?}"),
    }

    assert_eq!(task_status(pool, task_id).await?.0, "in_progress");
    assert_eq!(audit.entries().len(), 1);
    Ok(())
}

#[tokio::test]
async fn rejection_leaves_the_task_untouched() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "in_progress").await?;
    sqlx::query("UPDATE tasks SET status_note = 'halfway' WHERE id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;

    let request = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Cancelled, Some("lost deal".into())).await?;
    let decided = workflow::decide(pool, &audit, &creator, request.id, Verdict::Rejected, Some("keep trying".into())).await?;

    assert_eq!(decided.request.decision, Decision::Rejected);
    assert_eq!(decided.request.decision_note.as_deref(), Some("keep trying"));
    assert_eq!(task_status(pool, task_id).await?, ("in_progress".to_string(), Some("halfway".to_string())));

    // The task is free for a new request once the old one is resolved.
    let again = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None).await?;
    assert_ne!(again.id, request.id);

    let history = workflow::list_requests(pool, &assignee, task_id).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|r| r.is_pending()).count(), 1);
    Ok(())
}

#[tokio::test]
async fn deciding_twice_does_not_apply_twice() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, admin, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    let request = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None).await?;
    workflow::decide(pool, &audit, &admin, request.id, Verdict::Approved, None).await?;

    let second = workflow::decide(pool, &audit, &creator, request.id, Verdict::Rejected, None).await;
    assert!(matches!(second, Err(AppError::NotFound(_))), "got {second:?}");

    let stored = workflow::list_requests(pool, &creator, task_id).await?;
    assert_eq!(stored[0].decision, Decision::Approved);
    assert_eq!(stored[0].decided_by, Some(admin.user_id));
    assert_eq!(task_status(pool, task_id).await?.0, "completed");

    let decisions = audit
        .entries()
        .into_iter()
        .filter(|entry| entry.action.starts_with("status_request_"))
        .count();
    assert_eq!(decisions, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_submissions_leave_one_pending_request() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    let (a, b) = tokio::join!(
        workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None),
        workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Cancelled, None),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
        }
    }

    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM task_status_requests WHERE task_id = ? AND decision = 'pending'")
            .bind(task_id)
            .fetch_one(pool)
            .await?;
    assert_eq!(pending, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_decisions_resolve_once() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, admin, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;
    let request = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None).await?;

    let (approve, reject) = tokio::join!(
        workflow::decide(pool, &audit, &creator, request.id, Verdict::Approved, None),
        workflow::decide(pool, &audit, &admin, request.id, Verdict::Rejected, None),
    );
    assert_eq!([approve.is_ok(), reject.is_ok()].iter().filter(|ok| **ok).count(), 1);

    let (status, _) = task_status(pool, task_id).await?;
    match (approve, reject) {
        (Ok(decided), Err(_)) => {
            assert_eq!(decided.request.decision, Decision::Approved);
            assert_eq!(status, "completed");
        }
        (Err(_), Ok(decided)) => {
            assert_eq!(decided.request.decision, Decision::Rejected);
            assert_eq!(status, "pending");
        }
        other => panic!("expected exactly one decision, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn only_the_assignee_may_request_a_status() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, admin, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    for principal in [&creator, &admin] {
        let result = workflow::submit(pool, &audit, principal, task_id, TaskStatus::Completed, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))), "got {result:?}");
        let direct =
            workflow::set_task_status(pool, &audit, principal, task_id, TaskStatus::InProgress, None).await;
        assert!(matches!(direct, Err(AppError::Forbidden(_))), "got {direct:?}");
    }

    assert!(audit.entries().is_empty());
    Ok(())
}

#[tokio::test]
async fn direct_statuses_apply_immediately() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "pending").await?;

    let change = workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::InProgress, Some(" started ".into())).await?;
    match change {
        StatusChange::Applied(task) => {
            assert_eq!(task.status, TaskStatus::InProgress);
            assert_eq!(task.status_note.as_deref(), Some("started"));
        }
        other => panic!("expected an applied change, got {other:?}"),
    }

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "status_updated");
    assert_eq!(entries[0].meta["from"], "pending");
    assert_eq!(entries[0].meta["to"], "in_progress");
    Ok(())
}

#[tokio::test]
async fn closed_tasks_accept_no_status_changes() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;

    for closed in ["completed", "cancelled", "not_approved"] {
        let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, closed).await?;
        let direct = workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::InProgress, None).await;
        assert!(matches!(direct, Err(AppError::BadRequest(_))), "got {direct:?}");
        let restricted =
            workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Postponed, Some("later".into())).await;
        assert!(matches!(restricted, Err(AppError::BadRequest(_))), "got {restricted:?}");
        assert_eq!(task_status(pool, task_id).await?.0, closed);
    }
    Ok(())
}

#[tokio::test]
async fn not_approved_is_final_once_set_directly() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "in_progress").await?;

    let change = workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::NotApproved, None).await?;
    assert!(matches!(change, StatusChange::Applied(ref task) if task.status == TaskStatus::NotApproved));

    let reopened = workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::InProgress, None).await;
    assert!(matches!(reopened, Err(AppError::BadRequest(_))), "got {reopened:?}");
    assert_eq!(task_status(pool, task_id).await?, ("not_approved".to_string(), None));
    Ok(())
}

#[tokio::test]
async fn approval_does_not_reopen_a_task_closed_in_the_meantime() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, assignee, .. } = cast(pool).await?;
    let task_id = seed_task(pool, "LBD", assignee.user_id, creator.user_id, "in_progress").await?;

    let request = workflow::submit(pool, &audit, &assignee, task_id, TaskStatus::Completed, None).await?;
    workflow::set_task_status(pool, &audit, &assignee, task_id, TaskStatus::NotApproved, None).await?;

    let approved = workflow::decide(pool, &audit, &creator, request.id, Verdict::Approved, None).await;
    assert!(matches!(approved, Err(AppError::BadRequest(_))), "got {approved:?}");
    assert_eq!(task_status(pool, task_id).await?.0, "not_approved");

    // The approval rolled back, so the request can still be rejected.
    let rejected = workflow::decide(pool, &audit, &creator, request.id, Verdict::Rejected, None).await?;
    assert_eq!(rejected.request.decision, Decision::Rejected);
    assert_eq!(rejected.task.status, TaskStatus::NotApproved);
    Ok(())
}

#[tokio::test]
async fn unknown_request_is_not_found() -> Result<()> {
    let db = setup_db().await?;
    let pool = &db.pool;
    let audit = MemoryAuditSink::new();
    let Cast { creator, .. } = cast(pool).await?;

    let result = workflow::decide(pool, &audit, &creator, Uuid::new_v4(), Verdict::Approved, None).await;
    assert!(matches!(result, Err(AppError::NotFound(_))), "got {result:?}");
    Ok(())
}
