use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

/// Lifecycle status of a task. `completed`, `cancelled` and `postponed` can
/// only be reached through an approved status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
    NotApproved,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
        TaskStatus::Postponed,
        TaskStatus::NotApproved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Postponed => "postponed",
            TaskStatus::NotApproved => "not_approved",
        }
    }

    /// Requires approval by someone other than the assignee.
    pub fn is_restricted(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Postponed)
    }

    /// No further status changes are accepted once a task is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::NotApproved)
    }

    pub fn requires_note(&self) -> bool {
        matches!(self, TaskStatus::Postponed)
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| AppError::bad_request(format!("unknown task status: {s}")))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "2025-10-01")]
    pub task_date: Option<NaiveDate>,
    pub department: Department,
    pub assigned_to: Uuid,
    pub created_by: Uuid,
    pub customer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub status: TaskStatus,
    pub status_note: Option<String>,
    /// Set while a status change request for this task awaits a decision.
    pub pending_request_id: Option<Uuid>,
    pub pending_requested_status: Option<TaskStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub task_date: Option<NaiveDate>,
    pub department: String,
    pub assigned_to: Uuid,
    pub created_by: Uuid,
    pub customer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub status: String,
    pub status_note: Option<String>,
    pub pending_request_id: Option<Uuid>,
    pub pending_requested_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        let status = value
            .status
            .parse()
            .map_err(|_| AppError::internal(format!("stored task status is invalid: {}", value.status)))?;
        let pending_requested_status = value
            .pending_requested_status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()
            .map_err(|_| AppError::internal("stored requested status is invalid"))?;

        Ok(Task {
            id: value.id,
            title: value.title,
            description: value.description,
            task_date: value.task_date,
            department: Department::new(value.department),
            assigned_to: value.assigned_to,
            created_by: value.created_by,
            customer_id: value.customer_id,
            project_id: value.project_id,
            status,
            status_note: value.status_note,
            pending_request_id: value.pending_request_id,
            pending_requested_status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct TaskCreateRequest {
    #[schema(example = "Call back about the renewal quote")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "2025-10-01")]
    pub task_date: Option<NaiveDate>,
    /// Defaults to the caller's home department.
    pub department: Option<Department>,
    /// Defaults to the caller.
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TaskStatusUpdateRequest {
    pub status: TaskStatus,
    #[schema(example = "Customer asked to wait until next quarter")]
    pub note: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_and_closed_sets() {
        let restricted: Vec<_> = TaskStatus::ALL.into_iter().filter(TaskStatus::is_restricted).collect();
        assert_eq!(restricted, vec![TaskStatus::Completed, TaskStatus::Cancelled, TaskStatus::Postponed]);

        assert!(TaskStatus::Completed.is_closed());
        assert!(TaskStatus::Cancelled.is_closed());
        assert!(TaskStatus::NotApproved.is_closed());
        assert!(!TaskStatus::InProgress.is_closed());
        assert!(!TaskStatus::Postponed.is_closed());
        assert!(TaskStatus::Postponed.requires_note());
    }

    #[test]
    fn status_text_matches_wire_format() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn done_is_not_a_status() {
        assert!(matches!("done".parse::<TaskStatus>(), Err(AppError::BadRequest(_))));
        assert!(serde_json::from_str::<TaskStatus>("\"done\"").is_err());
    }
}
