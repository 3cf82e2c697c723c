use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

use super::parse_uuid_list;
use super::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pending => "pending",
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

impl FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Decision::Pending),
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(AppError::bad_request(format!("unknown decision: {other}"))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A final decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl From<Verdict> for Decision {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Approved => Decision::Approved,
            Verdict::Rejected => Decision::Rejected,
        }
    }
}

/// A request to move a task into a restricted status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeRequest {
    pub id: Uuid,
    pub task_id: Uuid,
    pub requested_status: TaskStatus,
    pub note: Option<String>,
    pub requested_by: Uuid,
    /// Snapshot taken at submission; later changes to the task do not alter it.
    pub required_approver_ids: Vec<Uuid>,
    pub decision: Decision,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusChangeRequest {
    pub fn is_pending(&self) -> bool {
        self.decision == Decision::Pending
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbStatusChangeRequest {
    pub id: Uuid,
    pub task_id: Uuid,
    pub requested_status: String,
    pub note: Option<String>,
    pub requested_by: Uuid,
    pub required_approver_ids: String,
    pub decision: String,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbStatusChangeRequest> for StatusChangeRequest {
    type Error = AppError;

    fn try_from(value: DbStatusChangeRequest) -> Result<Self, Self::Error> {
        let requested_status = value
            .requested_status
            .parse()
            .map_err(|_| AppError::internal(format!("stored requested status is invalid: {}", value.requested_status)))?;
        let decision = value
            .decision
            .parse()
            .map_err(|_| AppError::internal(format!("stored decision is invalid: {}", value.decision)))?;

        Ok(StatusChangeRequest {
            id: value.id,
            task_id: value.task_id,
            requested_status,
            note: value.note,
            requested_by: value.requested_by,
            required_approver_ids: parse_uuid_list(&value.required_approver_ids)?,
            decision,
            decided_by: value.decided_by,
            decided_at: value.decided_at,
            decision_note: value.decision_note,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DecisionRequest {
    pub decision: Verdict,
    pub decision_note: Option<String>,
}

/// Outcome of `PATCH /tasks/{id}/status`: the task was updated directly, or a
/// request now awaits approval.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusChangeResponse {
    #[schema(example = "applied")]
    pub outcome: String,
    pub task: Option<Task>,
    pub request: Option<StatusChangeRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DecisionResponse {
    pub request: StatusChangeRequest,
    pub task: Task,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_rejects_pending_on_the_wire() {
        assert!(serde_json::from_str::<Verdict>("\"pending\"").is_err());
        let verdict: Verdict = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(Decision::from(verdict), Decision::Approved);
    }

    #[test]
    fn approver_snapshot_is_parsed_from_json() {
        let approver = Uuid::new_v4();
        let row = DbStatusChangeRequest {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            requested_status: "postponed".into(),
            note: Some("wait".into()),
            requested_by: Uuid::new_v4(),
            required_approver_ids: serde_json::to_string(&vec![approver]).unwrap(),
            decision: "pending".into(),
            decided_by: None,
            decided_at: None,
            decision_note: None,
            created_at: Utc::now(),
        };

        let request = StatusChangeRequest::try_from(row).unwrap();
        assert!(request.is_pending());
        assert_eq!(request.requested_status, TaskStatus::Postponed);
        assert_eq!(request.required_approver_ids, vec![approver]);
    }
}
