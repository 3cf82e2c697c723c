use uuid::Uuid;

use super::principal::Principal;

/// Approvers snapshotted onto a new status change request: the task's creator.
pub fn required_approvers(task_created_by: Uuid) -> Vec<Uuid> {
    vec![task_created_by]
}

/// Who may decide a pending request: an admin, the task's creator, or anyone
/// listed in the request's required approvers.
pub fn may_decide(principal: &Principal, task_created_by: Uuid, required_approver_ids: &[Uuid]) -> bool {
    let allowed = principal.is_admin()
        || principal.user_id == task_created_by
        || required_approver_ids.contains(&principal.user_id);

    tracing::debug!(
        user_id = %principal.user_id,
        role = %principal.kind(),
        allowed,
        "approval authority check"
    );
    allowed
}
