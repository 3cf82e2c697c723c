use uuid::Uuid;

use crate::models::customer::Customer;
use crate::models::project::Project;
use crate::models::task::Task;
use crate::models::user::User;

/// Entities that appear as the subject of audit entries.
pub trait Loggable {
    /// Value of `activity_logs.entity_type`.
    fn entity_type() -> &'static str;

    fn entity_id(&self) -> Uuid;
}

impl Loggable for Task {
    fn entity_type() -> &'static str {
        "task"
    }

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Loggable for Customer {
    fn entity_type() -> &'static str {
        "customer"
    }

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Loggable for Project {
    fn entity_type() -> &'static str {
        "project"
    }

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Loggable for User {
    fn entity_type() -> &'static str {
        "user"
    }

    fn entity_id(&self) -> Uuid {
        self.id
    }
}
