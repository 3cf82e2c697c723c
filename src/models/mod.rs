pub mod activity;
pub mod contact;
pub mod customer;
pub mod project;
pub mod service;
pub mod status_request;
pub mod task;
pub mod user;

use uuid::Uuid;

use crate::authz::Department;
use crate::errors::AppError;

/// Parses a JSON array column (e.g. `allowed_departments`) into departments.
pub(crate) fn parse_department_list(raw: Option<&str>) -> Result<Vec<Department>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(text) => {
            let codes: Vec<String> = serde_json::from_str(text)
                .map_err(|err| AppError::internal(format!("invalid department list: {err}")))?;
            Ok(codes.into_iter().map(Department::new).filter(|d| !d.is_blank()).collect())
        }
    }
}

pub(crate) fn parse_uuid_list(raw: &str) -> Result<Vec<Uuid>, AppError> {
    serde_json::from_str(raw).map_err(|err| AppError::internal(format!("invalid id list: {err}")))
}

/// Trims optional free text, mapping blank input to `None`.
pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
