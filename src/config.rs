use std::collections::BTreeSet;

use crate::authz::Department;
use crate::errors::AppError;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DEPARTMENTS: [&str; 6] = ["LBD", "LBA", "CR", "LM", "DS", "SN"];

/// Runtime settings read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub departments: BTreeSet<Department>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let departments = match std::env::var("DEPARTMENTS") {
            Ok(raw) => parse_departments(&raw)?,
            Err(_) => default_departments(),
        };

        Ok(Self { port, departments })
    }

    pub fn is_known_department(&self, department: &Department) -> bool {
        self.departments.contains(department)
    }

    /// Rejects department codes that are not configured.
    pub fn ensure_known_department(&self, department: &Department) -> Result<(), AppError> {
        if self.is_known_department(department) {
            Ok(())
        } else {
            Err(AppError::bad_request(format!("unknown department: {}", department)))
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            departments: default_departments(),
        }
    }
}

fn default_departments() -> BTreeSet<Department> {
    DEFAULT_DEPARTMENTS.iter().map(|code| Department::new(*code)).collect()
}

fn parse_departments(raw: &str) -> Result<BTreeSet<Department>, AppError> {
    let departments: BTreeSet<Department> = raw
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(Department::new)
        .collect();

    if departments.is_empty() {
        return Err(AppError::configuration("DEPARTMENTS must list at least one department code"));
    }

    Ok(departments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_department_list() {
        let parsed = parse_departments(" lbd, CR ,,sn").unwrap();
        let codes: Vec<&str> = parsed.iter().map(Department::as_str).collect();
        assert_eq!(codes, vec!["CR", "LBD", "SN"]);
    }

    #[test]
    fn empty_department_list_is_a_configuration_error() {
        assert!(matches!(parse_departments(" , "), Err(AppError::Configuration(_))));
    }

    #[test]
    fn default_config_knows_the_six_departments() {
        let config = AppConfig::default();
        assert_eq!(config.departments.len(), 6);
        assert!(config.is_known_department(&Department::new("DS")));
        assert!(config.ensure_known_department(&Department::new("XX")).is_err());
    }
}
