pub mod auth;
pub mod contacts;
pub mod customers;
pub mod health;
pub mod projects;
pub mod services;
pub mod status_requests;
pub mod tasks;
pub mod users;
