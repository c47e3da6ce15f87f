pub mod auth_service;
pub mod health_service;
