pub mod admin_services;
pub mod auth_services;
pub mod identity_provider;
pub mod upload_service;
pub mod validation;
