pub mod auth_handlers;
pub mod common;
pub mod dashboard_handlers;
pub mod guru_admin_handlers;
pub mod profile_handlers;
pub mod reference_handlers;
pub mod soal_handlers;
