pub mod auth_dtos;
pub mod guru_dtos;
pub mod soal_dtos;
// alias so handlers can write `crate::dtos::auth`
pub use auth_dtos as auth;
