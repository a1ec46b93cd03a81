pub mod profile;
pub mod reference;
pub mod soal;
pub mod user;
