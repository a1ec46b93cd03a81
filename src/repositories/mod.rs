pub mod profile_supabase_repo;
pub mod reference_repository;
pub mod soal_repository;
pub mod storage_repository;
pub mod supabase_rest;
