use serde::Deserialize;
use uuid::Uuid;

use crate::models::soal::{NewSoalUpload, SoalUpload};
use crate::repositories::supabase_rest::{Caller, RepoError, SupabaseRest};

const SOAL_UPLOADS: &str = "soal_uploads";

/// Optional tag filters for upload lists (`?mapel_id=...&kelas_id=...`).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SoalFilter {
    pub tahun_ajaran_id: Option<Uuid>,
    pub mapel_id: Option<Uuid>,
    pub kelas_id: Option<Uuid>,
    pub jenis_ujian_id: Option<Uuid>,
}

impl SoalFilter {
    fn query(&self, guru_id: Option<Uuid>) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        let tags = [
            ("guru_id", guru_id),
            ("tahun_ajaran_id", self.tahun_ajaran_id),
            ("mapel_id", self.mapel_id),
            ("kelas_id", self.kelas_id),
            ("jenis_ujian_id", self.jenis_ujian_id),
        ];
        for (column, value) in tags {
            if let Some(v) = value {
                q.push((column, format!("eq.{}", v)));
            }
        }
        q
    }
}

#[derive(Clone)]
pub struct SoalRepository {
    rest: SupabaseRest,
}

impl SoalRepository {
    pub fn new(rest: SupabaseRest) -> Self {
        Self { rest }
    }

    pub async fn list_for_guru(
        &self,
        token: &str,
        guru_id: Uuid,
        filter: &SoalFilter,
    ) -> Result<Vec<SoalUpload>, RepoError> {
        self.rest
            .select(Caller::User(token), SOAL_UPLOADS, &filter.query(Some(guru_id)))
            .await
    }

    pub async fn list_all(&self, token: &str, filter: &SoalFilter) -> Result<Vec<SoalUpload>, RepoError> {
        self.rest
            .select(Caller::User(token), SOAL_UPLOADS, &filter.query(None))
            .await
    }

    pub async fn get(&self, token: &str, id: Uuid) -> Result<SoalUpload, RepoError> {
        let rows: Vec<SoalUpload> = self
            .rest
            .select(
                Caller::User(token),
                SOAL_UPLOADS,
                &[("id", format!("eq.{}", id)), ("select", "*".to_string())],
            )
            .await?;
        rows.into_iter().next().ok_or(RepoError::NotFound)
    }

    pub async fn insert(&self, token: &str, row: &NewSoalUpload) -> Result<SoalUpload, RepoError> {
        self.rest.insert(Caller::User(token), SOAL_UPLOADS, row).await
    }

    pub async fn delete(&self, token: &str, id: Uuid) -> Result<SoalUpload, RepoError> {
        self.rest
            .delete(Caller::User(token), SOAL_UPLOADS, ("id", id.to_string()))
            .await
    }
}
