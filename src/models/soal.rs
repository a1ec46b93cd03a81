use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of `soal_uploads`: one exam file uploaded by a teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoalUpload {
    pub id: Uuid,
    pub guru_id: Uuid,
    pub judul: String,
    pub tahun_ajaran_id: Option<Uuid>,
    pub mapel_id: Option<Uuid>,
    pub kelas_id: Option<Uuid>,
    pub jenis_ujian_id: Option<Uuid>,
    pub file_path: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Row to insert once the blob is stored.
#[derive(Debug, Clone, Serialize)]
pub struct NewSoalUpload {
    pub guru_id: Uuid,
    pub judul: String,
    pub tahun_ajaran_id: Option<Uuid>,
    pub mapel_id: Option<Uuid>,
    pub kelas_id: Option<Uuid>,
    pub jenis_ujian_id: Option<Uuid>,
    pub file_path: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
}
