use serde::Deserialize;
use uuid::Uuid;

/// Exam file upload. `file_data` is base64, optionally as a `data:` URL.
#[derive(Debug, Deserialize)]
pub struct UploadSoalRequest {
    pub judul: String,
    pub tahun_ajaran_id: Option<Uuid>,
    pub mapel_id: Option<Uuid>,
    pub kelas_id: Option<Uuid>,
    pub jenis_ujian_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: String,
    pub file_data: String,
}
