// src/services/upload_service.rs - exam file checks, blob upload and row bookkeeping
use base64::{engine::general_purpose, Engine as _};
use log::{info, warn};
use mime::Mime;
use thiserror::Error;
use uuid::Uuid;

use crate::dtos::soal_dtos::UploadSoalRequest;
use crate::models::soal::{NewSoalUpload, SoalUpload};
use crate::repositories::soal_repository::SoalRepository;
use crate::repositories::storage_repository::StorageRepository;
use crate::repositories::supabase_rest::RepoError;

const ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "image/jpeg",
    "image/png",
];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("file is empty")]
    Empty,
    #[error("invalid base64 file data")]
    InvalidData,
    #[error("storage error: {0}")]
    Storage(RepoError),
    #[error("database error: {0}")]
    Persistence(RepoError),
}

/// A file that passed every local check and is ready to send.
#[derive(Debug)]
pub struct PreparedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

/// Keep letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() { "file".to_string() } else { cleaned }
}

/// `<guru id>/<unix millis>_<file name>`; the prefix keeps each teacher's files apart.
pub fn object_path(guru_id: Uuid, file_name: &str, now_millis: i64) -> String {
    format!("{}/{}_{}", guru_id, now_millis, file_name)
}

/// Validate and decode an upload without touching the network.
pub fn prepare_file(req: &UploadSoalRequest, max_bytes: usize) -> Result<PreparedFile, UploadError> {
    let mime: Mime = req
        .content_type
        .trim()
        .parse()
        .map_err(|_| UploadError::UnsupportedType(req.content_type.clone()))?;
    let essence = mime.essence_str().to_string();
    if !ALLOWED_TYPES.contains(&essence.as_str()) {
        return Err(UploadError::UnsupportedType(essence));
    }

    // Rough pre-check on the encoded length before decoding anything big.
    let encoded = match req.file_data.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => req.file_data.as_str(),
    };
    if encoded.len() / 4 * 3 > max_bytes + 3 {
        return Err(UploadError::TooLarge { size: encoded.len() / 4 * 3, max: max_bytes });
    }

    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| UploadError::InvalidData)?;
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge { size: bytes.len(), max: max_bytes });
    }

    Ok(PreparedFile {
        bytes,
        content_type: essence,
        file_name: sanitize_file_name(&req.file_name),
    })
}

/// Upload the blob, then insert the row. A failed insert removes the blob
/// again so no orphan file stays behind.
pub async fn store_soal(
    storage: &StorageRepository,
    soal: &SoalRepository,
    token: &str,
    guru_id: Uuid,
    req: &UploadSoalRequest,
    file: PreparedFile,
) -> Result<SoalUpload, UploadError> {
    let path = object_path(guru_id, &file.file_name, chrono::Utc::now().timestamp_millis());
    let file_size = file.bytes.len() as i64;

    storage
        .upload(token, &path, file.bytes, &file.content_type)
        .await
        .map_err(UploadError::Storage)?;

    let row = NewSoalUpload {
        guru_id,
        judul: req.judul.trim().to_string(),
        tahun_ajaran_id: req.tahun_ajaran_id,
        mapel_id: req.mapel_id,
        kelas_id: req.kelas_id,
        jenis_ujian_id: req.jenis_ujian_id,
        file_url: storage.public_url(&path),
        file_path: path.clone(),
        file_name: file.file_name,
        file_size,
    };

    match soal.insert(token, &row).await {
        Ok(saved) => {
            info!("guru {} uploaded soal {} ({} bytes)", guru_id, saved.id, file_size);
            Ok(saved)
        }
        Err(e) => {
            if let Err(cleanup) = storage.remove(token, &path).await {
                warn!("failed to remove orphan blob {}: {}", path, cleanup);
            }
            Err(UploadError::Persistence(e))
        }
    }
}

/// Delete the row first (row-level security decides ownership), then the blob.
pub async fn delete_soal(
    storage: &StorageRepository,
    soal: &SoalRepository,
    token: &str,
    id: Uuid,
) -> Result<SoalUpload, UploadError> {
    let deleted = soal.delete(token, id).await.map_err(UploadError::Persistence)?;
    if let Err(e) = storage.remove(token, &deleted.file_path).await {
        warn!("soal {} deleted but blob {} remains: {}", id, deleted.file_path, e);
    }
    Ok(deleted)
}
