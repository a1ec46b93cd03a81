// Reference data managed by admins: tahun ajaran, mapel, kelas, jenis ujian, pengumuman.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_NAMA_LEN: usize = 100;
const MAX_ISI_LEN: usize = 20_000;

/// Tables an admin can edit through `/admin/{tabel}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    TahunAjaran,
    Mapel,
    Kelas,
    JenisUjian,
    Pengumuman,
}

impl ReferenceTable {
    pub const ALL: [ReferenceTable; 5] = [
        ReferenceTable::TahunAjaran,
        ReferenceTable::Mapel,
        ReferenceTable::Kelas,
        ReferenceTable::JenisUjian,
        ReferenceTable::Pengumuman,
    ];

    /// URL segment, e.g. `tahun-ajaran`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.slug() == slug)
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ReferenceTable::TahunAjaran => "tahun-ajaran",
            ReferenceTable::Mapel => "mapel",
            ReferenceTable::Kelas => "kelas",
            ReferenceTable::JenisUjian => "jenis-ujian",
            ReferenceTable::Pengumuman => "pengumuman",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::TahunAjaran => "tahun_ajaran",
            ReferenceTable::Mapel => "mapel",
            ReferenceTable::Kelas => "kelas",
            ReferenceTable::JenisUjian => "jenis_ujian",
            ReferenceTable::Pengumuman => "pengumuman",
        }
    }

    /// PostgREST `order` clause for list screens.
    pub fn order(&self) -> &'static str {
        match self {
            ReferenceTable::TahunAjaran => "nama.desc",
            ReferenceTable::Pengumuman => "created_at.desc",
            _ => "nama.asc",
        }
    }

    /// Check a raw JSON body against the table's input shape and return the
    /// normalized row to send to the relational store.
    pub fn validate_payload(&self, body: Value) -> Result<Value, String> {
        let row = match self {
            ReferenceTable::TahunAjaran => {
                let input: TahunAjaranInput = parse(body)?;
                serde_json::to_value(input.validate()?)
            }
            ReferenceTable::Mapel => {
                let input: MapelInput = parse(body)?;
                serde_json::to_value(input.validate()?)
            }
            ReferenceTable::Kelas => {
                let input: KelasInput = parse(body)?;
                serde_json::to_value(input.validate()?)
            }
            ReferenceTable::JenisUjian => {
                let input: JenisUjianInput = parse(body)?;
                serde_json::to_value(input.validate()?)
            }
            ReferenceTable::Pengumuman => {
                let input: PengumumanInput = parse(body)?;
                serde_json::to_value(input.validate()?)
            }
        };
        row.map_err(|e| format!("failed to encode row: {}", e))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T, String> {
    serde_json::from_value(body).map_err(|e| format!("Invalid body: {}", e))
}

fn required_nama(nama: &str, label: &str) -> Result<String, String> {
    let nama = nama.trim();
    if nama.is_empty() {
        return Err(format!("{} is required", label));
    }
    if nama.chars().count() > MAX_NAMA_LEN {
        return Err(format!("{} must be at most {} characters", label, MAX_NAMA_LEN));
    }
    Ok(nama.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TahunAjaranInput {
    pub nama: String,
    #[serde(default)]
    pub is_active: bool,
}

impl TahunAjaranInput {
    /// `nama` must look like `2024/2025`, second year following the first.
    pub fn validate(self) -> Result<Self, String> {
        let nama = required_nama(&self.nama, "Tahun ajaran")?;
        let re = Regex::new(r"^(\d{4})/(\d{4})$").map_err(|e| e.to_string())?;
        let caps = re
            .captures(&nama)
            .ok_or_else(|| "Tahun ajaran must use the format YYYY/YYYY".to_string())?;
        let start: u32 = caps[1].parse().map_err(|_| "Invalid start year".to_string())?;
        let end: u32 = caps[2].parse().map_err(|_| "Invalid end year".to_string())?;
        if end != start + 1 {
            return Err("Tahun ajaran must span two consecutive years".to_string());
        }
        Ok(Self { nama, is_active: self.is_active })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MapelInput {
    pub nama: String,
    #[serde(default)]
    pub kode: Option<String>,
}

impl MapelInput {
    pub fn validate(self) -> Result<Self, String> {
        Ok(Self {
            nama: required_nama(&self.nama, "Nama mapel")?,
            kode: optional_text(self.kode).map(|k| k.to_uppercase()),
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KelasInput {
    pub nama: String,
    #[serde(default)]
    pub tingkat: Option<String>,
}

impl KelasInput {
    pub fn validate(self) -> Result<Self, String> {
        Ok(Self {
            nama: required_nama(&self.nama, "Nama kelas")?,
            tingkat: optional_text(self.tingkat),
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JenisUjianInput {
    pub nama: String,
}

impl JenisUjianInput {
    pub fn validate(self) -> Result<Self, String> {
        Ok(Self { nama: required_nama(&self.nama, "Jenis ujian")? })
    }
}

/// Announcement. `isi` is rich text (HTML from the editor) and is stored as-is.
/// The author column is set by the server on insert, never taken from the body.
#[derive(Debug, Deserialize, Serialize)]
pub struct PengumumanInput {
    pub judul: String,
    pub isi: String,
}

impl PengumumanInput {
    pub fn validate(self) -> Result<Self, String> {
        let judul = required_nama(&self.judul, "Judul")?;
        if self.isi.trim().is_empty() {
            return Err("Isi pengumuman is required".to_string());
        }
        if self.isi.chars().count() > MAX_ISI_LEN {
            return Err(format!("Isi pengumuman must be at most {} characters", MAX_ISI_LEN));
        }
        Ok(Self { judul, isi: self.isi })
    }
}
