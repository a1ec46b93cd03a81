use serde::Serialize;

use crate::models::profile::{Profile, Role};

/// Coarse role flags consumed by screens and the navigation menu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleFlags {
    pub is_admin: bool,
    pub is_guru: bool,
}

/// Both flags stay false until a profile is resolved.
pub fn derive_roles(profile: Option<&Profile>) -> RoleFlags {
    match profile.map(|p| p.role) {
        Some(Role::Admin) => RoleFlags { is_admin: true, is_guru: false },
        Some(Role::Guru) => RoleFlags { is_admin: false, is_guru: true },
        None => RoleFlags::default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: &'static str,
    pub path: &'static str,
}

const fn item(label: &'static str, path: &'static str) -> MenuItem {
    MenuItem { label, path }
}

const ADMIN_MENU: [MenuItem; 9] = [
    item("Dashboard", "/"),
    item("Tahun Ajaran", "/admin/tahun-ajaran"),
    item("Mata Pelajaran", "/admin/mapel"),
    item("Kelas", "/admin/kelas"),
    item("Jenis Ujian", "/admin/jenis-ujian"),
    item("Pengumuman", "/admin/pengumuman"),
    item("Data Guru", "/admin/guru"),
    item("Semua Soal", "/admin/soal"),
    item("Profil", "/guru/profil"),
];

const GURU_MENU: [MenuItem; 4] = [
    item("Dashboard", "/"),
    item("Soal Saya", "/guru/soal"),
    item("Pengumuman", "/guru/pengumuman"),
    item("Profil", "/guru/profil"),
];

/// Sidebar items for the given flags; empty while no role is known.
pub fn menu_for(flags: RoleFlags) -> Vec<MenuItem> {
    if flags.is_admin {
        ADMIN_MENU.to_vec()
    } else if flags.is_guru {
        GURU_MENU.to_vec()
    } else {
        Vec::new()
    }
}
