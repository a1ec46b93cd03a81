use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application role. A resolved profile carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Guru,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Guru => "guru",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "guru" => Ok(Role::Guru),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Row of the `profiles` table, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nama: String,
    pub username: String,
    pub role: Role,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Editable part of a profile. Role is deliberately absent: it never changes after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileChanges {
    pub nama: String,
    pub username: String,
}

#[cfg(test)]
impl Profile {
    pub fn sample(user_id: Uuid, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            nama: "Budi".into(),
            username: "budi".into(),
            role,
            created_at: None,
            updated_at: None,
        }
    }
}
