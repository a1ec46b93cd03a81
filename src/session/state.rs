use serde::Serialize;

use crate::models::profile::Profile;
use crate::models::user::Identity;
use crate::session::gate::{derive_roles, RoleFlags};

/// Where profile resolution stands for the current identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Resolution {
    /// No identity, nothing to resolve.
    Idle,
    Pending,
    Found,
    /// No profile row yet (sign-up race); retried for a while.
    Missing,
    /// Backend unreachable or profile never provisioned.
    Failed(String),
}

/// Process-local authentication state of one browser session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub resolution: Resolution,
}

impl SessionState {
    pub fn initial() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
            resolution: Resolution::Idle,
        }
    }

    pub fn roles(&self) -> RoleFlags {
        derive_roles(self.profile.as_ref())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}
