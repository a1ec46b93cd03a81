use serde::{Deserialize, Serialize};

use crate::models::profile::Profile;
use crate::models::user::Identity;
use crate::session::gate::{menu_for, MenuItem, RoleFlags};
use crate::session::state::{Resolution, SessionState};

#[derive(Deserialize)]
pub struct SignupIn {
    pub email: String,
    pub password: String,
    pub nama: String,
    pub username: String,
}

#[derive(Deserialize)]
pub struct LoginIn {
    /// E-mail address or bare username.
    #[serde(alias = "email", alias = "username")]
    pub login: String,
    pub password: String,
}

/// `?screen=/admin/kelas`: the protected screen a client has open.
#[derive(Deserialize)]
pub struct ScreenQuery {
    pub screen: String,
}

/// What the client needs to render its shell after any auth call.
#[derive(Serialize)]
pub struct SessionOut {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub roles: RoleFlags,
    pub menu: Vec<MenuItem>,
    pub resolution: Resolution,
}

impl From<&SessionState> for SessionOut {
    fn from(state: &SessionState) -> Self {
        let roles = state.roles();
        Self {
            identity: state.identity.clone(),
            profile: state.profile.clone(),
            roles,
            menu: menu_for(roles),
            resolution: state.resolution.clone(),
        }
    }
}
