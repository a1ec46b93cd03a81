use serde::Deserialize;

/// Admin-created teacher account. Without `email` the login address is
/// derived from the username.
#[derive(Debug, Deserialize)]
pub struct CreateGuruRequest {
    pub email: Option<String>,
    pub password: String,
    pub nama: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub nama: String,
    pub username: String,
}
