// Form checks done before any network call.
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn looks_like_email(email: &str) -> bool {
    match Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$") {
        Ok(re) => re.is_match(email),
        Err(_) => false,
    }
}

/// Lowercase letters, digits, `_` and `.`, 3 to 30 characters.
pub fn valid_username(username: &str) -> bool {
    match Regex::new(r"^[a-z0-9_.]{3,30}$") {
        Ok(re) => re.is_match(username),
        Err(_) => false,
    }
}

/// Login accepts either an e-mail or a bare username; usernames map to an
/// address under the configured domain.
pub fn login_email(email_or_username: &str, username_domain: &str) -> Option<String> {
    let input = email_or_username.trim().to_lowercase();
    if input.is_empty() {
        return None;
    }
    if input.contains('@') {
        return looks_like_email(&input).then_some(input);
    }
    valid_username(&input).then(|| format!("{}@{}", input, username_domain))
}

/// Validate the fields shared by self-registration and admin-created teachers.
pub fn check_account_fields(email: &str, password: &str, nama: &str, username: &str) -> Result<(), String> {
    if !looks_like_email(email) {
        return Err("Invalid email format".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {} characters long", MIN_PASSWORD_LEN));
    }
    if nama.trim().is_empty() {
        return Err("Nama is required".to_string());
    }
    if !valid_username(username) {
        return Err("Username must be 3-30 lowercase letters, digits, '_' or '.'".to_string());
    }
    Ok(())
}
