//! Field validation for access-request submissions

use crate::error::AccessError;
use crate::models::AccessRequest;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOGIN_LEN: usize = 39;

/// Letters (ASCII and Latin-1), spaces, apostrophes and hyphens; 2 to 100 characters
pub fn is_valid_name(name: &str) -> bool {
    let count = name.chars().count();
    (2..=100).contains(&count)
        && name.chars().all(|c| {
            c.is_ascii_alphabetic()
                || matches!(c, ' ' | '\'' | '-')
                || ('À'..='Ö').contains(&c)
                || ('Ø'..='ö').contains(&c)
                || ('ø'..='ÿ').contains(&c)
        })
}

/// One `@`, non-empty local part, dotted domain, no spaces
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.contains(' ') {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// GitHub login rules: 1 to 39 ASCII alphanumerics or single inner hyphens
pub fn is_valid_github_username(login: &str) -> bool {
    if login.is_empty() || login.len() > MAX_LOGIN_LEN {
        return false;
    }
    if login.starts_with('-') || login.ends_with('-') || login.contains("--") {
        return false;
    }
    login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Trim and validate every field
pub fn validate(request: &AccessRequest) -> Result<AccessRequest, AccessError> {
    let request = request.trimmed();

    if !is_valid_name(&request.name) {
        return Err(AccessError::Invalid("Invalid name".to_string()));
    }
    if !is_valid_name(&request.surname) {
        return Err(AccessError::Invalid("Invalid surname".to_string()));
    }
    if !is_valid_email(&request.email) {
        return Err(AccessError::Invalid("Invalid email address".to_string()));
    }
    if !is_valid_github_username(&request.github_username) {
        return Err(AccessError::Invalid("Invalid GitHub username".to_string()));
    }

    Ok(request)
}
