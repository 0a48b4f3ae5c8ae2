//! Input normalization for user records.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::store::UserUpdate;

const MAX_NAME_LEN: usize = 255;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|e| panic!("email regex: {e}"))
});

/// Body of `POST /api/admin/users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub name: String,
}

/// Body of `PUT /api/admin/users/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A validated new user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
}

/// Lowercase and check an email address.
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err("Invalid email address".to_string())
    }
}

/// Trim and bound a display name.
pub fn normalize_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err("Name is too long".to_string());
    }
    Ok(name.to_string())
}

impl CreateUserInput {
    pub fn validate(self) -> Result<NewUser, String> {
        Ok(NewUser {
            email: normalize_email(&self.email)?,
            name: normalize_name(&self.name)?,
        })
    }
}

impl UpdateUserInput {
    pub fn validate(self) -> Result<UserUpdate, String> {
        if self.email.is_none() && self.name.is_none() {
            return Err(
                "At least one field (email or name) must be provided for update".to_string(),
            );
        }
        Ok(UserUpdate {
            email: self.email.as_deref().map(normalize_email).transpose()?,
            name: self.name.as_deref().map(normalize_name).transpose()?,
        })
    }
}

/// Parse `email:Name,email:Name` seed lists. Malformed entries are skipped.
pub fn parse_seed_users(raw: &str) -> Vec<NewUser> {
    raw.split(',')
        .filter_map(|entry| {
            let (email, name) = entry.split_once(':')?;
            match (normalize_email(email), normalize_name(name)) {
                (Ok(email), Ok(name)) => Some(NewUser { email, name }),
                _ => {
                    tracing::warn!(entry = %entry.trim(), "Skipping malformed seed user");
                    None
                }
            }
        })
        .collect()
}
