//! Account registration and login DTOs
//!
//! Only the request/response shapes live here; credential handling belongs
//! to whatever account service fronts the relay.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure for an account DTO
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountValidationError {
    #[error("Field '{0}' is required")]
    MissingField(&'static str),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub is_success: bool,
    pub message: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, AccountValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AccountValidationError::MissingField(field)),
    }
}

/// Loose `local@domain.tld` shape check
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !email.chars().any(char::is_whitespace)
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        required(&self.username, "username")?;
        let email = required(&self.email, "email")?;
        required(&self.password, "password")?;

        if !looks_like_email(email) {
            return Err(AccountValidationError::InvalidEmail(email.to_string()));
        }
        Ok(())
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        required(&self.username, "username")?;
        required(&self.password, "password")?;
        Ok(())
    }
}

impl AuthResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: Some(message.into()),
        }
    }
}
