// Accounts: registration, login and password digests

use crate::db::format_timestamp;
use crate::entities::user::{self, Role, User};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 127;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Fresh random salt for a password digest
pub fn new_salt() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Hex SHA-256 of `salt:password`
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Invalid email address"))
    }
}

pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();
    if (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )))
    }
}

/// Create a customer account. Self-registration never grants staff or admin.
pub fn register(conn: &Connection, creds: &Credentials, now: DateTime<Utc>) -> AppResult<User> {
    let email = creds.email.trim();
    validate_email(email)?;
    validate_password(&creds.password)?;

    create_user(conn, email, &creds.password, Role::Customer, now)
}

/// Insert a user of any role with a freshly salted digest
pub fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    role: Role,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let salt = new_salt();
    let hash = hash_password(password, &salt);
    let created_at = format_timestamp(now);

    let user_id = user::insert_user(conn, email, &hash, &salt, role, &created_at)?;
    tracing::info!(user_id, role = %role, "user created");

    Ok(User {
        user_id,
        email: email.to_string(),
        role,
        created_at,
    })
}

/// Check an email/password pair. Unknown email and wrong password look the same.
pub fn login(conn: &Connection, creds: &Credentials) -> AppResult<User> {
    let stored = user::find_credentials(conn, creds.email.trim())?;

    match stored {
        Some(s) if verify_password(&creds.password, &s.password_salt, &s.password_hash) => Ok(s.user),
        _ => Err(AppError::unauthenticated("Invalid credentials")),
    }
}
