//! User model for filebox.
//!
//! A user is an identity plus its storage ledger: bytes consumed and bytes
//! allowed. Authentication lives outside this crate.

use serde::Serialize;
use validator::ValidateEmail;

use crate::{FileboxError, Result};

/// Storage limit for users created without an explicit one (1 GiB).
pub const DEFAULT_STORAGE_LIMIT: i64 = 1024 * 1024 * 1024;

/// Maximum length for a display name (in characters).
pub const MAX_NAME_LENGTH: usize = 100;

/// User entity.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Email address (unique, case-insensitive).
    pub email: String,
    /// Display name.
    pub name: String,
    /// Bytes consumed by live files.
    pub storage_used: i64,
    /// Bytes allowed.
    pub storage_limit: i64,
    /// Account creation timestamp.
    pub created_at: String,
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Storage limit in bytes.
    pub storage_limit: i64,
}

impl NewUser {
    /// Create a new user with the default storage limit.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            storage_limit: DEFAULT_STORAGE_LIMIT,
        }
    }

    /// Set the storage limit.
    pub fn with_storage_limit(mut self, limit: i64) -> Self {
        self.storage_limit = limit;
        self
    }

    /// Check the fields before insertion.
    pub fn validate(&self) -> Result<()> {
        if !self.email.validate_email() {
            return Err(FileboxError::Validation(format!(
                "invalid email address: {}",
                self.email
            )));
        }
        if self.name.trim().is_empty() {
            return Err(FileboxError::Validation("name is required".to_string()));
        }
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(FileboxError::Validation(format!(
                "name must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        if self.storage_limit < 0 {
            return Err(FileboxError::Validation(
                "storage limit must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
