//! User repository for filebox.

use super::user::{NewUser, User};
use super::DbPool;
use crate::{FileboxError, Result};

const USER_COLUMNS: &str = "id, email, name, storage_used, storage_limit, created_at";

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// Fails with a validation error when the email is already registered.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        new_user.validate()?;

        if self.email_exists(&new_user.email).await? {
            return Err(FileboxError::Validation(format!(
                "email already registered: {}",
                new_user.email
            )));
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, name, storage_limit) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(new_user.storage_limit)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Check if an email is already registered (case-insensitive).
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ? COLLATE NOCASE)")
                .bind(email.trim())
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Change a user's storage limit.
    ///
    /// Lowering the limit below current usage is allowed; further uploads
    /// are refused until usage drops.
    pub async fn set_storage_limit(&self, id: i64, limit: i64) -> Result<Option<User>> {
        if limit < 0 {
            return Err(FileboxError::Validation(
                "storage limit must not be negative".to_string(),
            ));
        }

        let result = sqlx::query("UPDATE users SET storage_limit = ? WHERE id = ?")
            .bind(limit)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
