//! Sharing grants and access decisions.
//!
//! A file is readable by its owner, by anyone when it is public, and by any
//! user holding a grant. Only the owner and `edit` grantees may edit; the
//! public flag never confers edit rights.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::metadata::FileMetadata;
use crate::db::DbPool;
use crate::{FileboxError, Result};

/// Permission conferred by a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// May read the file.
    #[default]
    Read,
    /// May read and edit the file.
    Edit,
}

impl Permission {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Edit => "edit",
        }
    }

    /// Parse a caller-supplied permission, falling back to `Read` when it is
    /// missing or unrecognized.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for a permission string that is neither `read` nor `edit`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "edit" => Ok(Permission::Edit),
            _ => Err(UnknownPermission(s.to_string())),
        }
    }
}

impl TryFrom<String> for Permission {
    type Error = UnknownPermission;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// One entry of a file's share list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SharedEntry {
    /// Shared file.
    pub file_id: i64,
    /// Grantee.
    pub user_id: i64,
    /// Grantee email, for display.
    pub email: String,
    /// Conferred permission.
    #[sqlx(try_from = "String")]
    pub permission: Permission,
}

/// Whether `requester` may read `file`.
///
/// `requester` is `None` for anonymous callers, who can only read public files.
pub fn can_read(requester: Option<i64>, file: &FileMetadata, shared_with: &[SharedEntry]) -> bool {
    if file.is_public {
        return true;
    }
    let Some(user_id) = requester else {
        return false;
    };
    file.owner_id == user_id || shared_with.iter().any(|entry| entry.user_id == user_id)
}

/// Whether `requester` may edit `file`.
pub fn can_edit(requester: Option<i64>, file: &FileMetadata, shared_with: &[SharedEntry]) -> bool {
    let Some(user_id) = requester else {
        return false;
    };
    file.owner_id == user_id
        || shared_with
            .iter()
            .any(|entry| entry.user_id == user_id && entry.permission == Permission::Edit)
}

/// Repository for sharing grants.
pub struct ShareRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ShareRepository<'a> {
    /// Create a new ShareRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Grant `permission` on a file, replacing any existing grant for the user.
    ///
    /// The insert-or-update is a single statement, so repeated or concurrent
    /// grants never produce a second entry for the same user.
    pub async fn upsert(
        &self,
        file_id: i64,
        user_id: i64,
        permission: Permission,
    ) -> Result<SharedEntry> {
        sqlx::query(
            "INSERT INTO file_shares (file_id, user_id, permission) VALUES (?, ?, ?)
             ON CONFLICT(file_id, user_id) DO UPDATE SET permission = excluded.permission",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(permission.as_str())
        .execute(self.pool)
        .await?;

        self.get(file_id, user_id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("share".to_string()))
    }

    /// Get a single grant.
    pub async fn get(&self, file_id: i64, user_id: i64) -> Result<Option<SharedEntry>> {
        let entry = sqlx::query_as::<_, SharedEntry>(
            "SELECT s.file_id, s.user_id, u.email, s.permission
             FROM file_shares s JOIN users u ON u.id = s.user_id
             WHERE s.file_id = ? AND s.user_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(entry)
    }

    /// List the grants on a file in the order they were first made.
    pub async fn list_for_file(&self, file_id: i64) -> Result<Vec<SharedEntry>> {
        let entries = sqlx::query_as::<_, SharedEntry>(
            "SELECT s.file_id, s.user_id, u.email, s.permission
             FROM file_shares s JOIN users u ON u.id = s.user_id
             WHERE s.file_id = ?
             ORDER BY s.id",
        )
        .bind(file_id)
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }

    /// Remove a grant. Returns `false` if there was none.
    pub async fn remove(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_shares WHERE file_id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
