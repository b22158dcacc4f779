//! Folder types and repository for the catalog.

use std::collections::VecDeque;

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::{FileboxError, Result};

const FOLDER_COLUMNS: &str = "id, owner_id, parent_id, name, created_at";

/// A folder in a user's hierarchy.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Folder {
    /// Unique folder ID.
    pub id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Parent folder ID (None for root-level folders).
    pub parent_id: Option<i64>,
    /// Folder name. Siblings may share a name.
    pub name: String,
    /// When the folder was created.
    pub created_at: String,
}

/// Data for creating a new folder.
#[derive(Debug, Clone)]
pub struct NewFolder {
    /// Owning user.
    pub owner_id: i64,
    /// Folder name.
    pub name: String,
    /// Parent folder ID (None for root-level folders).
    pub parent_id: Option<i64>,
}

impl NewFolder {
    /// Create a root-level folder for the given owner.
    pub fn new(owner_id: i64, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            parent_id: None,
        }
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Repository for folder operations.
pub struct FolderRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FolderRepository<'a> {
    /// Create a new FolderRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new folder.
    pub async fn create(&self, folder: &NewFolder) -> Result<Folder> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO folders (owner_id, parent_id, name) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(folder.owner_id)
        .bind(folder.parent_id)
        .bind(&folder.name)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("folder".to_string()))
    }

    /// Get a folder by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(folder)
    }

    /// Get a folder only if it belongs to `owner_id`.
    pub async fn get_owned(&self, owner_id: i64, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(folder)
    }

    /// List an owner's folders directly under `parent_id` (None = root),
    /// newest first.
    pub async fn list_children(&self, owner_id: i64, parent_id: Option<i64>) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders
             WHERE owner_id = ? AND parent_id IS ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(folders)
    }

    /// Confirm `owner_id` owns folder `id` with a no-op write.
    ///
    /// Run first in a transaction, this takes SQLite's write lock, so no
    /// other connection can add to the folder until the transaction ends.
    pub async fn lock_owned(conn: &mut SqliteConnection, owner_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE folders SET name = name WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Collect `root_id` and every folder nested below it, breadth-first.
    pub async fn collect_subtree(conn: &mut SqliteConnection, root_id: i64) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let mut queue = VecDeque::from([root_id]);

        while let Some(id) = queue.pop_front() {
            ids.push(id);
            let children: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM folders WHERE parent_id = ? ORDER BY id")
                    .bind(id)
                    .fetch_all(&mut *conn)
                    .await?;
            queue.extend(children);
        }

        Ok(ids)
    }

    /// Delete folders in the given order. Children must come before parents.
    ///
    /// Returns the number of folders removed.
    pub async fn delete_in_order(conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM folders WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            removed += result.rows_affected();
        }

        Ok(removed)
    }

    /// Rename a folder.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Option<Folder>> {
        let result = sqlx::query("UPDATE folders SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Get the path from root to a folder.
    pub async fn get_path(&self, id: i64) -> Result<Vec<Folder>> {
        let mut path = Vec::new();
        let mut current_id = Some(id);

        while let Some(folder_id) = current_id {
            match self.get_by_id(folder_id).await? {
                Some(folder) => {
                    current_id = folder.parent_id;
                    path.push(folder);
                }
                None => break,
            }
        }

        path.reverse();
        Ok(path)
    }
}
