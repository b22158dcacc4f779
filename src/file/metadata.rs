//! File record types and repository for the catalog.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::db::DbPool;
use crate::{FileboxError, Result};

const FILE_COLUMNS: &str =
    "id, owner_id, folder_id, filename, path, size, mimetype, is_public, created_at";

/// Metadata for a stored file.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileMetadata {
    /// Unique file ID.
    pub id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Containing folder (None for the owner's root).
    pub folder_id: Option<i64>,
    /// Original filename (display name).
    pub filename: String,
    /// Blob store key.
    pub path: String,
    /// Size in bytes, fixed at creation.
    pub size: i64,
    /// MIME type.
    pub mimetype: String,
    /// Whether anyone may read the file.
    pub is_public: bool,
    /// When the file was created.
    pub created_at: String,
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Owning user.
    pub owner_id: i64,
    /// Containing folder.
    pub folder_id: Option<i64>,
    /// Original filename.
    pub filename: String,
    /// Blob store key.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME type.
    pub mimetype: String,
}

impl NewFile {
    /// Create a new NewFile at the owner's root.
    pub fn new(
        owner_id: i64,
        filename: impl Into<String>,
        path: impl Into<String>,
        size: i64,
        mimetype: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            folder_id: None,
            filename: filename.into(),
            path: path.into(),
            size,
            mimetype: mimetype.into(),
        }
    }

    /// Place the file in a folder.
    pub fn in_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

/// Repository for file record operations.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a file record on an open connection or transaction.
    ///
    /// Returns the new file ID.
    pub async fn insert(conn: &mut SqliteConnection, file: &NewFile) -> Result<i64> {
        if file.size < 0 {
            return Err(FileboxError::Validation(
                "file size must be a non-negative integer".to_string(),
            ));
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (owner_id, folder_id, filename, path, size, mimetype)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(file.owner_id)
        .bind(file.folder_id)
        .bind(&file.filename)
        .bind(&file.path)
        .bind(file.size)
        .bind(&file.mimetype)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Delete file records by ID on an open connection or transaction.
    ///
    /// Returns the number of records removed.
    pub async fn delete_many(conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM files WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = query
            .build()
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Create a file record outside any transaction.
    pub async fn create(&self, file: &NewFile) -> Result<FileMetadata> {
        let mut conn = self
            .pool
            .acquire()
            .await?;
        let id = Self::insert(&mut conn, file).await?;
        drop(conn);

        self.get_by_id(id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("file".to_string()))
    }

    /// Get a file by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileMetadata>> {
        let file = sqlx::query_as::<_, FileMetadata>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// Get a file only if it belongs to `owner_id`.
    pub async fn get_owned(&self, owner_id: i64, id: i64) -> Result<Option<FileMetadata>> {
        let file = sqlx::query_as::<_, FileMetadata>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// List an owner's files directly in `folder_id` (None = root), newest first.
    pub async fn list_children(
        &self,
        owner_id: i64,
        folder_id: Option<i64>,
    ) -> Result<Vec<FileMetadata>> {
        let files = sqlx::query_as::<_, FileMetadata>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE owner_id = ? AND folder_id IS ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .bind(folder_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// List every file contained directly in any of the given folders, on an
    /// open connection or transaction.
    pub async fn list_in_folders(
        conn: &mut SqliteConnection,
        folder_ids: &[i64],
    ) -> Result<Vec<FileMetadata>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE folder_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in folder_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let files = query
            .build_query_as::<FileMetadata>()
            .fetch_all(conn)
            .await?;

        Ok(files)
    }

    /// List files other users have shared with `user_id`, newest grant first.
    pub async fn list_shared_with(&self, user_id: i64) -> Result<Vec<FileMetadata>> {
        let files = sqlx::query_as::<_, FileMetadata>(
            "SELECT f.id, f.owner_id, f.folder_id, f.filename, f.path, f.size, f.mimetype,
                    f.is_public, f.created_at
             FROM files f
             JOIN file_shares s ON s.file_id = f.id
             WHERE s.user_id = ?
             ORDER BY s.created_at DESC, s.id DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Set the public flag.
    pub async fn set_public(&self, id: i64, is_public: bool) -> Result<Option<FileMetadata>> {
        let result = sqlx::query("UPDATE files SET is_public = ? WHERE id = ?")
            .bind(is_public)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Sum of sizes of an owner's live files.
    pub async fn total_size_by_owner(&self, owner_id: i64) -> Result<i64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM files WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(self.pool)
                .await?;

        Ok(total)
    }
}
