//! File service for filebox.
//!
//! This module ties the catalog, the quota ledger, sharing and the blob
//! store together:
//! - Upload with pre-flight and conditional quota checks
//! - Download and lookup honouring ownership, grants and public visibility
//! - Owner-only deletion, sharing and visibility changes
//!
//! Callers that cannot see a file get `NotFound`, never a hint that it
//! exists. `Forbidden` is reserved for callers who can already read the file.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, UserRepository};
use crate::{FileboxError, Result};

use super::cascade::{delete_folder_tree, CascadeReport};
use super::folder::{Folder, FolderRepository, NewFolder};
use super::metadata::{FileMetadata, FileRepository, NewFile};
use super::quota::{QuotaLedger, StorageUsage};
use super::share::{can_edit, can_read, Permission, ShareRepository, SharedEntry};
use super::storage::{run_blocking, BlobStore, FileStorage};
use super::{DEFAULT_MAX_UPLOAD_SIZE, MAX_FILENAME_LENGTH, MAX_FOLDER_DEPTH, MAX_FOLDER_NAME_LENGTH};

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Destination folder (None for the root).
    pub folder_id: Option<i64>,
    /// Original filename.
    pub filename: String,
    /// MIME type; guessed from the filename when absent.
    pub mimetype: Option<String>,
    /// Length announced by the transport, used for the pre-flight check.
    pub declared_size: Option<i64>,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Create a new upload request targeting the root.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            folder_id: None,
            filename: filename.into(),
            mimetype: None,
            declared_size: None,
            content,
        }
    }

    /// Set the destination folder.
    pub fn in_folder(mut self, folder_id: i64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    /// Set the MIME type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Set the declared content length.
    pub fn with_declared_size(mut self, size: i64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

/// A blob already committed to the store, to be recorded in the catalog.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    /// Blob store key.
    pub key: String,
    /// Original filename.
    pub filename: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME type.
    pub mimetype: String,
}

/// Result of a file download.
#[derive(Debug)]
pub struct DownloadResult {
    /// File metadata.
    pub metadata: FileMetadata,
    /// File content.
    pub content: Vec<u8>,
}

/// Contents of one folder level.
#[derive(Debug, Clone, Serialize)]
pub struct FolderListing {
    /// Files, newest first.
    pub files: Vec<FileMetadata>,
    /// Sub-folders, newest first.
    pub folders: Vec<Folder>,
}

/// What a caller may do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileAccess {
    /// Caller may read.
    pub can_read: bool,
    /// Caller may edit.
    pub can_edit: bool,
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(FileboxError::Validation("filename is required".to_string()));
    }
    if filename.chars().count() > MAX_FILENAME_LENGTH {
        return Err(FileboxError::Validation(format!(
            "filename must be at most {MAX_FILENAME_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_folder_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FileboxError::Validation("folder name is required".to_string()));
    }
    if name.chars().count() > MAX_FOLDER_NAME_LENGTH {
        return Err(FileboxError::Validation(format!(
            "folder name must be at most {MAX_FOLDER_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

/// File service for managing uploads, downloads, folders and sharing.
///
/// Blob store calls run on the blocking thread pool.
pub struct FileService<'a> {
    db: &'a Database,
    blobs: Arc<dyn BlobStore>,
    max_upload_size: i64,
}

impl<'a> FileService<'a> {
    /// Create a new FileService.
    pub fn new(db: &'a Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    /// Create a new FileService with a custom max upload size.
    pub fn with_max_upload_size(mut self, max_size: i64) -> Self {
        self.max_upload_size = max_size;
        self
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// List files and folders directly under `folder_id` (None = root).
    ///
    /// Only the owner's entries are returned, newest first.
    pub async fn list_children(
        &self,
        owner_id: i64,
        folder_id: Option<i64>,
    ) -> Result<FolderListing> {
        if let Some(id) = folder_id {
            self.owned_folder(owner_id, id).await?;
        }

        let files = FileRepository::new(self.db.pool())
            .list_children(owner_id, folder_id)
            .await?;
        let folders = FolderRepository::new(self.db.pool())
            .list_children(owner_id, folder_id)
            .await?;

        Ok(FolderListing { files, folders })
    }

    /// Create a folder under `parent_id` (None = root).
    pub async fn create_folder(
        &self,
        owner_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<Folder> {
        let name = validate_folder_name(name)?;
        let repo = FolderRepository::new(self.db.pool());

        let mut new_folder = NewFolder::new(owner_id, name);
        if let Some(parent) = parent_id {
            self.owned_folder(owner_id, parent).await?;
            if repo.get_path(parent).await?.len() >= MAX_FOLDER_DEPTH {
                return Err(FileboxError::Validation(format!(
                    "folders can be nested at most {MAX_FOLDER_DEPTH} levels deep"
                )));
            }
            new_folder = new_folder.with_parent(parent);
        }

        let folder = repo.create(&new_folder).await?;
        debug!(owner_id, folder_id = folder.id, "Folder created");
        Ok(folder)
    }

    /// Rename a folder.
    pub async fn rename_folder(&self, owner_id: i64, folder_id: i64, name: &str) -> Result<Folder> {
        let name = validate_folder_name(name)?;
        self.owned_folder(owner_id, folder_id).await?;

        FolderRepository::new(self.db.pool())
            .rename(folder_id, &name)
            .await?
            .ok_or_else(|| FileboxError::NotFound("folder".to_string()))
    }

    /// Breadcrumb from the root down to `folder_id`.
    pub async fn folder_path(&self, owner_id: i64, folder_id: i64) -> Result<Vec<Folder>> {
        self.owned_folder(owner_id, folder_id).await?;
        FolderRepository::new(self.db.pool()).get_path(folder_id).await
    }

    /// Upload a file.
    ///
    /// The declared size (or the content length) is checked against the
    /// quota before the blob is written. The ledger charge and the file
    /// record then commit together; if the charge no longer fits, the blob
    /// is removed again and `QuotaExceeded` is returned.
    pub async fn upload(&self, owner_id: i64, request: UploadRequest) -> Result<FileMetadata> {
        let UploadRequest {
            folder_id,
            filename,
            mimetype,
            declared_size,
            content,
        } = request;
        validate_filename(&filename)?;

        let size = content.len() as i64;
        if size > self.max_upload_size {
            return Err(FileboxError::Validation(format!(
                "file is too large (max {} bytes)",
                self.max_upload_size
            )));
        }

        if let Some(folder_id) = folder_id {
            self.owned_folder(owner_id, folder_id).await?;
        }

        let declared = declared_size.unwrap_or(size);
        QuotaLedger::new(self.db.pool())
            .reserve(owner_id, declared)
            .await?;

        let key = FileStorage::generate_key(&filename);
        let put_key = key.clone();
        if let Err(e) = run_blocking(&self.blobs, move |blobs| blobs.put(&put_key, &content)).await {
            // A failed write may leave a partial blob; a key clash must not
            // touch the blob already stored under that key.
            if matches!(e, FileboxError::Io(_)) {
                self.discard_blob(&key).await;
            }
            return Err(e);
        }

        let mimetype = mimetype.unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let new_file = NewFile::new(owner_id, filename, &key, size, mimetype).in_folder(folder_id);

        let id = match self.record_file(&new_file).await {
            Ok(id) => id,
            Err(e) => {
                self.discard_blob(&key).await;
                return Err(e);
            }
        };

        info!(owner_id, file_id = id, size, "File uploaded");
        self.fetch_file(id).await
    }

    /// Record a blob that was already written to the store.
    pub async fn create_file(
        &self,
        owner_id: i64,
        folder_id: Option<i64>,
        blob: &BlobMeta,
    ) -> Result<FileMetadata> {
        if blob.size < 0 {
            return Err(FileboxError::Validation(
                "file size must be a non-negative integer".to_string(),
            ));
        }
        validate_filename(&blob.filename)?;

        if let Some(id) = folder_id {
            self.owned_folder(owner_id, id).await?;
        }

        let new_file = NewFile::new(owner_id, &blob.filename, &blob.key, blob.size, &blob.mimetype)
            .in_folder(folder_id);
        let id = self.record_file(&new_file).await?;

        self.fetch_file(id).await
    }

    /// Get file metadata if the requester may read it.
    pub async fn get_file(&self, requester: Option<i64>, file_id: i64) -> Result<FileMetadata> {
        let (file, shares) = self.file_with_shares(file_id).await?;

        if !can_read(requester, &file, &shares) {
            return Err(FileboxError::NotFound("file".to_string()));
        }

        Ok(file)
    }

    /// Download a file if the requester may read it.
    pub async fn download(&self, requester: Option<i64>, file_id: i64) -> Result<DownloadResult> {
        let metadata = self.get_file(requester, file_id).await?;
        let key = metadata.path.clone();
        let content = run_blocking(&self.blobs, move |blobs| blobs.get(&key)).await?;

        Ok(DownloadResult { metadata, content })
    }

    /// Access rights of `requester` on a file.
    ///
    /// Unreadable files are reported as `NotFound`.
    pub async fn file_access(&self, requester: Option<i64>, file_id: i64) -> Result<FileAccess> {
        let (file, shares) = self.file_with_shares(file_id).await?;

        if !can_read(requester, &file, &shares) {
            return Err(FileboxError::NotFound("file".to_string()));
        }

        Ok(FileAccess {
            can_read: true,
            can_edit: can_edit(requester, &file, &shares),
        })
    }

    /// Delete a file owned by `owner_id`.
    ///
    /// The blob goes first; the ledger credit and record removal commit
    /// together. Returns the freed byte count.
    pub async fn delete_file(&self, owner_id: i64, file_id: i64) -> Result<i64> {
        let file = FileRepository::new(self.db.pool())
            .get_owned(owner_id, file_id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("file".to_string()))?;

        let key = file.path.clone();
        if !run_blocking(&self.blobs, move |blobs| blobs.delete(&key)).await? {
            warn!(file_id, key = %file.path, "Blob already missing");
        }

        let mut tx = self.db.begin().await?;
        QuotaLedger::commit_in(&mut tx, owner_id, -file.size).await?;
        FileRepository::delete_many(&mut tx, &[file.id]).await?;
        tx.commit().await?;

        info!(owner_id, file_id, size = file.size, "File deleted");
        Ok(file.size)
    }

    /// Delete a folder with everything below it.
    pub async fn delete_folder(&self, owner_id: i64, folder_id: i64) -> Result<CascadeReport> {
        delete_folder_tree(self.db, &self.blobs, owner_id, folder_id).await
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// Share a file with the user registered under `email`.
    ///
    /// An existing grant for that user is overwritten. `permission` falls
    /// back to read when missing or unrecognized.
    pub async fn share(
        &self,
        owner_id: i64,
        file_id: i64,
        email: &str,
        permission: Option<&str>,
    ) -> Result<SharedEntry> {
        if email.trim().is_empty() {
            return Err(FileboxError::Validation("email is required".to_string()));
        }

        let file = self.file_for_owner_action(owner_id, file_id).await?;
        let target = UserRepository::new(self.db.pool())
            .get_by_email(email)
            .await?
            .ok_or_else(|| FileboxError::NotFound("user".to_string()))?;

        if target.id == owner_id {
            return Err(FileboxError::Validation(
                "cannot share a file with yourself".to_string(),
            ));
        }

        let permission = Permission::parse_or_default(permission);
        let entry = ShareRepository::new(self.db.pool())
            .upsert(file.id, target.id, permission)
            .await?;

        info!(owner_id, file_id, grantee = target.id, %permission, "File shared");
        Ok(entry)
    }

    /// Revoke the grant held by the user registered under `email`.
    ///
    /// Returns `false` if that user had no grant.
    pub async fn unshare(&self, owner_id: i64, file_id: i64, email: &str) -> Result<bool> {
        let file = self.file_for_owner_action(owner_id, file_id).await?;
        let target = UserRepository::new(self.db.pool())
            .get_by_email(email)
            .await?
            .ok_or_else(|| FileboxError::NotFound("user".to_string()))?;

        let removed = ShareRepository::new(self.db.pool())
            .remove(file.id, target.id)
            .await?;

        if removed {
            info!(owner_id, file_id, grantee = target.id, "Share revoked");
        }
        Ok(removed)
    }

    /// List the grants on a file.
    pub async fn list_shares(&self, owner_id: i64, file_id: i64) -> Result<Vec<SharedEntry>> {
        let file = self.file_for_owner_action(owner_id, file_id).await?;
        ShareRepository::new(self.db.pool())
            .list_for_file(file.id)
            .await
    }

    /// Make a file public or private.
    pub async fn set_public(
        &self,
        owner_id: i64,
        file_id: i64,
        is_public: bool,
    ) -> Result<FileMetadata> {
        let file = self.file_for_owner_action(owner_id, file_id).await?;

        let updated = FileRepository::new(self.db.pool())
            .set_public(file.id, is_public)
            .await?
            .ok_or_else(|| FileboxError::NotFound("file".to_string()))?;

        info!(owner_id, file_id, is_public, "Visibility changed");
        Ok(updated)
    }

    /// Files other users have shared with `user_id`.
    pub async fn list_shared_with_me(&self, user_id: i64) -> Result<Vec<FileMetadata>> {
        FileRepository::new(self.db.pool())
            .list_shared_with(user_id)
            .await
    }

    /// Storage usage for a user.
    pub async fn usage(&self, user_id: i64) -> Result<StorageUsage> {
        QuotaLedger::new(self.db.pool()).usage(user_id).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn owned_folder(&self, owner_id: i64, folder_id: i64) -> Result<Folder> {
        FolderRepository::new(self.db.pool())
            .get_owned(owner_id, folder_id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("folder".to_string()))
    }

    async fn fetch_file(&self, file_id: i64) -> Result<FileMetadata> {
        FileRepository::new(self.db.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| FileboxError::NotFound("file".to_string()))
    }

    async fn file_with_shares(&self, file_id: i64) -> Result<(FileMetadata, Vec<SharedEntry>)> {
        let file = self.fetch_file(file_id).await?;
        let shares = ShareRepository::new(self.db.pool())
            .list_for_file(file_id)
            .await?;
        Ok((file, shares))
    }

    /// Resolve a file for an owner-only action.
    ///
    /// Ownership is checked directly, never inferred from grants. A caller
    /// who can read but does not own the file gets `Forbidden`; anyone else
    /// gets `NotFound`.
    async fn file_for_owner_action(&self, owner_id: i64, file_id: i64) -> Result<FileMetadata> {
        let (file, shares) = self.file_with_shares(file_id).await?;

        if file.owner_id == owner_id {
            return Ok(file);
        }
        if can_read(Some(owner_id), &file, &shares) {
            return Err(FileboxError::Forbidden(
                "only the owner can change this file".to_string(),
            ));
        }
        Err(FileboxError::NotFound("file".to_string()))
    }

    /// Charge the ledger and insert the record in one transaction.
    async fn record_file(&self, new_file: &NewFile) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        QuotaLedger::charge(&mut tx, new_file.owner_id, new_file.size).await?;
        let id = FileRepository::insert(&mut tx, new_file).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn discard_blob(&self, key: &str) {
        let owned = key.to_string();
        if let Err(e) = run_blocking(&self.blobs, move |blobs| blobs.delete(&owned)).await {
            warn!(key, error = %e, "Failed to remove orphaned blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, User};
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir, Arc<FileStorage>) {
        let db = Database::open_in_memory().await.unwrap();
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(temp_dir.path()).unwrap());
        (db, temp_dir, storage)
    }

    async fn create_user(db: &Database, email: &str, limit: i64) -> User {
        UserRepository::new(db.pool())
            .create(&NewUser::new(email, email).with_storage_limit(limit))
            .await
            .unwrap()
    }

    /// Blob store whose deletes always fail.
    struct FailingDeletes(Arc<FileStorage>);

    impl BlobStore for FailingDeletes {
        fn put(&self, key: &str, content: &[u8]) -> Result<String> {
            self.0.put(key, content)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.0.get(key)
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Err(FileboxError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )))
        }

        fn exists(&self, key: &str) -> bool {
            self.0.exists(key)
        }
    }

    /// Blob store that writes half the content and then fails.
    struct PartialPuts(Arc<FileStorage>);

    impl BlobStore for PartialPuts {
        fn put(&self, key: &str, content: &[u8]) -> Result<String> {
            self.0.put(key, &content[..content.len() / 2])?;
            Err(FileboxError::Io(std::io::Error::other("device lost")))
        }

        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.0.get(key)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }

        fn exists(&self, key: &str) -> bool {
            self.0.exists(key)
        }
    }

    /// Blob store that, on each delete, records whether the file record is
    /// still present and tries to add a folder under `parent`.
    struct CatalogCheckingDeletes {
        inner: Arc<FileStorage>,
        db: Database,
        owner_id: i64,
        parent: i64,
        seen: std::sync::Mutex<Vec<(i64, bool)>>,
    }

    impl BlobStore for CatalogCheckingDeletes {
        fn put(&self, key: &str, content: &[u8]) -> Result<String> {
            self.inner.put(key, content)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            let observed = tokio::runtime::Handle::current().block_on(async {
                let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE path = ?")
                    .bind(key)
                    .fetch_one(self.db.pool())
                    .await
                    .unwrap();
                let late_folder = FolderRepository::new(self.db.pool())
                    .create(&NewFolder::new(self.owner_id, "Late").with_parent(self.parent))
                    .await;
                (records, late_folder.is_ok())
            });
            self.seen.lock().unwrap().push(observed);
            self.inner.delete(key)
        }

        fn exists(&self, key: &str) -> bool {
            self.inner.exists(key)
        }
    }

    fn count_blob_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    count_blob_files(&path)
                } else {
                    1
                }
            })
            .sum()
    }

    #[tokio::test]
    async fn test_upload_success() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(user.id, UploadRequest::new("hello.txt", b"Hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(file.filename, "hello.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.mimetype, "text/plain");
        assert_eq!(file.owner_id, user.id);
        assert!(storage.exists(&file.path));
        assert_eq!(service.usage(user.id).await.unwrap().used_bytes, 5);
    }

    #[tokio::test]
    async fn test_upload_explicit_mimetype() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(
                user.id,
                UploadRequest::new("blob", vec![1, 2, 3]).with_mimetype("image/png"),
            )
            .await
            .unwrap();

        assert_eq!(file.mimetype, "image/png");
    }

    #[tokio::test]
    async fn test_upload_unknown_extension_is_octet_stream() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(user.id, UploadRequest::new("data", vec![0; 4]))
            .await
            .unwrap();

        assert_eq!(file.mimetype, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_declared_size_denied_before_write() {
        let (db, temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let request = UploadRequest::new("big.bin", vec![0; 10]).with_declared_size(5000);
        let result = service.upload(user.id, request).await;

        assert!(matches!(result, Err(FileboxError::QuotaExceeded { .. })));
        // Nothing reached the blob store
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_exactly_at_limit() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 100).await;
        let service = FileService::new(&db, storage.clone());

        service
            .upload(user.id, UploadRequest::new("full.bin", vec![0; 100]))
            .await
            .unwrap();

        let result = service
            .upload(user.id, UploadRequest::new("one.bin", vec![0; 1]))
            .await;
        assert!(matches!(result, Err(FileboxError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_upload_under_declared_but_over_actual() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 100).await;
        let service = FileService::new(&db, storage.clone());

        // Transport under-reports; the conditional charge still refuses
        let request = UploadRequest::new("liar.bin", vec![0; 150]).with_declared_size(10);
        let result = service.upload(user.id, request).await;

        assert!(matches!(result, Err(FileboxError::QuotaExceeded { .. })));
        assert_eq!(service.usage(user.id).await.unwrap().used_bytes, 0);
        assert!(service.list_children(user.id, None).await.unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone()).with_max_upload_size(10);

        let empty_name = service
            .upload(user.id, UploadRequest::new("  ", b"x".to_vec()))
            .await;
        assert!(matches!(empty_name, Err(FileboxError::Validation(_))));

        let long_name = service
            .upload(user.id, UploadRequest::new("a".repeat(256), b"x".to_vec()))
            .await;
        assert!(matches!(long_name, Err(FileboxError::Validation(_))));

        let too_large = service
            .upload(user.id, UploadRequest::new("big.bin", vec![0; 11]))
            .await;
        assert!(matches!(too_large, Err(FileboxError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upload_into_foreign_folder() {
        let (db, _temp_dir, storage) = setup().await;
        let alice = create_user(&db, "alice@example.com", 1000).await;
        let bob = create_user(&db, "bob@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let folder = service.create_folder(alice.id, None, "Private").await.unwrap();
        let result = service
            .upload(
                bob.id,
                UploadRequest::new("intruder.txt", b"hi".to_vec()).in_folder(folder.id),
            )
            .await;

        assert!(matches!(result, Err(FileboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_file_record_only() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let key = FileStorage::generate_key("external.txt");
        storage.put(&key, b"abc").unwrap();

        let blob = BlobMeta {
            key: key.clone(),
            filename: "external.txt".to_string(),
            size: 3,
            mimetype: "text/plain".to_string(),
        };
        let file = service.create_file(user.id, None, &blob).await.unwrap();

        assert_eq!(file.path, key);
        assert_eq!(service.usage(user.id).await.unwrap().used_bytes, 3);

        let negative = BlobMeta { size: -1, ..blob };
        assert!(matches!(
            service.create_file(user.id, None, &negative).await,
            Err(FileboxError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_folder_validation() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        assert!(matches!(
            service.create_folder(user.id, None, "").await,
            Err(FileboxError::Validation(_))
        ));
        assert!(matches!(
            service.create_folder(user.id, None, "   ").await,
            Err(FileboxError::Validation(_))
        ));
        assert!(matches!(
            service.create_folder(user.id, Some(9999), "Orphan").await,
            Err(FileboxError::NotFound(_))
        ));

        let folder = service.create_folder(user.id, None, " Trimmed ").await.unwrap();
        assert_eq!(folder.name, "Trimmed");
    }

    #[tokio::test]
    async fn test_rename_and_path() {
        let (db, _temp_dir, storage) = setup().await;
        let alice = create_user(&db, "alice@example.com", 1000).await;
        let bob = create_user(&db, "bob@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let top = service.create_folder(alice.id, None, "Top").await.unwrap();
        let inner = service
            .create_folder(alice.id, Some(top.id), "Inner")
            .await
            .unwrap();

        let renamed = service.rename_folder(alice.id, inner.id, "Renamed").await.unwrap();
        assert_eq!(renamed.name, "Renamed");

        let path = service.folder_path(alice.id, inner.id).await.unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].name, "Top");
        assert_eq!(path[1].name, "Renamed");

        assert!(matches!(
            service.rename_folder(bob.id, inner.id, "Hijacked").await,
            Err(FileboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_children() {
        let (db, _temp_dir, storage) = setup().await;
        let user = create_user(&db, "alice@example.com", 1000).await;
        let other = create_user(&db, "bob@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let folder = service.create_folder(user.id, None, "Docs").await.unwrap();
        service
            .upload(user.id, UploadRequest::new("root.txt", b"r".to_vec()))
            .await
            .unwrap();
        service
            .upload(
                user.id,
                UploadRequest::new("inner.txt", b"i".to_vec()).in_folder(folder.id),
            )
            .await
            .unwrap();

        let root = service.list_children(user.id, None).await.unwrap();
        assert_eq!(root.folders.len(), 1);
        assert_eq!(root.files.len(), 1);
        assert_eq!(root.files[0].filename, "root.txt");

        let inner = service.list_children(user.id, Some(folder.id)).await.unwrap();
        assert_eq!(inner.files.len(), 1);
        assert!(inner.folders.is_empty());

        assert!(matches!(
            service.list_children(other.id, Some(folder.id)).await,
            Err(FileboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_access() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let friend = create_user(&db, "friend@example.com", 1000).await;
        let stranger = create_user(&db, "stranger@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("secret.txt", b"s3cret".to_vec()))
            .await
            .unwrap();

        let own = service.download(Some(owner.id), file.id).await.unwrap();
        assert_eq!(own.content, b"s3cret");

        assert!(matches!(
            service.download(Some(stranger.id), file.id).await,
            Err(FileboxError::NotFound(_))
        ));
        assert!(matches!(
            service.download(None, file.id).await,
            Err(FileboxError::NotFound(_))
        ));

        service
            .share(owner.id, file.id, "friend@example.com", None)
            .await
            .unwrap();
        assert!(service.download(Some(friend.id), file.id).await.is_ok());

        service.set_public(owner.id, file.id, true).await.unwrap();
        assert!(service.download(Some(stranger.id), file.id).await.is_ok());
        assert!(service.download(None, file.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_and_hidden_files_look_the_same() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let stranger = create_user(&db, "stranger@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("a.txt", b"a".to_vec()))
            .await
            .unwrap();

        let hidden = service.get_file(Some(stranger.id), file.id).await.unwrap_err();
        let missing = service.get_file(Some(stranger.id), 9999).await.unwrap_err();
        assert_eq!(hidden.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let friend = create_user(&db, "friend@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("gone.txt", vec![0; 40]))
            .await
            .unwrap();
        service
            .share(owner.id, file.id, "friend@example.com", Some("edit"))
            .await
            .unwrap();

        // Even an edit grantee cannot delete
        assert!(matches!(
            service.delete_file(friend.id, file.id).await,
            Err(FileboxError::NotFound(_))
        ));

        let freed = service.delete_file(owner.id, file.id).await.unwrap();
        assert_eq!(freed, 40);
        assert!(!storage.exists(&file.path));
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 0);
        assert!(matches!(
            service.get_file(Some(owner.id), file.id).await,
            Err(FileboxError::NotFound(_))
        ));
        assert!(service.list_shared_with_me(friend.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_file_blob_failure_keeps_record() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let failing = Arc::new(FailingDeletes(storage));
        let service = FileService::new(&db, failing.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("stuck.txt", vec![0; 10]))
            .await
            .unwrap();

        assert!(matches!(
            service.delete_file(owner.id, file.id).await,
            Err(FileboxError::Io(_))
        ));
        assert!(service.get_file(Some(owner.id), file.id).await.is_ok());
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 10);
    }

    #[tokio::test]
    async fn test_share_rules() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        create_user(&db, "friend@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("a.txt", b"a".to_vec()))
            .await
            .unwrap();

        assert!(matches!(
            service.share(owner.id, file.id, "nobody@example.com", None).await,
            Err(FileboxError::NotFound(_))
        ));
        assert!(matches!(
            service.share(owner.id, file.id, "owner@example.com", None).await,
            Err(FileboxError::Validation(_))
        ));
        assert!(matches!(
            service.share(owner.id, file.id, "", None).await,
            Err(FileboxError::Validation(_))
        ));

        let entry = service
            .share(owner.id, file.id, "FRIEND@example.com", Some("bogus"))
            .await
            .unwrap();
        assert_eq!(entry.permission, Permission::Read);
    }

    #[tokio::test]
    async fn test_share_upgrade_keeps_single_entry() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let friend = create_user(&db, "friend@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("doc.txt", b"d".to_vec()))
            .await
            .unwrap();

        service
            .share(owner.id, file.id, "friend@example.com", Some("read"))
            .await
            .unwrap();
        let access = service.file_access(Some(friend.id), file.id).await.unwrap();
        assert!(access.can_read);
        assert!(!access.can_edit);

        service
            .share(owner.id, file.id, "friend@example.com", Some("edit"))
            .await
            .unwrap();
        let access = service.file_access(Some(friend.id), file.id).await.unwrap();
        assert!(access.can_edit);

        let shares = service.list_shares(owner.id, file.id).await.unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].permission, Permission::Edit);
    }

    #[tokio::test]
    async fn test_unshare() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let friend = create_user(&db, "friend@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("a.txt", b"a".to_vec()))
            .await
            .unwrap();
        service
            .share(owner.id, file.id, "friend@example.com", None)
            .await
            .unwrap();
        assert_eq!(service.list_shared_with_me(friend.id).await.unwrap().len(), 1);

        assert!(service.unshare(owner.id, file.id, "friend@example.com").await.unwrap());
        assert!(!service.unshare(owner.id, file.id, "friend@example.com").await.unwrap());
        assert!(matches!(
            service.get_file(Some(friend.id), file.id).await,
            Err(FileboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_public_ownership() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let friend = create_user(&db, "friend@example.com", 1000).await;
        let stranger = create_user(&db, "stranger@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let file = service
            .upload(owner.id, UploadRequest::new("a.txt", b"a".to_vec()))
            .await
            .unwrap();
        service
            .share(owner.id, file.id, "friend@example.com", Some("edit"))
            .await
            .unwrap();

        // A grantee already knows the file exists
        assert!(matches!(
            service.set_public(friend.id, file.id, true).await,
            Err(FileboxError::Forbidden(_))
        ));
        // A stranger learns nothing
        assert!(matches!(
            service.set_public(stranger.id, file.id, true).await,
            Err(FileboxError::NotFound(_))
        ));

        let updated = service.set_public(owner.id, file.id, true).await.unwrap();
        assert!(updated.is_public);

        // Public visibility alone does not grant edit
        let access = service.file_access(Some(stranger.id), file.id).await.unwrap();
        assert!(access.can_read);
        assert!(!access.can_edit);
    }

    #[tokio::test]
    async fn test_delete_folder_cascade() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 10_000).await;
        let service = FileService::new(&db, storage.clone());

        let top = service.create_folder(owner.id, None, "Top").await.unwrap();
        let nested = service
            .create_folder(owner.id, Some(top.id), "Nested")
            .await
            .unwrap();
        let keep = service
            .upload(owner.id, UploadRequest::new("keep.txt", vec![0; 7]))
            .await
            .unwrap();
        let f1 = service
            .upload(
                owner.id,
                UploadRequest::new("f1.txt", vec![0; 100]).in_folder(top.id),
            )
            .await
            .unwrap();
        let f2 = service
            .upload(
                owner.id,
                UploadRequest::new("f2.txt", vec![0; 200]).in_folder(nested.id),
            )
            .await
            .unwrap();

        let report = service.delete_folder(owner.id, top.id).await.unwrap();

        assert_eq!(report.files_deleted, 2);
        assert_eq!(report.folders_deleted, 2);
        assert_eq!(report.freed_bytes, 300);
        assert!(report.is_clean());

        assert!(!storage.exists(&f1.path));
        assert!(!storage.exists(&f2.path));
        assert!(storage.exists(&keep.path));
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 7);

        let root = service.list_children(owner.id, None).await.unwrap();
        assert!(root.folders.is_empty());
        assert_eq!(root.files.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_folder_not_owned() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let other = create_user(&db, "other@example.com", 1000).await;
        let service = FileService::new(&db, storage.clone());

        let folder = service.create_folder(owner.id, None, "Mine").await.unwrap();

        assert!(matches!(
            service.delete_folder(other.id, folder.id).await,
            Err(FileboxError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_folder(owner.id, 9999).await,
            Err(FileboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_folder_best_effort_blobs() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let failing = Arc::new(FailingDeletes(storage));
        let service = FileService::new(&db, failing.clone());

        let folder = service.create_folder(owner.id, None, "Stuck").await.unwrap();
        let file = service
            .upload(
                owner.id,
                UploadRequest::new("a.txt", vec![0; 50]).in_folder(folder.id),
            )
            .await
            .unwrap();

        let report = service.delete_folder(owner.id, folder.id).await.unwrap();

        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.freed_bytes, 50);
        assert_eq!(report.failed_blobs, vec![file.path.clone()]);
        assert!(!report.is_clean());

        // Catalog and ledger moved on; the blob is left for reconciliation
        assert!(failing.exists(&file.path));
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 0);
        assert!(service.get_file(Some(owner.id), file.id).await.is_err());
    }

    #[tokio::test]
    async fn test_upload_failed_write_leaves_nothing() {
        let (db, temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let service = FileService::new(&db, Arc::new(PartialPuts(storage)));

        let result = service
            .upload(owner.id, UploadRequest::new("broken.bin", vec![7; 64]))
            .await;

        assert!(matches!(result, Err(FileboxError::Io(_))));
        assert_eq!(count_blob_files(temp_dir.path()), 0);
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 0);
        assert!(service.list_children(owner.id, None).await.unwrap().files.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_folder_commits_catalog_before_blobs() {
        let (db, _temp_dir, storage) = setup().await;
        let owner = create_user(&db, "owner@example.com", 1000).await;
        let folder = FileService::new(&db, storage.clone())
            .create_folder(owner.id, None, "Doomed")
            .await
            .unwrap();

        let blobs = Arc::new(CatalogCheckingDeletes {
            inner: storage.clone(),
            db: db.clone(),
            owner_id: owner.id,
            parent: folder.id,
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let service = FileService::new(&db, blobs.clone());

        let file = service
            .upload(
                owner.id,
                UploadRequest::new("a.txt", vec![0; 100]).in_folder(folder.id),
            )
            .await
            .unwrap();

        let report = service.delete_folder(owner.id, folder.id).await.unwrap();

        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.folders_deleted, 1);
        assert!(report.is_clean());

        // The record was gone before its blob was touched, and the folder
        // could no longer take new children
        assert_eq!(*blobs.seen.lock().unwrap(), vec![(0, false)]);

        assert!(!storage.exists(&file.path));
        assert_eq!(service.usage(owner.id).await.unwrap().used_bytes, 0);
        assert!(matches!(
            service.get_file(Some(owner.id), file.id).await,
            Err(FileboxError::NotFound(_))
        ));
        assert!(service.list_children(owner.id, None).await.unwrap().folders.is_empty());
    }
}
