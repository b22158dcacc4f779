//! Recursive folder deletion.
//!
//! Deleting a folder removes every folder nested below it and every file
//! they contain. The subtree is read, deleted and credited back to the
//! ledger inside one write transaction. Blobs are deleted only after that
//! transaction commits, best-effort: a failed blob delete is logged and
//! reported, never rolled back into the catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::folder::FolderRepository;
use super::metadata::FileRepository;
use super::quota::QuotaLedger;
use super::storage::{run_blocking, BlobStore};
use crate::db::Database;
use crate::{FileboxError, Result};

/// Outcome of a cascade delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    /// File records removed.
    pub files_deleted: u64,
    /// Folder records removed, including the target folder.
    pub folders_deleted: u64,
    /// Bytes returned to the owner's ledger.
    pub freed_bytes: i64,
    /// Blob keys whose deletion failed and may need reconciling.
    pub failed_blobs: Vec<String>,
}

impl CascadeReport {
    /// Whether every blob was removed.
    pub fn is_clean(&self) -> bool {
        self.failed_blobs.is_empty()
    }
}

/// Delete `folder_id` and everything below it.
///
/// Fails with `NotFound` when the folder does not exist or is not owned by
/// `owner_id`. On any catalog error nothing is deleted, blobs included.
pub async fn delete_folder_tree(
    db: &Database,
    blobs: &Arc<dyn BlobStore>,
    owner_id: i64,
    folder_id: i64,
) -> Result<CascadeReport> {
    let mut tx = db.begin().await?;

    if !FolderRepository::lock_owned(&mut tx, owner_id, folder_id).await? {
        return Err(FileboxError::NotFound("folder".to_string()));
    }

    let folder_ids = FolderRepository::collect_subtree(&mut tx, folder_id).await?;
    let files = FileRepository::list_in_folders(&mut tx, &folder_ids).await?;

    let mut freed_by_owner: BTreeMap<i64, i64> = BTreeMap::new();
    for file in &files {
        *freed_by_owner.entry(file.owner_id).or_default() += file.size;
    }
    let file_ids: Vec<i64> = files.iter().map(|f| f.id).collect();

    let mut report = CascadeReport {
        files_deleted: FileRepository::delete_many(&mut tx, &file_ids).await?,
        ..CascadeReport::default()
    };

    // Children before parents
    let delete_order: Vec<i64> = folder_ids.iter().rev().copied().collect();
    report.folders_deleted = FolderRepository::delete_in_order(&mut tx, &delete_order).await?;

    for (user_id, freed) in &freed_by_owner {
        QuotaLedger::commit_in(&mut tx, *user_id, -freed).await?;
    }
    tx.commit().await?;

    report.freed_bytes = freed_by_owner.values().sum();

    let keys: Vec<(i64, String)> = files.into_iter().map(|f| (f.id, f.path)).collect();
    report.failed_blobs = delete_blobs(blobs, keys).await;

    info!(
        owner_id,
        folder_id,
        files = report.files_deleted,
        folders = report.folders_deleted,
        freed = report.freed_bytes,
        failed_blobs = report.failed_blobs.len(),
        "Folder deleted"
    );

    Ok(report)
}

/// Delete the blobs of already-removed files. Returns the keys that failed.
async fn delete_blobs(blobs: &Arc<dyn BlobStore>, keys: Vec<(i64, String)>) -> Vec<String> {
    if keys.is_empty() {
        return Vec::new();
    }

    let all_keys: Vec<String> = keys.iter().map(|(_, key)| key.clone()).collect();

    let result = run_blocking(blobs, move |store| {
        let mut failed = Vec::new();
        for (file_id, key) in keys {
            match store.delete(&key) {
                Ok(true) => {}
                Ok(false) => warn!(file_id, key = %key, "Blob already missing"),
                Err(e) => {
                    warn!(file_id, key = %key, error = %e, "Blob delete failed, continuing");
                    failed.push(key);
                }
            }
        }
        Ok(failed)
    })
    .await;

    match result {
        Ok(failed) => failed,
        Err(e) => {
            warn!(error = %e, "Blob cleanup task failed");
            all_keys
        }
    }
}
