//! Test helpers for integration tests.
//!
//! Provides a throwaway database and blob directory plus user helpers.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use filebox::db::{NewUser, UserRepository};
use filebox::{Database, FileStorage};
use tempfile::TempDir;

/// In-memory database with a blob store in a temporary directory.
pub struct TestEnv {
    pub db: Database,
    pub storage: Arc<FileStorage>,
    pub blob_dir: TempDir,
}

impl TestEnv {
    /// Create a fresh environment.
    pub async fn new() -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        let blob_dir = TempDir::new().expect("Failed to create blob directory");
        let storage = Arc::new(
            FileStorage::new(blob_dir.path()).expect("Failed to open blob storage"),
        );

        Self {
            db,
            storage,
            blob_dir,
        }
    }

    /// Create a user with the given storage limit and return the user ID.
    pub async fn create_user(&self, email: &str, limit: i64) -> i64 {
        create_user(&self.db, email, limit).await
    }

    /// Number of blobs currently on disk.
    pub fn blob_count(&self) -> usize {
        count_blobs(self.blob_dir.path())
    }
}

/// Create a user with the given storage limit and return the user ID.
pub async fn create_user(db: &Database, email: &str, limit: i64) -> i64 {
    let name = email.split('@').next().unwrap_or(email);
    UserRepository::new(db.pool())
        .create(&NewUser::new(email, name).with_storage_limit(limit))
        .await
        .expect("Failed to create test user")
        .id
}

/// Count regular files below `dir`, one shard level deep.
pub fn count_blobs(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                std::fs::read_dir(&path)
                    .unwrap()
                    .flatten()
                    .filter(|e| e.path().is_file())
                    .count()
            } else {
                1
            }
        })
        .sum()
}
