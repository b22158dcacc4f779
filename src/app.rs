//! Application wiring.
//!
//! Opens the catalog and blob store described by a [`Config`] and hands out
//! services that carry the configured storage limits.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::{Database, NewUser, User, UserRepository};
use crate::file::{FileService, FileStorage};
use crate::Result;

/// Open catalog and blob store plus the settings they run under.
pub struct Application {
    /// Database connection.
    db: Arc<Database>,
    /// Blob store for file content.
    storage: Arc<FileStorage>,
    /// Application configuration.
    config: Arc<Config>,
}

impl Application {
    /// Create an application from already opened parts.
    pub fn new(db: Arc<Database>, storage: Arc<FileStorage>, config: Arc<Config>) -> Self {
        Self {
            db,
            storage,
            config,
        }
    }

    /// Open the database and blob store named in `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let db = Database::open_with_max_connections(
            &config.database.path,
            config.database.max_connections,
        )
        .await?;
        let storage = FileStorage::new(&config.storage.path)?;

        info!(
            database = %config.database.path,
            storage = %config.storage.path,
            "Application opened"
        );

        Ok(Self::new(Arc::new(db), Arc::new(storage), Arc::new(config)))
    }

    /// Get the database.
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Get the blob store.
    pub fn storage(&self) -> &Arc<FileStorage> {
        &self.storage
    }

    /// Get the configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// File service limited to the configured upload size.
    pub fn files(&self) -> FileService<'_> {
        FileService::new(&self.db, self.storage.clone())
            .with_max_upload_size(self.config.storage.max_upload_size)
    }

    /// Register a user with the configured default storage limit.
    pub async fn create_user(&self, email: &str, name: &str) -> Result<User> {
        let new_user =
            NewUser::new(email, name).with_storage_limit(self.config.storage.default_user_limit);
        UserRepository::new(self.db.pool()).create(&new_user).await
    }

    /// Close the database pool.
    pub async fn close(&self) {
        self.db.close().await;
    }
}
