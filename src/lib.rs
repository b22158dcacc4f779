//! filebox - per-user file storage with folders, quotas and sharing.
//!
//! The catalog lives in SQLite; file bytes live in a blob store keyed by
//! opaque names.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;

pub use app::Application;
pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{ErrorKind, FileboxError, Result};
pub use file::{
    BlobMeta, BlobStore, CascadeReport, DownloadResult, FileAccess, FileMetadata, FileService,
    FileStorage, Folder, FolderListing, Permission, QuotaLedger, SharedEntry, StorageUsage,
    UploadRequest,
};
