//! File management module for filebox.
//!
//! This module provides:
//! - The catalog of folders and files, scoped per owner
//! - The per-user quota ledger
//! - Sharing grants and read/edit access decisions
//! - Recursive folder deletion
//! - Blob storage keyed by opaque names

mod cascade;
mod folder;
mod metadata;
mod quota;
mod service;
mod share;
mod storage;

pub use cascade::{delete_folder_tree, CascadeReport};
pub use folder::{Folder, FolderRepository, NewFolder};
pub use metadata::{FileMetadata, FileRepository, NewFile};
pub use quota::{QuotaLedger, StorageUsage};
pub use service::{BlobMeta, DownloadResult, FileAccess, FileService, FolderListing, UploadRequest};
pub use share::{can_edit, can_read, Permission, ShareRepository, SharedEntry, UnknownPermission};
pub use storage::{BlobStore, FileStorage};

/// Maximum length for filename (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length for folder names (in characters).
pub const MAX_FOLDER_NAME_LENGTH: usize = 100;

/// Maximum folder depth (levels).
pub const MAX_FOLDER_DEPTH: usize = 32;

/// Default maximum upload size (100MB).
pub const DEFAULT_MAX_UPLOAD_SIZE: i64 = 100 * 1024 * 1024;
