//! Blob storage for filebox.
//!
//! Raw file bytes live outside the catalog, keyed by an opaque string. The
//! catalog never parses keys; it only hands them back to the store.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::{FileboxError, Result};

/// Byte storage addressed by opaque keys.
pub trait BlobStore: Send + Sync {
    /// Store `content` under a key that must not already exist.
    ///
    /// Returns the key.
    fn put(&self, key: &str, content: &[u8]) -> Result<String>;

    /// Read the content stored under `key`.
    ///
    /// Fails with `NotFound` for unknown keys.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the content stored under `key`.
    ///
    /// Returns `false` if the key was unknown.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a key is present.
    fn exists(&self, key: &str) -> bool;
}

/// Blob store on the local filesystem.
///
/// Blobs are stored in a sharded directory structure:
/// ```text
/// {base_path}/
/// ├── ab/
/// │   └── ab12cd34-5678-90ab-cdef-123456789012.txt
/// ├── cd/
/// │   └── cd90ab12-3456-7890-abcd-ef1234567890.bin
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Generate a fresh key preserving the extension of `original_name`.
    pub fn generate_key(original_name: &str) -> String {
        let ext = Self::extract_extension(original_name);
        format!("{}.{ext}", Uuid::new_v4())
    }

    /// Get the full path for a key: `{base_path}/{shard}/{key}`.
    ///
    /// Keys that could escape the base directory are rejected.
    pub fn blob_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(FileboxError::Validation(format!("invalid blob key: {key}")));
        }
        Ok(self.base_path.join(Self::shard(key)).join(key))
    }

    /// Create the blob for `key` and fill it with `write`.
    ///
    /// Fails if the key already exists. When `write` fails the partial blob
    /// is removed before the error is returned.
    fn write_once<F>(&self, key: &str, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let path = self.blob_path(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FileboxError::Validation(format!("blob already exists: {key}")));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = write(&mut file) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                tracing::warn!(key, error = %remove_err, "Failed to remove partial blob");
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// First two characters of the key.
    fn shard(key: &str) -> &str {
        match key.char_indices().nth(2) {
            Some((idx, _)) => &key[..idx],
            None => key,
        }
    }

    /// Extension of `filename`, or "bin" if there is none.
    fn extract_extension(filename: &str) -> &str {
        Path::new(filename)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("bin")
    }
}

impl BlobStore for FileStorage {
    fn put(&self, key: &str, content: &[u8]) -> Result<String> {
        self.write_once(key, |file| {
            file.write_all(content)?;
            file.sync_all()
        })?;

        Ok(key.to_string())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(key)?) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileboxError::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.blob_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.blob_path(key).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Run a blob store call on the blocking thread pool.
pub(crate) async fn run_blocking<T, F>(blobs: &Arc<dyn BlobStore>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn BlobStore) -> Result<T> + Send + 'static,
{
    let blobs = Arc::clone(blobs);
    tokio::task::spawn_blocking(move || f(blobs.as_ref()))
        .await
        .map_err(|e| FileboxError::Io(io::Error::other(e)))?
}
