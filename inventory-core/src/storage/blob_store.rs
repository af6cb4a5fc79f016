use crate::error::{InventoryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// How many timestamp slots `save` tries before giving up on a free name.
const MAX_NAME_ATTEMPTS: i64 = 16;

/// Opaque handle to a stored blob, as handed back by [`BlobStore::save`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageRef(String);

impl StorageRef {
    /// Parse a storage name, rejecting anything that could escape the store root.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(InventoryError::InvalidStorageRef(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for opaque photo payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `payload` under a fresh name derived from `original_name`.
    async fn save(&self, payload: Bytes, original_name: &str) -> Result<StorageRef>;

    /// Absolute path of an existing blob.
    async fn resolve(&self, storage_ref: &StorageRef) -> Result<PathBuf>;

    async fn read(&self, storage_ref: &StorageRef) -> Result<Bytes>;

    /// Remove a blob. Missing blobs are not an error.
    async fn delete(&self, storage_ref: &StorageRef) -> Result<()>;
}

/// FsBlobStore keeps every blob as a file directly under one root directory,
/// named `<upload millis>-<sanitized original name>`.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
            tracing::info!("Created blob directory: {:?}", base_path);
        }
        let base_path = std::fs::canonicalize(&base_path)?;
        Ok(Self { base_path })
    }

    /// Get the root directory of the store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, storage_ref: &StorageRef) -> PathBuf {
        self.base_path.join(storage_ref.as_str())
    }

    fn temp_path(&self, storage_ref: &StorageRef) -> PathBuf {
        self.base_path.join(format!(".{}.tmp", storage_ref.as_str()))
    }

    /// Claim `storage_ref` by creating its file exclusively.
    /// Returns false when the name is already taken.
    async fn claim(&self, storage_ref: &StorageRef) -> Result<bool> {
        let claimed = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.blob_path(storage_ref))
            .await;

        match claimed {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_claimed(&self, storage_ref: &StorageRef, payload: &[u8]) -> Result<()> {
        // Write to temporary file first, then rename over the claimed name
        let temp_path = self.temp_path(storage_ref);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, self.blob_path(storage_ref)).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, payload: Bytes, original_name: &str) -> Result<StorageRef> {
        let sanitized = sanitize_file_name(original_name);
        let uploaded_at = chrono::Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let storage_ref = StorageRef::parse(format!("{}-{}", uploaded_at + attempt, sanitized))?;
            if !self.claim(&storage_ref).await? {
                continue;
            }

            if let Err(error) = self.write_claimed(&storage_ref, &payload).await {
                let _ = fs::remove_file(self.temp_path(&storage_ref)).await;
                let _ = fs::remove_file(self.blob_path(&storage_ref)).await;
                return Err(error);
            }

            tracing::debug!("Stored blob {} ({} bytes)", storage_ref, payload.len());
            return Ok(storage_ref);
        }

        Err(InventoryError::Internal(format!(
            "no free blob name for upload '{}' after {} attempts",
            sanitized, MAX_NAME_ATTEMPTS
        )))
    }

    async fn resolve(&self, storage_ref: &StorageRef) -> Result<PathBuf> {
        let path = self.blob_path(storage_ref);
        if !fs::try_exists(&path).await? {
            return Err(InventoryError::PhotoNotFound(storage_ref.to_string()));
        }
        Ok(path)
    }

    async fn read(&self, storage_ref: &StorageRef) -> Result<Bytes> {
        let path = self.resolve(storage_ref).await?;
        let data = fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        match fs::remove_file(self.blob_path(storage_ref)).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", storage_ref);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Make an uploaded file name safe to use as a single path component.
///
/// Runs of whitespace collapse to one `_`; path separators and NUL become `_`;
/// leading dots are dropped so the result is never hidden or a parent reference.
pub fn sanitize_file_name(original_name: &str) -> String {
    let mut sanitized = String::with_capacity(original_name.len());
    let mut in_whitespace = false;

    for ch in original_name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        match ch {
            '/' | '\\' | '\0' => sanitized.push('_'),
            _ => sanitized.push(ch),
        }
    }

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let data = Bytes::from("jpeg bytes");
        let storage_ref = store.save(data.clone(), "my desk lamp.jpg").await.unwrap();

        let (timestamp, rest) = storage_ref.as_str().split_once('-').unwrap();
        assert!(timestamp.parse::<i64>().is_ok());
        assert_eq!(rest, "my_desk_lamp.jpg");

        let path = store.resolve(&storage_ref).await.unwrap();
        assert!(path.starts_with(store.base_path()));
        assert_eq!(store.read(&storage_ref).await.unwrap(), data);

        store.delete(&storage_ref).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            store.resolve(&storage_ref).await,
            Err(InventoryError::PhotoNotFound(_))
        ));

        // Deleting again is a no-op
        store.delete(&storage_ref).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let first = store.save(Bytes::from("first"), "a.jpg").await.unwrap();
        let second = store.save(Bytes::from("second"), "a.jpg").await.unwrap();
        assert_ne!(first, second);

        assert_eq!(store.read(&first).await.unwrap(), Bytes::from("first"));
        assert_eq!(store.read(&second).await.unwrap(), Bytes::from("second"));

        let entries = std::fs::read_dir(store.base_path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("cache").join("photos");

        let store = FsBlobStore::new(root.clone()).unwrap();
        assert!(root.is_dir());
        assert!(store.base_path().is_absolute());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a  b\t\nc.png"), "a_b_c.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..\\boot.ini"), "_boot.ini");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("..."), "upload");
    }

    #[test]
    fn test_storage_ref_rejects_traversal() {
        assert!(StorageRef::parse("1700000000000-a.jpg").is_ok());
        assert!(StorageRef::parse("").is_err());
        assert!(StorageRef::parse("..").is_err());
        assert!(StorageRef::parse("../secret").is_err());
        assert!(StorageRef::parse("a\\b").is_err());
    }
}
