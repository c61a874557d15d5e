//! Image persistence collaborator.
//!
//! The upload path hands a finished byte buffer to an [`ImageStore`], which
//! assigns the image ID. [`DiskImageStore`] is the production backend;
//! [`MemoryImageStore`] backs tests and ephemeral deployments.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Errors that can occur while persisting an image.
#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("failed to write image file: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists a finished image buffer and returns its freshly assigned ID.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(
        &self,
        record_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<String, ImageStoreError>;
}

/// Filesystem-backed image store writing `{dir}/{image_id}.{ext}`.
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    #[instrument(skip(self, data), fields(record_id = %record_id, size_bytes = data.len()))]
    async fn save(
        &self,
        record_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<String, ImageStoreError> {
        let image_id = Uuid::new_v4().to_string();
        let path = self
            .dir
            .join(format!("{image_id}.{}", sanitize_extension(image_type)));

        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, &data).await?;

        debug!(path = %path.display(), "image written");
        Ok(image_id)
    }
}

/// An image retained by [`MemoryImageStore`].
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub record_id: String,
    pub image_type: String,
    pub data: Bytes,
}

/// Map-backed image store.
#[derive(Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, StoredImage>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image_id: &str) -> Option<StoredImage> {
        self.images.lock().get(image_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save(
        &self,
        record_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<String, ImageStoreError> {
        let image_id = Uuid::new_v4().to_string();
        self.images.lock().insert(
            image_id.clone(),
            StoredImage {
                record_id: record_id.to_string(),
                image_type: image_type.to_string(),
                data,
            },
        );
        Ok(image_id)
    }
}

/// Reduce a caller-supplied image type tag to a safe file extension.
///
/// Keeps ASCII alphanumerics only, so a hostile tag cannot traverse out of
/// the image directory. Falls back to `bin` for empty results.
fn sanitize_extension(image_type: &str) -> String {
    let ext: String = image_type
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension("jpg"), "jpg");
        assert_eq!(sanitize_extension(".PNG"), "png");
        assert_eq!(sanitize_extension("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_extension(""), "bin");
        assert_eq!(sanitize_extension("//"), "bin");
    }

    #[tokio::test]
    async fn test_disk_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());

        let image_id = store
            .save("r1", "jpg", Bytes::from_static(b"fake image bytes"))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&image_id).is_ok());
        let path = dir.path().join(format!("{image_id}.jpg"));
        let written = std::fs::read(path).unwrap();
        assert_eq!(written, b"fake image bytes");
    }

    #[tokio::test]
    async fn test_disk_store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("images").join("nested");
        let store = DiskImageStore::new(&nested);

        store
            .save("r1", "png", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryImageStore::new();
        let image_id = store
            .save("r1", "png", Bytes::from_static(b"pixels"))
            .await
            .unwrap();

        let stored = store.get(&image_id).unwrap();
        assert_eq!(stored.record_id, "r1");
        assert_eq!(stored.image_type, "png");
        assert_eq!(stored.data, Bytes::from_static(b"pixels"));
        assert_eq!(store.len(), 1);
    }
}
