//! External collaborators: product image storage and order notifications.
//!
//! Both sit outside the storage transaction. Callers treat their failures as
//! best-effort where the surrounding operation has already committed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use shopswift_core::{DomainError, ProductId};
use shopswift_orders::Order;

use crate::error::{ServiceError, ServiceResult};

/// Upper bound on an uploaded image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted image formats.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageType {
    Jpeg,
    Png,
    Webp,
}

impl ImageType {
    /// Parse a `Content-Type` value; parameters such as `; charset=...` are ignored.
    pub fn from_content_type(content_type: &str) -> Result<Self, DomainError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" => Ok(ImageType::Jpeg),
            "image/png" => Ok(ImageType::Png),
            "image/webp" => Ok(ImageType::Webp),
            _ => Err(DomainError::validation(
                "invalid file type; allowed: image/jpeg, image/png, image/webp",
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
            ImageType::Webp => "webp",
        }
    }
}

/// Check an upload before it is handed to storage.
pub fn validate_image(bytes: &[u8]) -> Result<(), DomainError> {
    if bytes.is_empty() {
        return Err(DomainError::validation("image is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(DomainError::validation(format!(
            "image exceeds {MAX_IMAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

fn file_name(product_id: ProductId, image_type: ImageType) -> String {
    format!(
        "{product_id}_{}.{}",
        uuid::Uuid::now_v7().simple(),
        image_type.extension()
    )
}

/// Stores product images and hands back the URI to record on the product.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn store(
        &self,
        product_id: ProductId,
        image_type: ImageType,
        bytes: &[u8],
    ) -> ServiceResult<String>;

    /// Remove a previously stored image. Unknown URIs are ignored.
    async fn remove(&self, uri: &str) -> ServiceResult<()>;
}

/// Images as files in a local directory, served under `base_uri`.
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    dir: PathBuf,
    base_uri: String,
}

impl LocalImageStorage {
    pub fn new(dir: impl Into<PathBuf>, base_uri: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a URI this storage issued, if it is one.
    fn path_for(&self, uri: &str) -> Option<PathBuf> {
        let name = uri.strip_prefix(&self.base_uri)?.strip_prefix('/')?;
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        plain.then(|| self.dir.join(name))
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn store(
        &self,
        product_id: ProductId,
        image_type: ImageType,
        bytes: &[u8],
    ) -> ServiceResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ServiceError::External(format!("create upload dir: {e}")))?;

        let name = file_name(product_id, image_type);
        tokio::fs::write(self.dir.join(&name), bytes)
            .await
            .map_err(|e| ServiceError::External(format!("write image {name}: {e}")))?;
        Ok(format!("{}/{name}", self.base_uri))
    }

    async fn remove(&self, uri: &str) -> ServiceResult<()> {
        let Some(path) = self.path_for(uri) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::External(format!(
                "remove image {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory image storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryImageStorage {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageStorage for InMemoryImageStorage {
    async fn store(
        &self,
        product_id: ProductId,
        image_type: ImageType,
        bytes: &[u8],
    ) -> ServiceResult<String> {
        let uri = format!("memory://{}", file_name(product_id, image_type));
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.clone(), bytes.to_vec());
        Ok(uri)
    }

    async fn remove(&self, uri: &str) -> ServiceResult<()> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri);
        Ok(())
    }
}

/// Told about every committed order (confirmation email and the like).
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_placed(&self, order: &Order) -> ServiceResult<()>;
}

/// Default notifier: writes a log line per order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_placed(&self, order: &Order) -> ServiceResult<()> {
        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = %order.total_amount,
            "order confirmation queued"
        );
        Ok(())
    }
}

/// Records notified orders, for tests/dev.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    orders: Mutex<Vec<Order>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn order_placed(&self, order: &Order) -> ServiceResult<()> {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(order.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_are_restricted() {
        assert_eq!(ImageType::from_content_type("image/png").unwrap(), ImageType::Png);
        assert_eq!(
            ImageType::from_content_type("IMAGE/JPEG; charset=binary").unwrap(),
            ImageType::Jpeg
        );
        assert_eq!(ImageType::from_content_type("image/webp").unwrap().extension(), "webp");
        assert!(matches!(
            ImageType::from_content_type("image/gif"),
            Err(DomainError::Validation(_))
        ));
        assert!(ImageType::from_content_type("").is_err());
    }

    #[test]
    fn empty_and_oversized_images_are_rejected() {
        assert!(validate_image(&[]).is_err());
        assert!(validate_image(&vec![0u8; MAX_IMAGE_BYTES + 1]).is_err());
        assert!(validate_image(&[1, 2, 3]).is_ok());
    }

    #[test]
    fn local_storage_only_resolves_its_own_plain_file_names() {
        let storage = LocalImageStorage::new("/srv/uploads", "/uploads/products/");
        assert_eq!(
            storage.path_for("/uploads/products/a.png"),
            Some(PathBuf::from("/srv/uploads/a.png"))
        );
        assert_eq!(storage.path_for("/uploads/products/../secret"), None);
        assert_eq!(storage.path_for("/uploads/products/.."), None);
        assert_eq!(storage.path_for("https://cdn.example.com/a.png"), None);
    }

    #[tokio::test]
    async fn local_storage_writes_and_removes_files() {
        let dir = std::env::temp_dir().join(format!("shopswift-images-{}", uuid::Uuid::now_v7()));
        let storage = LocalImageStorage::new(&dir, "/uploads/products");
        let product_id = ProductId::new();

        let uri = storage.store(product_id, ImageType::Png, b"png-bytes").await.unwrap();
        assert!(uri.starts_with("/uploads/products/"));
        assert!(uri.ends_with(".png"));
        let path = storage.path_for(&uri).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png-bytes");

        storage.remove(&uri).await.unwrap();
        assert!(!path.exists());
        // Second removal is a no-op.
        storage.remove(&uri).await.unwrap();

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn in_memory_storage_round_trips() {
        let storage = InMemoryImageStorage::new();
        let uri = storage.store(ProductId::new(), ImageType::Jpeg, b"jpg").await.unwrap();
        assert_eq!(storage.get(&uri).as_deref(), Some(&b"jpg"[..]));
        storage.remove(&uri).await.unwrap();
        assert!(storage.is_empty());
    }
}
