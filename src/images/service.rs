//! Upload and fetch protocol
//!
//! Validates incoming images, names them from a single clock reading and hands
//! the bytes to storage. Fetches go the other way through the identifier codec.

use std::io;
use std::sync::Arc;

use axum::{body::Bytes, extract::Request, response::Response};

use super::clock::Clock;
use super::identifier::{extension_of, is_safe_component, CreationInstant, ImageId, StoragePath};
use crate::error::{AppError, Result};
use crate::storage::ImageStorage;

/// Maximum declared image size: 2MB
pub const MAX_IMAGE_SIZE: u64 = 2 * 1024 * 1024;

/// How many times a taken file name is stepped past before giving up
const MAX_NAME_ATTEMPTS: usize = 16;

/// An image received from a client
#[derive(Debug, Clone)]
pub struct IncomingImage {
    /// File name as sent by the client
    pub file_name: String,

    /// Content type as sent by the client, never sniffed
    pub content_type: Option<String>,

    /// Size the client declared for the image
    pub declared_size: u64,

    pub data: Bytes,
}

/// Upload/fetch orchestration over a storage backend
#[derive(Clone)]
pub struct ImageService {
    storage: Arc<dyn ImageStorage>,
    clock: Arc<dyn Clock>,
    max_image_size: u64,
}

impl ImageService {
    pub fn new(storage: Arc<dyn ImageStorage>, clock: Arc<dyn Clock>, max_image_size: u64) -> Self {
        Self {
            storage,
            clock,
            max_image_size,
        }
    }

    /// Validate and store an uploaded image, returning its public identifier
    pub async fn accept(&self, image: IncomingImage) -> Result<ImageId> {
        let content_type = image.content_type.as_deref().unwrap_or_default();
        if !is_image_content_type(content_type) {
            return Err(AppError::UnsupportedMediaType(content_type.to_string()));
        }

        if image.declared_size > self.max_image_size {
            return Err(AppError::PayloadTooLarge {
                size: image.declared_size,
                max: self.max_image_size,
            });
        }

        let extension = extension_of(&image.file_name);
        if !is_safe_component(extension) {
            return Err(AppError::InvalidInput(format!(
                "Invalid file name: {}",
                image.file_name
            )));
        }

        // One reading per upload; the identifier and the directory both come from it.
        let captured = self.clock.now();
        let mut instant = CreationInstant::from_datetime(captured).ok_or(AppError::Clock(captured))?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let (id, path) = ImageId::encode(instant, extension);

            self.storage.ensure_dir(&path).await?;

            let mut body: &[u8] = &image.data;
            match self.storage.write_new(&path, &mut body).await {
                Ok(written) => {
                    tracing::info!(
                        identifier = %id,
                        storage_path = %path,
                        size = written,
                        content_type = %content_type,
                        "Image stored"
                    );
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(storage_path = %path, "File name taken, advancing instant");
                    // Re-encoding recomputes the date shard, so a step across midnight stays consistent.
                    instant = instant.next().ok_or(AppError::Clock(captured))?;
                }
                Err(e) => return Err(AppError::StorageFailure(e)),
            }
        }

        Err(AppError::StorageFailure(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free file name for upload instant",
        )))
    }

    /// Resolve an identifier to the path of a stored image.
    ///
    /// Malformed identifiers, missing files and paths the filesystem refuses
    /// to look up (over-long names and the like) are all `NotFound`.
    pub async fn resolve(&self, identifier: &str) -> Result<StoragePath> {
        let path = StoragePath::decode(identifier).map_err(|e| {
            tracing::debug!("{}", e);
            AppError::NotFound
        })?;

        let exists = self.storage.exists(&path).await.unwrap_or_else(|e| {
            tracing::debug!(storage_path = %path, error = %e, "Existence check failed");
            false
        });

        if !exists {
            tracing::debug!(identifier = %identifier, storage_path = %path, "Image not found");
            return Err(AppError::NotFound);
        }

        Ok(path)
    }

    /// Stream the image behind `identifier` in answer to `request`
    pub async fn fetch(&self, identifier: &str, request: Request) -> Result<Response> {
        let path = self.resolve(identifier).await?;
        Ok(self.storage.serve(&path, request).await?)
    }
}

/// Substring match on the client-declared type. `x-image/foo` passes, bytes are never inspected.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.contains("image/")
}
