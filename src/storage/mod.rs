//! Storage backends for uploaded images
//!
//! Backends address images by `StoragePath`, relative to their own root.

mod local;

pub use local::LocalImageStorage;

use std::io;

use axum::{extract::Request, response::Response};
use tokio::io::AsyncRead;

use crate::images::StoragePath;

/// Trait for image storage backends
#[async_trait::async_trait]
pub trait ImageStorage: Send + Sync {
    /// Create the directory holding `path`, including missing parents.
    /// An existing directory is not an error.
    async fn ensure_dir(&self, path: &StoragePath) -> io::Result<()>;

    /// Create `path`, failing with `AlreadyExists` if it is taken, and copy
    /// `body` into it. A failed copy leaves no file behind.
    async fn write_new(
        &self,
        path: &StoragePath,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<u64>;

    /// Check whether an image is stored at `path`
    async fn exists(&self, path: &StoragePath) -> io::Result<bool>;

    /// Stream the image at `path`, honouring conditional and range headers of `request`
    async fn serve(&self, path: &StoragePath, request: Request) -> io::Result<Response>;
}
