//! Local filesystem storage
//!
//! Images live under `<root>/images/YYYY/MM/DD/`.

use std::io;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::Response,
};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::ImageStorage;
use crate::images::{StoragePath, IMAGE_DIR};

/// Filesystem-based image storage
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    root: PathBuf,
}

impl LocalImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the image directory so a fresh deployment starts with the full layout
    pub async fn init(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(IMAGE_DIR)).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &StoragePath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

#[async_trait::async_trait]
impl ImageStorage for LocalImageStorage {
    async fn ensure_dir(&self, path: &StoragePath) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(path.dir())).await
    }

    async fn write_new(
        &self,
        path: &StoragePath,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<u64> {
        let full_path = self.full_path(path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await?;

        let copied = async {
            let written = tokio::io::copy(body, &mut file).await?;
            file.flush().await?;
            Ok::<_, io::Error>(written)
        }
        .await;

        if copied.is_err() {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(&full_path).await {
                tracing::warn!(
                    path = %full_path.display(),
                    error = %e,
                    "Failed to remove partial upload"
                );
            }
        }

        copied
    }

    async fn exists(&self, path: &StoragePath) -> io::Result<bool> {
        match tokio::fs::metadata(self.full_path(path)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn serve(&self, path: &StoragePath, request: Request) -> io::Result<Response> {
        let response = match ServeFile::new(self.full_path(path)).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        read_result(path, response.map(Body::new))
    }
}

/// ServeFile reports read failures as a bare 500; surface those as errors.
fn read_result(path: &StoragePath, response: Response) -> io::Result<Response> {
    if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
        return Err(io::Error::other(format!("failed to read {}", path)));
    }

    Ok(response)
}
