//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::images::{Clock, ImageService};
use crate::storage::ImageStorage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    images: ImageService,
}

impl AppState {
    /// Create a new application state
    ///
    /// The storage backend is expected to be rooted at `config.storage.root`.
    pub fn new(config: Config, storage: Arc<dyn ImageStorage>, clock: Arc<dyn Clock>) -> Self {
        let images = ImageService::new(storage, clock, config.upload.max_image_size);

        Self {
            inner: Arc::new(AppStateInner { config, images }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the image service
    pub fn images(&self) -> &ImageService {
        &self.inner.images
    }
}
