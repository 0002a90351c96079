//! Image identifiers and the upload/fetch protocol
//!
//! - `identifier`: pure codec between public identifiers and storage paths
//! - `clock`: source of upload instants
//! - `service`: validation, naming and storage orchestration

pub mod clock;
pub mod identifier;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use identifier::{CodecError, CreationInstant, ImageId, StoragePath, IMAGE_DIR};
pub use service::{ImageService, IncomingImage, MAX_IMAGE_SIZE};
