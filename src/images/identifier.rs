//! Image identifier codec
//!
//! A public identifier has the form `<nanos>-<YYYYMMDD><ext>` and describes its
//! own storage location, `images/<YYYY>/<MM>/<DD>/<nanos><ext>`. Nothing else is
//! needed to find an image: no index, no database.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use thiserror::Error;

/// Directory below the upload root holding every image
pub const IMAGE_DIR: &str = "images";

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),
}

/// Upload moment as nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CreationInstant(i64);

impl CreationInstant {
    /// Returns `None` for instants before the epoch or outside the i64 nanosecond range.
    pub fn from_datetime(at: DateTime<Utc>) -> Option<Self> {
        at.timestamp_nanos_opt().filter(|nanos| *nanos >= 0).map(Self)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// The following nanosecond, used to step past a filename collision
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// UTC calendar day as `YYYYMMDD`
    pub fn date_shard(self) -> String {
        let at = self.to_datetime();
        format!("{:04}{:02}{:02}", at.year(), at.month(), at.day())
    }
}

/// Public handle returned to clients after an upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    /// Encode an instant and extension into an identifier and its storage path.
    ///
    /// `extension` keeps its leading `.` and may be empty. Both outputs are
    /// derived from the same instant, so the date shard in the identifier always
    /// names the directory the file is written to.
    pub fn encode(instant: CreationInstant, extension: &str) -> (ImageId, StoragePath) {
        let stem = instant.as_nanos().to_string();
        let shard = instant.date_shard();

        let id = ImageId(format!("{}-{}{}", stem, shard, extension));
        let path = StoragePath::from_parts(&shard, &stem, extension);
        (id, path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of an image relative to the upload root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath(String);

impl StoragePath {
    /// `shard` must be an 8 digit `YYYYMMDD` string.
    fn from_parts(shard: &str, stem: &str, extension: &str) -> Self {
        Self(format!(
            "{}/{}/{}/{}/{}{}",
            IMAGE_DIR,
            &shard[0..4],
            &shard[4..6],
            &shard[6..8],
            stem,
            extension
        ))
    }

    /// Resolve a public identifier to its storage path.
    ///
    /// The decode is structural only. The stem before the first `-` is reused
    /// verbatim as the file name and is never checked against the date shard,
    /// so a mismatched pair yields a path that simply does not exist.
    pub fn decode(identifier: &str) -> Result<Self, CodecError> {
        let malformed = || CodecError::MalformedIdentifier(identifier.to_string());

        let (stem, rest) = identifier.split_once('-').ok_or_else(malformed)?;

        // No `.` at all means the upload had no extension.
        let (shard, extension) = match rest.rfind('.') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        if shard.len() != 8 || !shard.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        if stem.is_empty() || !is_safe_component(stem) || !is_safe_component(extension) {
            return Err(malformed());
        }

        let file_name = format!("{}{}", stem, extension);
        if file_name == "." || file_name == ".." {
            return Err(malformed());
        }

        Ok(Self::from_parts(shard, stem, extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `images/YYYY/MM/DD` directory portion
    pub fn dir(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extension of an uploaded file name, from the last `.` of its final path
/// component onward. Empty when there is none.
pub fn extension_of(file_name: &str) -> &str {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);

    base.rfind('.').map_or("", |idx| &base[idx..])
}

/// True when `part` can be embedded in a file name without leaving its directory.
pub fn is_safe_component(part: &str) -> bool {
    !part.contains(|c| c == '/' || c == '\\' || c == '\0')
}
