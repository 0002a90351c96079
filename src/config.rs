//! Configuration management for the image server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::images::MAX_IMAGE_SIZE;

/// Multipart bodies are accepted up to 10MB, leaving room for framing around a 2MB image.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Upload root; images go to `<root>/images`
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Largest declared image size accepted, in bytes
    pub max_image_size: u64,
    /// Largest request body accepted on the upload route, in bytes
    pub body_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                root: PathBuf::from("uploads"),
            },
            upload: UploadConfig {
                max_image_size: MAX_IMAGE_SIZE,
                body_limit: DEFAULT_BODY_LIMIT,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source; unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                root: lookup("UPLOAD_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.root),
            },
            upload: UploadConfig {
                max_image_size: parse_var(&lookup, "MAX_IMAGE_SIZE", defaults.upload.max_image_size)?,
                body_limit: parse_var(&lookup, "MAX_BODY_SIZE", defaults.upload.body_limit)?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}
