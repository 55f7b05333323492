//! Error type for machine construction, configuration and image loading.
//!
//! Nothing on the tick path returns an error: bus accesses always succeed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeastError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration parse error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("ROM image is {actual} bytes, at most {expected} fit")]
    RomImageSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, BeastError>;
