use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FastBrewError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("unknown package: {0} - try 'fastbrew search {0}' to find the correct name")]
    UnknownPackage(String),

    #[error("no bottle available for {name} on platform {platform} (available: {available})")]
    NoBottleForPlatform {
        name: String,
        platform: String,
        available: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api returned status {status} for {name}")]
    ApiStatus { name: String, status: u16 },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsupported compression format (magic: {0})")]
    UnsupportedFormat(String),

    #[error("unsafe archive entry: {0}")]
    ExtractionUnsafe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid download state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("corrupt cache file {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} package(s) failed during {phase}")]
    PartialFailure {
        phase: &'static str,
        failed: usize,
        total: usize,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FastBrewError>;
