// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for nestpm
#[derive(Error, Debug)]
pub enum Error {
    /// Registry metadata unavailable or specifier unresolvable
    #[error("Lookup failed for {package}: {reason}")]
    Lookup { package: String, reason: String },

    /// Transport failure while downloading a tarball
    #[error("Download error: {0}")]
    Download(String),

    /// Archive corrupt, undecodable, or not laid out as a single root directory
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Downloaded tarball does not match the registry's integrity string
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Moving an extracted package into place failed after retries
    #[error("Failed to move {} to {} after {attempts} attempt(s): {source}", .from.display(), .to.display())]
    Placement {
        from: PathBuf,
        to: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Dependency chain nested deeper than the resolver allows
    #[error("Dependency chain too deep at {package} (depth {depth})")]
    DepthExceeded { package: String, depth: usize },

    /// package.json missing, malformed, or not editable
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using nestpm's Error type
pub type Result<T> = std::result::Result<T, Error>;
