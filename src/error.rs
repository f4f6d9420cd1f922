//! Error types for the photosearch library.
//!
//! All fallible operations return [`Result`], with [`PhotosearchError`] as the
//! error type. The variants follow the subsystem boundaries: encoding, index
//! maintenance, snapshot persistence, durable record storage, and query
//! validation.
//!
//! # Examples
//!
//! ```
//! use photosearch::error::{PhotosearchError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PhotosearchError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for photosearch operations.
#[derive(Error, Debug)]
pub enum PhotosearchError {
    /// I/O errors (snapshot files, image reads, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding errors (corrupt image data, model failures).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Index-related errors.
    #[error("Index error: {0}")]
    Index(String),

    /// Snapshot read/write errors.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Durable record store errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Query-related errors (invalid requests, scope violations).
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PhotosearchError.
pub type Result<T> = std::result::Result<T, PhotosearchError>;

impl PhotosearchError {
    /// Create a new encoding error.
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Encoding(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Index(msg.into())
    }

    /// Create a new snapshot error.
    pub fn snapshot<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Snapshot(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Storage(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Query(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Other(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Query(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PhotosearchError::Other(format!("Not found: {}", msg.into()))
    }
}
