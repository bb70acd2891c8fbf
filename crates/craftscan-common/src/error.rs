//! Error types shared by the craftscan crates.

use thiserror::Error;

/// Top-level error type for craftscan operations.
#[derive(Debug, Error)]
pub enum CraftscanError {
    /// Catalog lookup errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// Errors raised while resolving codes against the item catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Code is not known to the catalog
    #[error("Unknown item code: {0}")]
    UnknownCode(String),

    /// Code could not be parsed
    #[error("Malformed item code: {0}")]
    MalformedCode(String),

    /// Class integer outside the known range
    #[error("Unknown item class: {0}")]
    UnknownClass(i32),

    /// Class name not recognized
    #[error("Unknown item class name: {0}")]
    UnknownClassName(String),
}

/// Result type alias for craftscan operations.
pub type CraftscanResult<T> = Result<T, CraftscanError>;
