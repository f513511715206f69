//! Centralized error types for eaxstag.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the eaxstag library.
#[derive(Error, Debug)]
pub enum TagError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source EAXS file does not exist.
    #[error("EAXS file not found: {0}")]
    SourceNotFound(PathBuf),

    /// The destination file is already present. Checked before any output
    /// resource is opened.
    #[error("Destination file already exists: {0}")]
    DestinationExists(PathBuf),

    /// The directory that should contain the destination file is missing.
    #[error("Destination folder does not exist: {0}")]
    DestinationDirMissing(PathBuf),

    /// A structural XML error while reading or writing an archive.
    #[error("XML error in '{path}': {reason}")]
    Xml { path: PathBuf, reason: String },

    /// A message body failed to decode from its transfer encoding.
    #[error("Content decoding error: {0}")]
    Decode(String),

    /// A message lacks the structure needed to splice tagged content into it.
    #[error("Malformed <Message> element: {0}")]
    MalformedMessage(String),

    /// Text still contains characters illegal in XML after one sanitize pass.
    #[error("Text contains characters illegal in XML")]
    IllegalText,
}

/// Convenience alias for `Result<T, TagError>`.
pub type Result<T> = std::result::Result<T, TagError>;

impl TagError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `Xml` variant from a path and any displayable reason.
    pub fn xml(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Xml {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `TagError`
/// when no path context is available (rare; prefer `TagError::io`).
impl From<std::io::Error> for TagError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
