//! Error types for the tribak library
//!
//! Every failure of a backup or restore call is reported through
//! [`TribakError`]. Variants are grouped into four coarse categories,
//! exposed through [`TribakError::kind`], so callers that only care about
//! "what went wrong" at a high level do not need to match every variant.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the tribak library
pub type Result<T> = std::result::Result<T, TribakError>;

/// Coarse classification of a [`TribakError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty, non-absolute or unmountable path
    Path,
    /// Reading, writing, hashing or copying failed
    Io,
    /// A meta record could not be understood
    Format,
    /// Invalid configuration
    Config,
}

/// Main error type for all tribak operations
#[derive(Debug, Error)]
pub enum TribakError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while reading a JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The path given to backup/restore was empty
    #[error("Path is empty")]
    EmptyPath,

    /// The path given to backup/restore was not absolute
    #[error("Path is not absolute: {0}")]
    NotAbsolute(String),

    /// No mount point contains the path
    #[error("No mount point found for {0}")]
    NoMountPoint(String),

    /// The path is not valid UTF-8
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// The path contains the meta record field delimiter
    #[error("Path cannot be stored in a meta record: {0}")]
    UnencodablePath(String),

    /// The source file could not be hashed
    #[error("Failed to hash {path:?}: {source}")]
    HashFailed {
        /// File being hashed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Copying file content failed
    #[error("Failed to copy {src:?} to {dst:?}: {source}")]
    CopyFailed {
        /// Copy source
        src: PathBuf,
        /// Copy destination
        dst: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The record references a generation whose data file is gone
    #[error("Generation {slot} data file is missing: {path:?}")]
    MissingGeneration {
        /// Slot number (1-3)
        slot: usize,
        /// Expected data file
        path: PathBuf,
    },

    /// No generation is retained for the file
    #[error("Nothing to restore for {0}")]
    NothingToRestore(String),

    /// Meta record carries a version this build does not understand
    #[error("Unsupported meta record version: {0}")]
    UnsupportedVersion(String),

    /// Meta record has the wrong number of fields for its version
    #[error("Meta record version {version} expects {expected} fields, found {actual}")]
    FieldCount {
        /// Record version
        version: u32,
        /// Fields required by the version
        expected: usize,
        /// Fields present
        actual: usize,
    },

    /// A meta record field could not be parsed
    #[error("Invalid meta record field {field}: {value:?}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Raw field value
        value: String,
    },

    /// A meta record was stored under a path hash that does not match its content
    #[error("Path hash mismatch - expected: {expected}, actual: {actual}")]
    PathHashMismatch {
        /// Hash the record was looked up by
        expected: String,
        /// Hash stored inside the record
        actual: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TribakError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        TribakError::InvalidConfiguration(msg.into())
    }

    /// Create an invalid field error
    pub fn invalid_field(field: &'static str, value: impl Into<String>) -> Self {
        TribakError::InvalidField {
            field,
            value: value.into(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TribakError::EmptyPath
            | TribakError::NotAbsolute(_)
            | TribakError::NoMountPoint(_)
            | TribakError::PathConversion(_)
            | TribakError::UnencodablePath(_) => ErrorKind::Path,
            TribakError::Io(_)
            | TribakError::HashFailed { .. }
            | TribakError::CopyFailed { .. }
            | TribakError::MissingGeneration { .. }
            | TribakError::NothingToRestore(_) => ErrorKind::Io,
            TribakError::UnsupportedVersion(_)
            | TribakError::FieldCount { .. }
            | TribakError::InvalidField { .. }
            | TribakError::PathHashMismatch { .. } => ErrorKind::Format,
            TribakError::Json(_) | TribakError::InvalidConfiguration(_) => ErrorKind::Config,
        }
    }

    /// Check if this error means a meta record was unreadable as a record
    pub fn is_format(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TribakError::NotAbsolute(path) => {
                format!("'{}' is not an absolute path. Pass a path starting with '/'.", path)
            }
            TribakError::NoMountPoint(path) => {
                format!(
                    "Could not find the volume holding '{}'. Check that the mount table is readable.",
                    path
                )
            }
            TribakError::NothingToRestore(path) => {
                format!("No backup exists for '{}'. Run a backup first.", path)
            }
            TribakError::UnencodablePath(path) => {
                format!(
                    "'{}' contains the sequence '{{]', which cannot be stored in a backup record. Rename the file to back it up.",
                    path
                )
            }
            TribakError::MissingGeneration { slot, path } => {
                format!(
                    "Backup generation {} was expected at {:?} but is gone. The backup directory may have been cleaned up.",
                    slot, path
                )
            }
            _ => self.to_string(),
        }
    }
}
