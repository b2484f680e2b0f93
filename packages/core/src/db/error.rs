//! Store Error Types
//!
//! This module defines error types for guide persistence, covering snapshot
//! reads, writes and (de)serialization.

use std::path::PathBuf;
use thiserror::Error;

/// Guide store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading a snapshot failed
    #[error("Failed to read guide snapshot at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing a snapshot failed
    #[error("Failed to write guide snapshot at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Snapshot content could not be (de)serialized
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot belongs to another guide
    #[error("Snapshot belongs to guide {found}, expected guide {expected}")]
    GuideMismatch { expected: u64, found: u64 },
}

impl StoreError {
    /// Create a read failed error
    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a write failed error
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}
