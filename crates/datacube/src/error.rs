//! Error types for cube construction and evaluation.

use cube_common::{CrsError, TimeError};
use thiserror::Error;

/// Errors raised by cube nodes and the query engines built on them.
#[derive(Error, Debug)]
pub enum CubeError {
    /// Malformed input, rejected before any work begins.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required capability, CRS or dataset property is missing.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Coordinate transformation failed.
    #[error("coordinate transformation failed: {0}")]
    Transform(String),

    /// Reading or computing a single chunk failed.
    #[error("failed to read chunk {chunk_id}: {message}")]
    ChunkRead { chunk_id: u32, message: String },

    /// Storage/IO error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Construction record or metadata could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Zarr format error.
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Crs(#[from] CrsError),
}

impl CubeError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a Transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    /// Create a ChunkRead error.
    pub fn chunk_read(chunk_id: u32, msg: impl Into<String>) -> Self {
        Self::ChunkRead {
            chunk_id,
            message: msg.into(),
        }
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Attribute this error to chunk `chunk_id`, unless it already names a chunk.
    pub fn in_chunk(self, chunk_id: u32) -> Self {
        match self {
            Self::ChunkRead { .. } => self,
            other => Self::chunk_read(chunk_id, other.to_string()),
        }
    }
}

impl From<std::io::Error> for CubeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CubeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cube operations.
pub type Result<T> = std::result::Result<T, CubeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_chunk_names_chunk_once() {
        let e = CubeError::chunk_read(3, "boom").in_chunk(3);
        assert_eq!(e.to_string(), "failed to read chunk 3: boom");

        let e = CubeError::storage("bad codec").in_chunk(7);
        assert!(matches!(e, CubeError::ChunkRead { chunk_id: 7, .. }));
        assert_eq!(e.to_string(), "failed to read chunk 7: storage error: bad codec");
    }
}
