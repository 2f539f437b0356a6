use std::path::PathBuf;

use thiserror::Error;

/// Errors produced anywhere in the storage and serialization core.
///
/// The core never recovers locally: every variant propagates to the caller
/// and aborts the surrounding batch (import, export, or retrieval).
#[derive(Debug, Error)]
pub enum BasinError {
    /// A required argument was empty or out of range at construction time.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An accessor was called on a unit that is neither resident nor constant.
    #[error("{accessor} called on {unit} that has not been retrieved")]
    NotRetrieved {
        accessor: &'static str,
        unit: &'static str,
    },

    /// A backing blob file or dataset does not exist.
    #[error("cannot open {}: file does not exist", .0.display())]
    MissingFile(PathBuf),

    /// The same item was added twice to a container.
    #[error("cannot add {0} twice")]
    Duplicate(String),

    /// A named item could not be resolved.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The XML index was written by an incompatible format version.
    #[error("xml format not {direction} compatible (found {found}, supported {supported})")]
    IncompatibleVersion {
        direction: &'static str,
        found: String,
        supported: String,
    },

    /// Formation volumes do not form one contiguous k-range.
    #[error("non-continuous volume found: {0}")]
    NonContinuous(String),

    /// A resident buffer could not be allocated.
    #[error("cannot allocate buffer of {0} floats")]
    Allocation(usize),

    /// Compressing or decompressing a payload failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Stored bytes do not match the checksum recorded in the index.
    #[error("checksum mismatch in {} at offset {offset}: expected {expected:08x}, computed {computed:08x}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        offset: u64,
        expected: u32,
        computed: u32,
    },

    /// A payload or record table does not have the expected shape.
    #[error("format error: {0}")]
    Format(String),

    /// The XML index could not be parsed or written.
    #[error("xml error: {0}")]
    Xml(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BasinError {
    /// Shorthand for [`BasinError::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result alias for basinio operations.
pub type BasinResult<T> = Result<T, BasinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message() {
        let err = BasinError::Duplicate("snapshot".into());
        assert_eq!(err.to_string(), "cannot add snapshot twice");
    }

    #[test]
    fn not_retrieved_names_accessor() {
        let err = BasinError::NotRetrieved {
            accessor: "value",
            unit: "map",
        };
        assert!(err.to_string().contains("value"));
        assert!(err.to_string().contains("map"));
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: BasinError = io.into();
        assert!(matches!(err, BasinError::Io(_)));
    }
}
