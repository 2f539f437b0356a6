use std::path::{Path, PathBuf};

use basinio_types::{Compression, Layout};
use serde::{Deserialize, Serialize};

/// Location and encoding of one payload inside a blob file.
///
/// Descriptors are produced once per written payload and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Absolute or caller-resolved path of the blob file.
    pub path: PathBuf,
    /// Byte offset of the payload.
    pub offset: u64,
    /// Number of stored bytes (after compression).
    pub size: u64,
    pub compression: Compression,
    /// Element ordering for grid payloads; `None` for record tables.
    pub layout: Option<Layout>,
    /// CRC32 of the stored bytes, when known.
    pub checksum: Option<u32>,
}

impl BlobDescriptor {
    pub fn new(path: impl Into<PathBuf>, offset: u64, size: u64, compression: Compression) -> Self {
        Self {
            path: path.into(),
            offset,
            size,
            compression,
            layout: None,
            checksum: None,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn file(&self) -> &Path {
        &self.path
    }

    /// Exclusive end of the byte range.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}
