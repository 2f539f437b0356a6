use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use basinio_types::{BasinError, BasinResult, Compression};
use tracing::debug;

use crate::codec;
use crate::descriptor::BlobDescriptor;

/// Random-access reader over one blob file.
///
/// Reading is split in two steps: [`BlobReader::read_raw`] pulls the stored
/// bytes off disk and [`BlobReader::decode`] turns them into floats. The
/// second step is CPU-bound and does not need the file.
#[derive(Debug)]
pub struct BlobReader {
    path: PathBuf,
    file: BufReader<File>,
    reads: u64,
}

impl BlobReader {
    /// Open a blob file. A missing file is an error.
    pub fn open(path: &Path) -> BasinResult<Self> {
        if !path.exists() {
            return Err(BasinError::MissingFile(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            reads: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of raw reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Read exactly `descriptor.size` bytes at `descriptor.offset`.
    pub fn read_raw(&mut self, descriptor: &BlobDescriptor) -> BasinResult<Vec<u8>> {
        let size = usize::try_from(descriptor.size)
            .map_err(|_| BasinError::Allocation(usize::MAX))?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).map_err(|_| BasinError::Allocation(size / 4))?;
        bytes.resize(size, 0);

        self.file.seek(SeekFrom::Start(descriptor.offset))?;
        self.file.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BasinError::Format(format!(
                    "{} ends before byte {}",
                    self.path.display(),
                    descriptor.end()
                ))
            } else {
                e.into()
            }
        })?;
        self.reads += 1;

        if let Some(expected) = descriptor.checksum {
            let computed = codec::checksum(&bytes);
            if computed != expected {
                return Err(BasinError::ChecksumMismatch {
                    path: self.path.clone(),
                    offset: descriptor.offset,
                    expected,
                    computed,
                });
            }
        }
        debug!(path = %self.path.display(), offset = descriptor.offset, size, "blob read");
        Ok(bytes)
    }

    /// Decode raw stored bytes into floats.
    ///
    /// `expected_floats` checks the element count when the caller knows it.
    pub fn decode(
        descriptor: &BlobDescriptor,
        raw: Vec<u8>,
        expected_floats: Option<usize>,
    ) -> BasinResult<Vec<f32>> {
        let bytes = match descriptor.compression {
            Compression::None => raw,
            Compression::Gzip => codec::gzip_decompress(&raw, expected_floats.map(|n| n * 4))?,
        };
        let values = codec::bytes_to_floats(&bytes)?;
        if let Some(expected) = expected_floats {
            if values.len() != expected {
                return Err(BasinError::Format(format!(
                    "payload holds {} values, expected {expected}",
                    values.len()
                )));
            }
        }
        Ok(values)
    }

    /// Decode a stored byte payload (record tables) without float conversion.
    pub fn decode_bytes(descriptor: &BlobDescriptor, raw: Vec<u8>) -> BasinResult<Vec<u8>> {
        match descriptor.compression {
            Compression::None => Ok(raw),
            Compression::Gzip => codec::gzip_decompress(&raw, None),
        }
    }

    /// Read and decode one payload.
    pub fn get_data(&mut self, descriptor: &BlobDescriptor) -> BasinResult<Vec<f32>> {
        let raw = self.read_raw(descriptor)?;
        Self::decode(descriptor, raw, None)
    }

    /// Read and decode one byte payload.
    pub fn get_bytes(&mut self, descriptor: &BlobDescriptor) -> BasinResult<Vec<u8>> {
        let raw = self.read_raw(descriptor)?;
        Self::decode_bytes(descriptor, raw)
    }
}
