//! Blob store for basinio.
//!
//! A blob file is an opaque, append-only byte stream without a header. The
//! only structure it has is what the XML index records about it: for every
//! payload a [`BlobDescriptor`] carrying the file, byte offset, byte size,
//! compression kind and, for grids, the element ordering.
//!
//! # Architecture
//!
//! - [`BlobWriter`] -- single-owner append path; payloads are either written
//!   at once or queued, compressed in parallel, then flushed in order
//! - [`BlobReader`] -- read path; raw reads are separated from decoding so a
//!   scheduler can batch disk access and decompress on worker threads
//! - [`codec`] -- float/byte conversion, gzip, checksums
//! - [`record`] -- fixed-size little-endian record tables
//!
//! # Design Rules
//!
//! 1. Writes only ever append; the writer never seeks backward.
//! 2. Only the writer's owner advances its offset, even when compression
//!    of queued payloads happened on other threads.
//! 3. A writer that never wrote a byte deletes its file on close.
//! 4. A missing file on read is a hard error.

pub mod codec;
pub mod descriptor;
pub mod reader;
pub mod record;
pub mod writer;

pub use descriptor::BlobDescriptor;
pub use reader::BlobReader;
pub use record::{decode_records, encode_records, put_fixed_str, FixedRecord, RecordCursor};
pub use writer::{BlobWriter, PayloadTicket, PendingPayload, DEFAULT_MIN_BYTES_TO_COMPRESS};
