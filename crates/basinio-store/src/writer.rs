use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use basinio_types::{BasinError, BasinResult, Compression, Layout};
use tracing::{debug, warn};

use crate::codec;
use crate::descriptor::BlobDescriptor;

/// Payloads of this many bytes or fewer are never compressed.
pub const DEFAULT_MIN_BYTES_TO_COMPRESS: usize = 50;

/// Handle to a queued payload, redeemed for its descriptor at flush time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayloadTicket(u64);

impl PayloadTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// A payload waiting to be written.
///
/// Compression is the only mutation and may run on any thread; the bytes
/// are written later by the writer's owner.
#[derive(Debug)]
pub struct PendingPayload {
    ticket: PayloadTicket,
    bytes: Vec<u8>,
    layout: Option<Layout>,
    wants_compression: bool,
    compression: Compression,
    processed: bool,
}

impl PendingPayload {
    pub fn ticket(&self) -> PayloadTicket {
        self.ticket
    }

    /// Gzip the payload if it asked for compression. Idempotent.
    pub fn compress(&mut self) -> BasinResult<()> {
        if self.processed {
            return Ok(());
        }
        if self.wants_compression {
            self.bytes = codec::gzip_compress(&self.bytes)?;
            self.compression = Compression::Gzip;
        }
        self.processed = true;
        Ok(())
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Current byte count: raw before [`Self::compress`], encoded after.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Append-only writer for one blob file.
///
/// Tracks the running offset of the file so every payload can be indexed as
/// a `(offset, size)` range. Dropping or closing a writer that never wrote a
/// byte removes the file.
pub struct BlobWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    offset: u64,
    last_written_size: u64,
    min_bytes_to_compress: usize,
    pending: Vec<PendingPayload>,
    next_ticket: u64,
}

impl BlobWriter {
    /// Open `path` for appending payloads.
    ///
    /// With `append == false` any existing file is truncated; otherwise new
    /// payloads land after its current end.
    pub fn open(path: &Path, append: bool) -> BasinResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path)?;
        let offset = if append { file.metadata()?.len() } else { 0 };

        debug!(path = %path.display(), offset, append, "blob writer opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(BufWriter::new(file)),
            offset,
            last_written_size: 0,
            min_bytes_to_compress: DEFAULT_MIN_BYTES_TO_COMPRESS,
            pending: Vec::new(),
            next_ticket: 0,
        })
    }

    /// Override the compression threshold.
    pub fn with_min_bytes_to_compress(mut self, bytes: usize) -> Self {
        self.min_bytes_to_compress = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the file so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Stored size of the most recent write.
    pub fn last_written_size(&self) -> u64 {
        self.last_written_size
    }

    fn should_compress(&self, compress: bool, len: usize) -> bool {
        compress && len > self.min_bytes_to_compress
    }

    /// Write a float buffer at once and return its descriptor.
    pub fn add_data(&mut self, values: &[f32], layout: Option<Layout>, compress: bool) -> BasinResult<BlobDescriptor> {
        let bytes = codec::floats_to_bytes(values);
        self.add_bytes(bytes, layout, compress)
    }

    /// Write a byte buffer at once and return its descriptor. Queued
    /// payloads stay queued.
    pub fn add_bytes(&mut self, bytes: Vec<u8>, layout: Option<Layout>, compress: bool) -> BasinResult<BlobDescriptor> {
        let payload = self.payload(bytes, layout, compress);
        let descriptor = self.write_payload(payload)?.1;
        self.file_mut()?.flush()?;
        Ok(descriptor)
    }

    /// Queue a float buffer; the bytes are copied immediately.
    pub fn queue_floats(&mut self, values: &[f32], layout: Option<Layout>, compress: bool) -> PayloadTicket {
        self.queue_bytes(codec::floats_to_bytes(values), layout, compress)
    }

    /// Queue a byte buffer for the next [`Self::flush`].
    pub fn queue_bytes(&mut self, bytes: Vec<u8>, layout: Option<Layout>, compress: bool) -> PayloadTicket {
        let payload = self.payload(bytes, layout, compress);
        let ticket = payload.ticket;
        self.pending.push(payload);
        ticket
    }

    fn payload(&mut self, bytes: Vec<u8>, layout: Option<Layout>, compress: bool) -> PendingPayload {
        let ticket = PayloadTicket(self.next_ticket);
        self.next_ticket += 1;
        PendingPayload {
            ticket,
            wants_compression: self.should_compress(compress, bytes.len()),
            bytes,
            layout,
            compression: Compression::None,
            processed: false,
        }
    }

    /// Queued payloads, for compression on worker threads.
    pub fn pending_mut(&mut self) -> &mut [PendingPayload] {
        &mut self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Compress anything still raw, then append every queued payload in
    /// queue order. Returns one descriptor per ticket.
    pub fn flush(&mut self) -> BasinResult<Vec<(PayloadTicket, BlobDescriptor)>> {
        self.file_mut()?;
        let pending = std::mem::take(&mut self.pending);
        let mut written = Vec::with_capacity(pending.len());
        for payload in pending {
            written.push(self.write_payload(payload)?);
        }
        self.file_mut()?.flush()?;
        Ok(written)
    }

    fn file_mut(&mut self) -> BasinResult<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| BasinError::InvalidArgument("blob writer already closed".into()))
    }

    /// Append one payload at the current offset.
    fn write_payload(&mut self, mut payload: PendingPayload) -> BasinResult<(PayloadTicket, BlobDescriptor)> {
        payload.compress()?;
        self.file_mut()?.write_all(&payload.bytes)?;

        let size = payload.bytes.len() as u64;
        let mut descriptor = BlobDescriptor::new(&self.path, self.offset, size, payload.compression)
            .with_checksum(codec::checksum(&payload.bytes));
        descriptor.layout = payload.layout;

        debug!(offset = self.offset, size, compression = %payload.compression, "blob append");
        self.offset += size;
        self.last_written_size = size;
        Ok((payload.ticket, descriptor))
    }

    /// Flush and close. Removes the file when nothing was ever written.
    pub fn close(mut self) -> BasinResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> BasinResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        if !self.pending.is_empty() {
            self.flush()?;
        }
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        if self.offset == 0 {
            fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "removed empty blob file");
        }
        Ok(())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(path = %self.path.display(), error = %e, "failed to close blob writer");
        }
    }
}
