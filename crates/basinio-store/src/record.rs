//! Fixed-size record tables.
//!
//! Auxiliary tables (migration events, trap records, fission-track samples
//! and so on) are stored as one packed blob of equally sized records. Each
//! record type defines its own little-endian field layout; the XML index
//! stores the record count and size next to the blob descriptor.

use basinio_types::{BasinError, BasinResult};

/// A record with a fixed little-endian byte image.
pub trait FixedRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append exactly [`Self::SIZE`] bytes.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from a cursor positioned at the record start.
    fn decode(cursor: &mut RecordCursor<'_>) -> BasinResult<Self>;
}

/// Pack records into one buffer.
pub fn encode_records<R: FixedRecord>(records: &[R]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * R::SIZE);
    for r in records {
        let start = out.len();
        r.encode(&mut out);
        debug_assert_eq!(out.len() - start, R::SIZE);
    }
    out
}

/// Unpack `count` records of `record_size` bytes each.
pub fn decode_records<R: FixedRecord>(bytes: &[u8], count: usize, record_size: usize) -> BasinResult<Vec<R>> {
    if record_size != R::SIZE {
        return Err(BasinError::Format(format!(
            "record size {record_size} does not match expected {}",
            R::SIZE
        )));
    }
    let expected = count
        .checked_mul(record_size)
        .ok_or_else(|| BasinError::Format(format!("{count} records of {record_size} bytes overflow")))?;
    if bytes.len() != expected {
        return Err(BasinError::Format(format!(
            "table holds {} bytes, expected {count} records of {record_size}",
            bytes.len()
        )));
    }
    let mut records = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(record_size) {
        let mut cursor = RecordCursor::new(chunk);
        records.push(R::decode(&mut cursor)?);
    }
    Ok(records)
}

/// Little-endian field reader over one record.
pub struct RecordCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> BasinResult<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| BasinError::Format(format!("record truncated at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn f32(&mut self) -> BasinResult<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    pub fn f64(&mut self) -> BasinResult<f64> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    pub fn i32(&mut self) -> BasinResult<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    pub fn u32(&mut self) -> BasinResult<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub fn bool(&mut self) -> BasinResult<bool> {
        Ok(self.take::<1>()?[0] != 0)
    }

    /// Fixed-width, NUL-padded UTF-8 string.
    pub fn fixed_str(&mut self, width: usize) -> BasinResult<String> {
        let end = self.pos + width;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| BasinError::Format(format!("record truncated at byte {}", self.pos)))?;
        self.pos = end;
        let used = slice.iter().position(|b| *b == 0).unwrap_or(width);
        String::from_utf8(slice[..used].to_vec())
            .map_err(|e| BasinError::Format(format!("invalid string in record: {e}")))
    }
}

/// Append a NUL-padded string of exactly `width` bytes, truncating longer input
/// at a character boundary.
pub fn put_fixed_str(out: &mut Vec<u8>, value: &str, width: usize) {
    let mut end = value.len().min(width);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    out.extend_from_slice(&value.as_bytes()[..end]);
    out.resize(out.len() + (width - end), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Sample {
        id: i32,
        value: f64,
        name: String,
    }

    impl FixedRecord for Sample {
        const SIZE: usize = 4 + 8 + 8;

        fn encode(&self, out: &mut Vec<u8>) {
            out.extend_from_slice(&self.id.to_le_bytes());
            out.extend_from_slice(&self.value.to_le_bytes());
            put_fixed_str(out, &self.name, 8);
        }

        fn decode(c: &mut RecordCursor<'_>) -> BasinResult<Self> {
            Ok(Self {
                id: c.i32()?,
                value: c.f64()?,
                name: c.fixed_str(8)?,
            })
        }
    }

    #[test]
    fn table_round_trip() {
        let rows = vec![
            Sample { id: 1, value: 2.5, name: "well-1".into() },
            Sample { id: -7, value: 0.0, name: "a-very-long-name".into() },
        ];
        let bytes = encode_records(&rows);
        assert_eq!(bytes.len(), 2 * Sample::SIZE);
        let back: Vec<Sample> = decode_records(&bytes, 2, Sample::SIZE).unwrap();
        assert_eq!(back[0], rows[0]);
        assert_eq!(back[1].name, "a-very-l");
    }

    #[test]
    fn mismatched_record_size_rejected() {
        let bytes = vec![0u8; 40];
        assert!(decode_records::<Sample>(&bytes, 2, 24).is_err());
        assert!(decode_records::<Sample>(&bytes, 3, Sample::SIZE).is_err());
    }

    #[test]
    fn huge_record_count_rejected() {
        let bytes = vec![0u8; Sample::SIZE];
        assert!(matches!(
            decode_records::<Sample>(&bytes, usize::MAX / 2, Sample::SIZE),
            Err(BasinError::Format(_))
        ));
    }
}
