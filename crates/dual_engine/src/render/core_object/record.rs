//! Versioned plain-data records for sync payloads
//!
//! The plain-data half of a sync payload is a flat byte record written into
//! the frame allocator. Each record type declares its fields once through
//! [`sync_record!`]; sizing, writing and reading are all generated from that
//! single field list so they cannot drift apart.
//!
//! Wire layout (little endian):
//!
//! ```text
//! ┌───────┬─────────┬──────┬─────────────┬─────┬─────────┬─────┬─────────┬───
//! │ magic │ version │ kind │ field_count │ tag │ field 0 │ tag │ field 1 │ ...
//! │  u16  │   u8    │  u8  │     u8      │ u8  │         │ u8  │         │
//! └───────┴─────────┴──────┴─────────────┴─────┴─────────┴─────┴─────────┴───
//! ```
//!
//! Strings, byte vectors and collections are prefixed with a `u32` length.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{SyncError, SyncResult};
use super::sync_data::SyncKind;
use crate::foundation::memory::{FrameAllocator, FrameHandle};

/// First two bytes of every record
pub const RECORD_MAGIC: u16 = 0x5343;

/// Record format version
pub const RECORD_VERSION: u8 = 1;

/// Bytes taken by the record header
pub const RECORD_HEADER_LEN: usize = 5;

/// A value that can be stored in a sync record
pub trait SyncField: Sized {
    /// Encoded size in bytes
    fn encoded_len(&self) -> usize;

    /// Append the encoded value
    fn encode(&self, writer: &mut SyncWriter<'_>);

    /// Read a value back
    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self>;
}

/// A record type generated by [`sync_record!`]
pub trait SyncRecord: Sized {
    /// Kind written into the header
    const KIND: SyncKind;
    /// Number of fields
    const FIELD_COUNT: u8;

    /// Size of all fields including their tags
    fn fields_len(&self) -> usize;

    /// Write every field, each preceded by its tag
    fn encode_fields(&self, writer: &mut SyncWriter<'_>);

    /// Read every field, checking tags
    fn decode_fields(reader: &mut SyncReader<'_>) -> SyncResult<Self>;

    /// Total encoded size including the header
    fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.fields_len()
    }
}

/// Cursor writing into a preallocated byte range
pub struct SyncWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflowed: bool,
}

impl<'a> SyncWriter<'a> {
    /// Writer over `buf`
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflowed: false,
        }
    }

    /// Append raw bytes
    pub fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        match self.buf.get_mut(self.pos..end) {
            Some(dst) => dst.copy_from_slice(bytes),
            None => self.overflowed = true,
        }
        self.pos = end;
    }

    /// Append a byte
    pub fn put_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    /// Append a little-endian `u16`
    pub fn put_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    /// Append a little-endian `u32`
    pub fn put_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    /// Append a collection length
    pub fn put_len(&mut self, len: usize) {
        self.put_u32(len as u32);
    }

    /// Bytes written so far
    pub const fn position(&self) -> usize {
        self.pos
    }

    fn finish(self) -> SyncResult<()> {
        if self.overflowed || self.pos != self.buf.len() {
            return Err(SyncError::SizeMismatch {
                expected: self.buf.len(),
                written: self.pos,
            });
        }
        Ok(())
    }
}

/// Cursor reading a record back
pub struct SyncReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SyncReader<'a> {
    /// Reader over `bytes`
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> SyncResult<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(SyncError::Truncated {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a byte
    pub fn u8(&mut self) -> SyncResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian `u16`
    pub fn u16(&mut self) -> SyncResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian `u32`
    pub fn u32(&mut self) -> SyncResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a collection length
    pub fn read_len(&mut self) -> SyncResult<usize> {
        Ok(self.u32()? as usize)
    }

    /// Consume a field tag, failing if it is not `expected`
    pub fn expect_tag(&mut self, field: &'static str, expected: u8) -> SyncResult<()> {
        let found = self.u8()?;
        if found != expected {
            return Err(SyncError::FieldOutOfOrder {
                field,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Unread bytes
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn finish(self) -> SyncResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(SyncError::TrailingBytes { remaining }),
        }
    }
}

/// Encode `record` into a fresh frame allocation
pub fn encode_record<R: SyncRecord>(
    frame: &mut FrameAllocator,
    record: &R,
) -> SyncResult<FrameHandle> {
    let handle = frame.alloc(record.encoded_len());
    let mut writer = SyncWriter::new(frame.bytes_mut(handle)?);
    writer.put_u16(RECORD_MAGIC);
    writer.put_u8(RECORD_VERSION);
    writer.put_u8(R::KIND as u8);
    writer.put_u8(R::FIELD_COUNT);
    record.encode_fields(&mut writer);
    writer.finish()?;
    Ok(handle)
}

/// Decode a record of type `R`, validating the header
pub fn decode_record<R: SyncRecord>(bytes: &[u8]) -> SyncResult<R> {
    let mut reader = SyncReader::new(bytes);

    if reader.u16()? != RECORD_MAGIC {
        return Err(SyncError::BadMagic);
    }
    let version = reader.u8()?;
    if version != RECORD_VERSION {
        return Err(SyncError::UnsupportedVersion {
            expected: RECORD_VERSION,
            found: version,
        });
    }
    let kind = reader.u8()?;
    if kind != R::KIND as u8 {
        return Err(SyncError::KindMismatch {
            expected: R::KIND,
            found: kind,
        });
    }
    let field_count = reader.u8()?;
    if field_count != R::FIELD_COUNT {
        return Err(SyncError::FieldCountMismatch {
            kind: R::KIND,
            expected: R::FIELD_COUNT,
            found: field_count,
        });
    }

    let record = R::decode_fields(&mut reader)?;
    reader.finish()?;
    Ok(record)
}

/// Declare a sync record: the struct plus its [`SyncRecord`] implementation.
///
/// ```ignore
/// sync_record! {
///     pub(crate) struct BlockRecord: SyncKind::ParamBlock {
///         data: Vec<u8>,
///     }
/// }
/// ```
macro_rules! sync_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $kind:path {
            $( $(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$field_meta])* $field_vis $field: $ty, )*
        }

        impl $crate::render::core_object::record::SyncRecord for $name {
            const KIND: $crate::render::core_object::SyncKind = $kind;
            const FIELD_COUNT: u8 = {
                let names: &[&str] = &[$(stringify!($field)),*];
                names.len() as u8
            };

            fn fields_len(&self) -> usize {
                0 $( + 1 + $crate::render::core_object::record::SyncField::encoded_len(&self.$field) )*
            }

            fn encode_fields(&self, writer: &mut $crate::render::core_object::record::SyncWriter<'_>) {
                let mut tag = 0u8;
                $(
                    writer.put_u8(tag);
                    $crate::render::core_object::record::SyncField::encode(&self.$field, writer);
                    tag += 1;
                )*
                let _ = (tag, writer);
            }

            fn decode_fields(
                reader: &mut $crate::render::core_object::record::SyncReader<'_>,
            ) -> $crate::render::core_object::SyncResult<Self> {
                let mut tag = 0u8;
                $(
                    reader.expect_tag(stringify!($field), tag)?;
                    let $field = <$ty as $crate::render::core_object::record::SyncField>::decode(reader)?;
                    tag += 1;
                )*
                let _ = (tag, reader);
                Ok(Self { $($field),* })
            }
        }
    };
}

pub(crate) use sync_record;

impl SyncField for u8 {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_u8(*self);
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        reader.u8()
    }
}

impl SyncField for bool {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_u8(u8::from(*self));
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        Ok(reader.u8()? != 0)
    }
}

impl SyncField for u32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_u32(*self);
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        reader.u32()
    }
}

impl SyncField for Vec<u8> {
    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_len(self.len());
        writer.put(self);
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        let len = reader.read_len()?;
        Ok(reader.take(len)?.to_vec())
    }
}

impl SyncField for String {
    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_len(self.len());
        writer.put(self.as_bytes());
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        let len = reader.read_len()?;
        let bytes = reader.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SyncError::InvalidUtf8)
    }
}

impl<T: SyncField + Ord> SyncField for BTreeSet<T> {
    fn encoded_len(&self) -> usize {
        4 + self.iter().map(SyncField::encoded_len).sum::<usize>()
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_len(self.len());
        for value in self {
            value.encode(writer);
        }
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        let len = reader.read_len()?;
        (0..len).map(|_| T::decode(reader)).collect()
    }
}

impl<K: SyncField + Ord, V: SyncField> SyncField for BTreeMap<K, V> {
    fn encoded_len(&self) -> usize {
        4 + self
            .iter()
            .map(|(key, value)| key.encoded_len() + value.encoded_len())
            .sum::<usize>()
    }

    fn encode(&self, writer: &mut SyncWriter<'_>) {
        writer.put_len(self.len());
        for (key, value) in self {
            key.encode(writer);
            value.encode(writer);
        }
    }

    fn decode(reader: &mut SyncReader<'_>) -> SyncResult<Self> {
        let len = reader.read_len()?;
        (0..len)
            .map(|_| Ok((K::decode(reader)?, V::decode(reader)?)))
            .collect()
    }
}
