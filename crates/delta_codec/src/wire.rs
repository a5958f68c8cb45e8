//! Bounds-checked primitives for reading and writing packets.
//!
//! All multi-byte fields are big-endian. The writer owns one buffer allocated
//! at construction and never grows it: every write is checked against the
//! fixed capacity first and fails with [`CodecError::CapacityExceeded`]
//! instead of reallocating.

use delta_store::{IndexWidth, NumericKind, Value};

use crate::error::CodecError;

/// Fixed-capacity packet writer.
#[derive(Debug)]
pub struct PacketWriter {
    buf: Vec<u8>,
    len: usize,
}

impl PacketWriter {
    /// Allocate a writer holding at most `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            len: 0,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.len
    }

    /// Discard everything written.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Discard everything written after `position`.
    pub fn rewind(&mut self, position: usize) {
        self.len = self.len.min(position);
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Claim `n` bytes and return their offset.
    fn claim(&mut self, n: usize) -> Result<usize, CodecError> {
        let needed = self.len + n;
        if needed > self.buf.len() {
            return Err(CodecError::CapacityExceeded {
                needed,
                capacity: self.buf.len(),
            });
        }
        let at = self.len;
        self.len = needed;
        Ok(at)
    }

    /// Write one byte.
    pub fn put_u8(&mut self, v: u8) -> Result<(), CodecError> {
        let at = self.claim(1)?;
        self.buf[at] = v;
        Ok(())
    }

    /// Write a big-endian `u32`.
    pub fn put_u32(&mut self, v: u32) -> Result<(), CodecError> {
        let at = self.claim(4)?;
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Write an array index or count in the given width.
    pub fn put_index(&mut self, width: IndexWidth, v: u32) -> Result<(), CodecError> {
        let at = self.claim(width.bytes())?;
        self.patch_index(at, width, v);
        Ok(())
    }

    /// Write a value big-endian in its kind's width.
    pub fn put_value(&mut self, v: Value) -> Result<(), CodecError> {
        let width = v.kind().width();
        let at = self.claim(width)?;
        v.encode_be(&mut self.buf[at..at + width]);
        Ok(())
    }

    /// Reserve `width` bytes to be filled in later with
    /// [`patch_index`](Self::patch_index) or [`patch_u32`](Self::patch_u32).
    pub fn reserve(&mut self, width: usize) -> Result<usize, CodecError> {
        self.claim(width)
    }

    /// Overwrite four bytes at `at`, an offset returned by
    /// [`reserve`](Self::reserve).
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Overwrite an index or count of `width` at `at`, an offset returned by
    /// [`reserve`](Self::reserve). `v` is truncated to the width.
    pub fn patch_index(&mut self, at: usize, width: IndexWidth, v: u32) {
        match width {
            IndexWidth::U8 => self.buf[at] = v as u8,
            IndexWidth::U16 => self.buf[at..at + 2].copy_from_slice(&(v as u16).to_be_bytes()),
            IndexWidth::U32 => self.patch_u32(at, v),
        }
    }
}

/// Cursor over a received packet.
#[derive(Debug)]
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Start reading at the first byte of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::TruncatedPacket {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read an array index or count of the given width.
    pub fn read_index(&mut self, width: IndexWidth) -> Result<u32, CodecError> {
        let b = self.take(width.bytes())?;
        Ok(match width {
            IndexWidth::U8 => u32::from(b[0]),
            IndexWidth::U16 => u32::from(u16::from_be_bytes([b[0], b[1]])),
            IndexWidth::U32 => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    /// Read one big-endian element of `kind`.
    pub fn read_value(&mut self, kind: NumericKind) -> Result<Value, CodecError> {
        Ok(kind.decode_be(self.take(kind.width())?))
    }

    /// Fail early if `count` entries of at least `min_entry` bytes each
    /// cannot fit in the rest of the packet.
    pub fn expect_entries(&self, count: u32, min_entry: usize) -> Result<(), CodecError> {
        let needed = (count as usize).saturating_mul(min_entry);
        if needed > self.remaining() {
            return Err(CodecError::TruncatedPacket {
                offset: self.pos,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_layout_is_big_endian() {
        let mut w = PacketWriter::with_capacity(16);
        w.put_u8(7).unwrap();
        w.put_u32(0x0a0b_0c0d).unwrap();
        w.put_index(IndexWidth::U16, 0x0102).unwrap();
        w.put_value(Value::I16(-1)).unwrap();
        assert_eq!(w.as_slice(), &[7, 0x0a, 0x0b, 0x0c, 0x0d, 1, 2, 0xff, 0xff]);
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut w = PacketWriter::with_capacity(8);
        let at = w.reserve(4).unwrap();
        w.put_u8(1).unwrap();
        w.patch_u32(at, 3);
        assert_eq!(w.as_slice(), &[0, 0, 0, 3, 1]);
    }

    #[test]
    fn test_capacity_is_exact() {
        let mut w = PacketWriter::with_capacity(5);
        w.put_u32(1).unwrap();
        w.put_u8(2).unwrap();
        let err = w.put_u8(3).unwrap_err();
        assert!(matches!(
            err,
            CodecError::CapacityExceeded {
                needed: 6,
                capacity: 5
            }
        ));
        assert_eq!(w.position(), 5);
    }

    #[test]
    fn test_rewind_discards_tail() {
        let mut w = PacketWriter::with_capacity(8);
        w.put_u8(1).unwrap();
        let mark = w.position();
        w.put_u32(9).unwrap();
        w.rewind(mark);
        assert_eq!(w.as_slice(), &[1]);
    }

    #[test]
    fn test_reader_reads_back() {
        let bytes = [7, 0, 0, 1, 0, 0x12, 0x3f, 0x80, 0, 0];
        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u32().unwrap(), 256);
        assert_eq!(r.read_index(IndexWidth::U8).unwrap(), 0x12);
        assert_eq!(r.read_value(NumericKind::F32).unwrap(), Value::F32(1.0));
        assert!(r.is_empty());
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut r = PacketReader::new(&[1, 2]);
        r.read_u8().unwrap();
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedPacket {
                offset: 1,
                needed: 4,
                remaining: 1
            }
        ));
    }

    #[test]
    fn test_expect_entries() {
        let r = PacketReader::new(&[0; 8]);
        assert!(r.expect_entries(2, 4).is_ok());
        assert!(r.expect_entries(3, 4).is_err());
        assert!(r.expect_entries(u32::MAX, 4).is_err());
    }
}
