#![forbid(unsafe_code)]
//! Byte sequences, cursors and variable-length codecs shared by the stores
//! and the graph layer.

use core::fmt;
use core::ops::RangeBounds;

use ::bytes::Bytes;

pub mod varlong;
pub mod varstring;

/// Immutable byte sequence used for row keys, columns and values.
///
/// Ordering is unsigned lexicographic over the raw bytes, which is the order
/// every store keeps its columns in.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StaticBuffer(Bytes);

impl StaticBuffer {
    /// The empty buffer; sorts before every other buffer.
    pub const EMPTY: StaticBuffer = StaticBuffer(Bytes::new());

    /// Wraps a static slice without copying.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Copies `bytes` into a new buffer.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Single-byte buffer, used for column-range bounds.
    pub fn from_byte(byte: u8) -> Self {
        Self(Bytes::copy_from_slice(&[byte]))
    }

    /// Eight-byte big-endian encoding of `value`.
    pub fn from_u64(value: u64) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Reads a big-endian u64 starting at `pos`.
    pub fn get_u64(&self, pos: usize) -> u64 {
        let head = self
            .0
            .get(pos..pos + 8)
            .unwrap_or_else(|| panic!("u64 read past end of buffer (len {})", self.0.len()));
        let mut raw = [0u8; 8];
        raw.copy_from_slice(head);
        u64::from_be_bytes(raw)
    }

    /// Borrowed view of the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty buffer.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-copy sub-range.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        Self(self.0.slice(range))
    }

    /// Cursor positioned at the first byte.
    pub fn as_read_buffer(&self) -> ReadBuffer<'_> {
        ReadBuffer::new(&self.0)
    }
}

impl From<Vec<u8>> for StaticBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for StaticBuffer {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<&str> for StaticBuffer {
    fn from(value: &str) -> Self {
        Self::copy_from_slice(value.as_bytes())
    }
}

impl AsRef<[u8]> for StaticBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StaticBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Growable output buffer that freezes into a [`StaticBuffer`].
#[derive(Default, Debug)]
pub struct WriteBuffer {
    buf: Vec<u8>,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Appends raw bytes.
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a big-endian u64.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the buffer.
    pub fn into_static(self) -> StaticBuffer {
        StaticBuffer::from(self.buf)
    }
}

/// Slice-backed read cursor with absolute and relative access.
///
/// Reads past the end panic: every byte sequence handed to a reader was
/// produced by the matching writer, so an overrun means corrupt data.
pub struct ReadBuffer<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> ReadBuffer<'a> {
    /// Creates a cursor starting at offset 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, off: 0 }
    }

    /// Reads the next byte and advances.
    pub fn get_u8(&mut self) -> u8 {
        let byte = self.get_u8_at(self.off);
        self.off += 1;
        byte
    }

    /// Reads the byte at absolute `pos` without moving the cursor.
    pub fn get_u8_at(&self, pos: usize) -> u8 {
        match self.buf.get(pos) {
            Some(byte) => *byte,
            None => panic!(
                "read buffer underflow at {} (len {})",
                pos,
                self.buf.len()
            ),
        }
    }

    /// Next byte without advancing.
    pub fn peek_u8(&self) -> u8 {
        self.get_u8_at(self.off)
    }

    /// Reads a big-endian u64 and advances.
    pub fn get_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8));
        u64::from_be_bytes(raw)
    }

    /// Takes the next `n` bytes and advances.
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let end = self.off.saturating_add(n);
        if end > self.buf.len() {
            panic!(
                "read buffer take beyond end: need {}, remaining {}",
                n,
                self.remaining()
            );
        }
        let slice = &self.buf[self.off..end];
        self.off = end;
        slice
    }

    /// Remaining bytes from the cursor to the end, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.off..]
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.off
    }

    /// Moves the cursor to absolute `pos`.
    pub fn set_position(&mut self, pos: usize) {
        assert!(
            pos <= self.buf.len(),
            "position {} beyond buffer length {}",
            pos,
            self.buf.len()
        );
        self.off = pos;
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.off)
    }

    /// Returns true while unread bytes remain.
    pub fn has_remaining(&self) -> bool {
        self.off < self.buf.len()
    }
}

impl fmt::Debug for ReadBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuffer")
            .field("off", &self.off)
            .field("remaining", &self.remaining())
            .finish()
    }
}
