//! Growable Byte Buffer
//!
//! `ByteBuf` is the byte string every query buffer and string value is
//! built from. It wraps a `BytesMut` and applies a doubling growth policy:
//! when an append does not fit in the spare capacity, the buffer is grown
//! to `2 * (len + additional)` bytes so that a long run of small appends
//! costs amortized O(1) per byte.
//!
//! Unlike a C string there is no terminator byte: the length is always
//! known and the contents are binary safe.

use bytes::{Bytes, BytesMut};
use std::fmt;

/// A growable, length-tracked byte sequence with amortized append.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuf {
    buf: BytesMut,
}

impl ByteBuf {
    /// Creates a buffer holding a copy of `init`, with no spare capacity.
    pub fn new(init: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(init.len());
        buf.extend_from_slice(init);
        Self { buf }
    }

    /// Creates an empty buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an empty buffer that can hold `capacity` bytes without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes the buffer can hold before it has to grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Spare capacity after the stored bytes.
    #[inline]
    pub fn avail(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    /// Appends `data`, growing the buffer if the spare capacity is too small.
    pub fn append(&mut self, data: &[u8]) {
        self.make_room_for(data.len());
        self.buf.extend_from_slice(data);
    }

    /// Ensures `additional` more bytes fit, doubling past the needed size.
    fn make_room_for(&mut self, additional: usize) {
        if self.avail() >= additional {
            return;
        }
        let new_len = self.len() + additional;
        self.buf.reserve(new_len * 2 - self.len());
    }

    /// Position of the first occurrence of `byte`.
    pub fn find(&self, byte: u8) -> Option<usize> {
        self.find_from(byte, 0)
    }

    /// Position of the first occurrence of `byte` at or after `start`.
    pub fn find_from(&self, byte: u8, start: usize) -> Option<usize> {
        self.buf
            .get(start..)?
            .iter()
            .position(|&b| b == byte)
            .map(|pos| start + pos)
    }

    /// Removes and returns the first `at` bytes, keeping the rest buffered.
    ///
    /// # Panics
    ///
    /// Panics if `at > len`.
    pub fn split_to(&mut self, at: usize) -> Bytes {
        self.buf.split_to(at).freeze()
    }

    /// Drops the contents but keeps the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Converts into an immutable, cheaply cloneable `Bytes`.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl From<&[u8]> for ByteBuf {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

impl From<&str> for ByteBuf {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl AsRef<[u8]> for ByteBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuf({:?})", String::from_utf8_lossy(&self.buf))
    }
}
