//! Packet builder.
//!
//! Accumulates an ordered sequence of emit-into-buffer operations and their
//! total size. Generalizes the "one interface per primitive type" reader
//! mixins that carry no real behavior of their own into a single flat
//! `WriteOp` enum with one `emit`/`encoded_len` match.
//!
//! A built [`Packet`] is immutable and `Clone`, so the same instance can be
//! queued to multiple sessions: each write closure is a pure function of a
//! provided output buffer, never a consumer of internal state.

use std::collections::VecDeque;

use crate::{
    codec::{Endian, StringEncoding},
    error::PacketError,
    safe_assert,
};

const MAX_STRING_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone)]
enum WriteOp {
    Bool(bool),
    I8(i8),
    I16(i16, Endian),
    I32(i32, Endian),
    I64(i64, Endian),
    F32(f32, Endian),
    F64(f64, Endian),
    Char(char, Endian),
    /// Pre-encoded string payload; `len_order` governs the `u16` length
    /// prefix's byte order (independent of the payload's own encoding).
    Str { encoded: Vec<u8>, len_order: Endian },
    Bytes(Vec<u8>),
}

impl WriteOp {
    fn encoded_len(&self) -> usize {
        match self {
            WriteOp::Bool(_) | WriteOp::I8(_) => 1,
            WriteOp::I16(..) | WriteOp::Char(..) => 2,
            WriteOp::I32(..) | WriteOp::F32(..) => 4,
            WriteOp::I64(..) | WriteOp::F64(..) => 8,
            WriteOp::Str { encoded, .. } => 2 + encoded.len(),
            WriteOp::Bytes(b) => b.len(),
        }
    }

    fn emit(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.resize(start + self.encoded_len(), 0);
        let slot = &mut buf[start..];
        match self {
            WriteOp::Bool(v) => slot[0] = u8::from(*v),
            WriteOp::I8(v) => slot[0] = *v as u8,
            WriteOp::I16(v, order) => order.write_i16(slot, *v),
            WriteOp::I32(v, order) => order.write_i32(slot, *v),
            WriteOp::I64(v, order) => order.write_i64(slot, *v),
            WriteOp::F32(v, order) => order.write_f32(slot, *v),
            WriteOp::F64(v, order) => order.write_f64(slot, *v),
            WriteOp::Char(v, order) => order.write_char(slot, *v),
            WriteOp::Str { encoded, len_order } => {
                len_order.write_u16(&mut slot[..2], encoded.len() as u16);
                slot[2..].copy_from_slice(encoded);
            }
            WriteOp::Bytes(b) => slot.copy_from_slice(b),
        }
    }
}

/// An ordered sequence of write operations plus their precomputed total
/// size in bytes: the sum of the bytes each operation will emit.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    ops: VecDeque<WriteOp>,
    size: usize,
}

impl Packet {
    /// Starts an empty packet.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Total size in bytes of the packet once serialized.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    fn push(mut self, op: WriteOp) -> Self {
        self.size += op.encoded_len();
        self.ops.push_back(op);
        self
    }

    pub fn put_bool(self, v: bool) -> Self {
        self.push(WriteOp::Bool(v))
    }

    pub fn put_byte(self, v: i8) -> Self {
        self.push(WriteOp::I8(v))
    }

    pub fn put_short(self, v: i16, order: Endian) -> Self {
        self.push(WriteOp::I16(v, order))
    }

    pub fn put_int(self, v: i32, order: Endian) -> Self {
        self.push(WriteOp::I32(v, order))
    }

    pub fn put_long(self, v: i64, order: Endian) -> Self {
        self.push(WriteOp::I64(v, order))
    }

    pub fn put_float(self, v: f32, order: Endian) -> Self {
        self.push(WriteOp::F32(v, order))
    }

    pub fn put_double(self, v: f64, order: Endian) -> Self {
        self.push(WriteOp::F64(v, order))
    }

    pub fn put_char(self, v: char, order: Endian) -> Self {
        self.push(WriteOp::Char(v, order))
    }

    /// Appends a length-prefixed string: a `u16` byte length in `len_order`
    /// followed by exactly that many `encoding`-encoded bytes.
    ///
    /// A string whose encoded form exceeds 65535 bytes cannot be framed
    /// with a `u16` length prefix. This is a programmer error rather than a
    /// recoverable runtime condition, so it is asserted rather than threaded
    /// through a `Result` on every fluent call. In release builds the
    /// string is truncated to fit so the packet can still be built.
    pub fn put_string(self, s: &str, encoding: StringEncoding, len_order: Endian) -> Self {
        let mut encoded = encoding.encode(s, len_order);
        safe_assert!(
            encoded.len() <= MAX_STRING_LEN,
            "string encodes to {} bytes, exceeds the 65535-byte u16 length prefix",
            encoded.len()
        );
        encoded.truncate(MAX_STRING_LEN);
        self.push(WriteOp::Str { encoded, len_order })
    }

    /// Fallible sibling of [`Packet::put_string`] for strings whose length
    /// is not known to be in-bounds ahead of time (e.g. relayed from
    /// untrusted input): reports [`PacketError::StringTooLong`] to the
    /// caller instead of asserting.
    pub fn try_put_string(
        self,
        s: &str,
        encoding: StringEncoding,
        len_order: Endian,
    ) -> Result<Self, PacketError> {
        let encoded = encoding.encode(s, len_order);
        if encoded.len() > MAX_STRING_LEN {
            return Err(PacketError::StringTooLong(encoded.len()));
        }
        Ok(self.push(WriteOp::Str { encoded, len_order }))
    }

    /// Appends a raw byte array with no length prefix.
    pub fn put_bytes(self, bytes: &[u8]) -> Self {
        self.push(WriteOp::Bytes(bytes.to_vec()))
    }

    /// Pushes `prefix`'s operations onto the front of `self`, so that
    /// `prefix`'s bytes are emitted first when the packet is serialized.
    /// Lets a header be computed and prepended after the body is already
    /// built.
    pub fn prepend(mut self, prefix: Packet) -> Self {
        self.size += prefix.size;
        for op in prefix.ops.into_iter().rev() {
            self.ops.push_front(op);
        }
        self
    }

    /// Serializes this packet's operations into `buf`, appending exactly
    /// `self.size()` bytes.
    pub(crate) fn emit_into(&self, buf: &mut Vec<u8>) {
        for op in &self.ops {
            op.emit(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_emitted_bytes() {
        let packet = Packet::builder()
            .put_byte(1)
            .put_int(42, Endian::Big)
            .put_string("hi", StringEncoding::Utf8, Endian::Big);
        let mut buf = Vec::new();
        packet.emit_into(&mut buf);
        assert_eq!(buf.len(), packet.size());
    }

    #[test]
    fn prepend_runs_first() {
        let body = Packet::builder().put_byte(2);
        let header = Packet::builder().put_byte(1);
        let packet = body.prepend(header);
        let mut buf = Vec::new();
        packet.emit_into(&mut buf);
        assert_eq!(buf, vec![1, 2]);
    }

    #[test]
    fn try_put_string_reports_oversized_strings() {
        let oversized = "x".repeat(MAX_STRING_LEN + 1);
        let err = Packet::builder().try_put_string(&oversized, StringEncoding::Utf8, Endian::Big).unwrap_err();
        assert!(matches!(err, PacketError::StringTooLong(n) if n == MAX_STRING_LEN + 1));

        let ok = Packet::builder().try_put_string("fits fine", StringEncoding::Utf8, Endian::Big);
        assert!(ok.is_ok());
    }

    #[test]
    fn clone_is_reusable_across_sessions() {
        let packet = Packet::builder().put_int(7, Endian::Little);
        let a = packet.clone();
        let b = packet.clone();
        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();
        a.emit_into(&mut buf_a);
        b.emit_into(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }
}
