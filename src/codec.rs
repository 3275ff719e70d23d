//! Numeric and string codec helpers shared by the packet builder ([`crate::packet`])
//! and by application code decoding the slices [`crate::session::Session::read_until`]
//! delivers.
//!
//! Kept deliberately dumb: these are pure `(value) -> bytes` / `(bytes) ->
//! value` functions with no knowledge of sessions, buffers, or framing.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

/// Byte order for a fixed-width numeric field or a string's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    #[inline]
    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Endian::Big => BigEndian::write_u16(buf, v),
            Endian::Little => LittleEndian::write_u16(buf, v),
        }
    }

    #[inline]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(buf),
            Endian::Little => LittleEndian::read_u16(buf),
        }
    }

    #[inline]
    pub fn write_i16(self, buf: &mut [u8], v: i16) {
        self.write_u16(buf, v as u16);
    }

    #[inline]
    pub fn read_i16(self, buf: &[u8]) -> i16 {
        self.read_u16(buf) as i16
    }

    #[inline]
    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Endian::Big => BigEndian::write_u32(buf, v),
            Endian::Little => LittleEndian::write_u32(buf, v),
        }
    }

    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Big => BigEndian::read_u32(buf),
            Endian::Little => LittleEndian::read_u32(buf),
        }
    }

    #[inline]
    pub fn write_i32(self, buf: &mut [u8], v: i32) {
        self.write_u32(buf, v as u32);
    }

    #[inline]
    pub fn read_i32(self, buf: &[u8]) -> i32 {
        self.read_u32(buf) as i32
    }

    #[inline]
    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            Endian::Big => BigEndian::write_u64(buf, v),
            Endian::Little => LittleEndian::write_u64(buf, v),
        }
    }

    #[inline]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Big => BigEndian::read_u64(buf),
            Endian::Little => LittleEndian::read_u64(buf),
        }
    }

    #[inline]
    pub fn write_i64(self, buf: &mut [u8], v: i64) {
        self.write_u64(buf, v as u64);
    }

    #[inline]
    pub fn read_i64(self, buf: &[u8]) -> i64 {
        self.read_u64(buf) as i64
    }

    #[inline]
    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        self.write_u32(buf, v.to_bits());
    }

    #[inline]
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(buf))
    }

    #[inline]
    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        self.write_u64(buf, v.to_bits());
    }

    #[inline]
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(buf))
    }

    /// `char` is wire-encoded as a single 2-byte UTF-16 code unit, covering
    /// the BMP range (U+0000..=U+FFFF); values outside it are not
    /// representable and never reach this path.
    #[inline]
    pub fn write_char(self, buf: &mut [u8], v: char) {
        self.write_u16(buf, v as u32 as u16);
    }

    #[inline]
    pub fn read_char(self, buf: &[u8]) -> char {
        char::from_u32(u32::from(self.read_u16(buf))).unwrap_or('\u{FFFD}')
    }
}

/// Character encoding for a length-prefixed string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    /// Native "UTF-16": a byte-order-mark is written before the code units
    /// and consulted on decode, matching the common `java.nio.charset`
    /// "UTF-16" behavior. `order` controls the BOM's and code units' byte
    /// order when *writing*.
    Utf16,
    Utf16Be,
    Utf16Le,
}

impl StringEncoding {
    fn fixed_encoding(self) -> Option<&'static Encoding> {
        match self {
            StringEncoding::Utf8 => Some(UTF_8),
            StringEncoding::Utf16Be => Some(UTF_16BE),
            StringEncoding::Utf16Le => Some(UTF_16LE),
            StringEncoding::Utf16 => None,
        }
    }

    /// Encodes `s`, returning the exact bytes that will follow the `u16`
    /// length prefix. The returned length is what the prefix must record.
    ///
    /// Delegates to `encoding_rs` for the actual UTF-8/UTF-16 transcoding;
    /// `Utf16` additionally prepends a byte-order-mark in `order` so the
    /// decoder can recover the code unit order without being told.
    pub fn encode(self, s: &str, order: Endian) -> Vec<u8> {
        if let Some(encoding) = self.fixed_encoding() {
            return encoding.encode(s).0.into_owned();
        }
        let payload_encoding = if order == Endian::Big { UTF_16BE } else { UTF_16LE };
        let mut out = Vec::with_capacity(2 + s.len() * 2);
        let mut bom = [0u8; 2];
        order.write_u16(&mut bom, 0xFEFF);
        out.extend_from_slice(&bom);
        out.extend_from_slice(&payload_encoding.encode(s).0);
        out
    }

    /// Decodes `bytes` (exactly the payload that followed the length
    /// prefix) back into a `String`. Malformed sequences are replaced per
    /// `encoding_rs`'s standard lossy behavior, matching
    /// `String::from_utf8_lossy`'s contract for the `Utf8` variant.
    pub fn decode(self, bytes: &[u8]) -> String {
        if let Some(encoding) = self.fixed_encoding() {
            return encoding.decode_without_bom_handling(bytes).0.into_owned();
        }
        if bytes.len() < 2 {
            return String::new();
        }
        let as_be = Endian::Big.read_u16(&bytes[..2]);
        let payload_encoding = if as_be == 0xFEFF { UTF_16BE } else { UTF_16LE };
        payload_encoding.decode_without_bom_handling(&bytes[2..]).0.into_owned()
    }
}
