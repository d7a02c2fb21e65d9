//! Binary codec for griddev request and response bodies.
//!
//! Wire format of the primitive fields:
//! ```text
//! byte    [v:1]
//! int     [v:4]                      big-endian two's complement
//! double  [v:8]                      big-endian IEEE-754
//! string  [len:4][bytes:len]         len = -1 encodes null
//! T[]     [len:4][elements:len*|T|]  len = -1 encodes null
//! ```
//!
//! A request body is `[opcode:1][fields...]` and a response body is
//! `[status:1][payload...]`.  Bodies carry no length header of their own: the
//! HTTP exchange delimits them, so the decoder is bounded by the body length
//! (or a smaller explicit limit) and treats reading past it as a
//! [`ProtocolError::UnexpectedEof`].

use thiserror::Error;
use tracing::warn;

/// Initial size of the encode buffer in bytes.
pub const INITIAL_CAPACITY: usize = 64;

/// Length prefix written in place of a null string or array.
pub const NULL_LENGTH: i32 = -1;

/// Errors that can occur while decoding a request or response body.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// A read would cross the decoder's limit.
    #[error("unexpected end of data: need {needed} bytes at offset {offset}, limit is {limit}")]
    UnexpectedEof {
        needed: usize,
        offset: usize,
        limit: usize,
    },

    /// The opcode byte of a request is not a recognized value.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// The payload could not be parsed (negative length, invalid UTF-8, enum out of range, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// Growable encode buffer with a write cursor.
///
/// The buffer starts at [`INITIAL_CAPACITY`] bytes and doubles on overflow, or
/// grows straight to the required size when doubling is not enough.  A single
/// encoder is meant to be reused: [`WireEncoder::reset_write`] hands out the
/// bytes written so far and rewinds the cursor without shrinking the buffer.
///
/// # Examples
///
/// ```rust
/// use griddev_core::protocol::codec::{WireDecoder, WireEncoder};
///
/// let mut encoder = WireEncoder::new();
/// encoder.write_int(42);
/// encoder.write_string(Some("hello"));
/// let bytes = encoder.reset_write();
///
/// let mut decoder = WireDecoder::new(bytes);
/// assert_eq!(decoder.read_int().unwrap(), 42);
/// assert_eq!(decoder.read_string().unwrap().as_deref(), Some("hello"));
/// assert!(decoder.is_read_finished());
/// ```
#[derive(Debug, Clone)]
pub struct WireEncoder {
    buf: Vec<u8>,
    pos: usize,
}

impl WireEncoder {
    /// Creates an encoder with the default 64-byte buffer.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an encoder whose buffer initially holds `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            pos: 0,
        }
    }

    /// Number of bytes written since the last reset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Current size of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The bytes written since the last reset.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn write_byte(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn write_int(&mut self, value: i32) {
        self.put(&value.to_be_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.put(&value.to_be_bytes());
    }

    /// Writes a length-prefixed string, or the null marker for `None`.
    ///
    /// Text made only of characters below 0x80 is written one byte per char;
    /// anything else is written as UTF-8.  Both paths produce the UTF-8 bytes
    /// of the string, so the length prefix is always the byte count.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.write_int(NULL_LENGTH),
            Some(text) => {
                let (prefix, count) = length_prefix(text.len());
                self.write_int(prefix);
                self.put(&text.as_bytes()[..count]);
            }
        }
    }

    pub fn write_byte_array(&mut self, value: Option<&[u8]>) {
        match value {
            None => self.write_int(NULL_LENGTH),
            Some(items) => {
                let (prefix, count) = length_prefix(items.len());
                self.write_int(prefix);
                self.put(&items[..count]);
            }
        }
    }

    pub fn write_int_array(&mut self, value: Option<&[i32]>) {
        match value {
            None => self.write_int(NULL_LENGTH),
            Some(items) => {
                let (prefix, count) = length_prefix(items.len());
                self.write_int(prefix);
                self.ensure(count * 4);
                for item in &items[..count] {
                    self.write_int(*item);
                }
            }
        }
    }

    pub fn write_double_array(&mut self, value: Option<&[f64]>) {
        match value {
            None => self.write_int(NULL_LENGTH),
            Some(items) => {
                let (prefix, count) = length_prefix(items.len());
                self.write_int(prefix);
                self.ensure(count * 8);
                for item in &items[..count] {
                    self.write_double(*item);
                }
            }
        }
    }

    /// Returns a copy of the bytes written so far and rewinds the cursor to 0.
    ///
    /// The backing buffer keeps its size, so the next request encoded with
    /// this encoder does not reallocate unless it is larger than any before.
    pub fn reset_write(&mut self) -> Vec<u8> {
        let written = self.buf[..self.pos].to_vec();
        self.pos = 0;
        written
    }

    fn put(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.pos + additional;
        if needed > self.buf.len() {
            let new_len = (self.buf.len() * 2).max(needed);
            self.buf.resize(new_len, 0);
        }
    }
}

impl Default for WireEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Length prefix for a field of `len` elements, and how many of those
/// elements are written.
///
/// Fields longer than `i32::MAX` elements are cut to the first `i32::MAX`.
fn length_prefix(len: usize) -> (i32, usize) {
    match i32::try_from(len) {
        Ok(prefix) => (prefix, len),
        Err(_) => {
            warn!(len, limit = i32::MAX, "field exceeds the wire length limit, truncating");
            (i32::MAX, i32::MAX as usize)
        }
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// Bounded decode cursor over an owned body.
///
/// Every read checks the remaining bytes against the limit fixed at
/// construction and fails with [`ProtocolError::UnexpectedEof`] instead of
/// reading past it.
#[derive(Debug, Clone)]
pub struct WireDecoder {
    buf: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl WireDecoder {
    /// Creates a decoder bounded by the length of `buf`.
    pub fn new(buf: Vec<u8>) -> Self {
        let limit = buf.len();
        Self { buf, pos: 0, limit }
    }

    /// Creates a decoder bounded by `limit`, clamped to the length of `buf`.
    pub fn with_limit(buf: Vec<u8>, limit: usize) -> Self {
        let limit = limit.min(buf.len());
        Self { buf, pos: 0, limit }
    }

    /// Offset of the next byte to be read.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Returns `true` once every byte up to the limit has been consumed.
    pub fn is_read_finished(&self) -> bool {
        self.pos >= self.limit
    }

    pub fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_int(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_double(&mut self) -> Result<f64, ProtocolError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    /// Reads a length-prefixed string; `Ok(None)` is the null marker.
    pub fn read_string(&mut self) -> Result<Option<String>, ProtocolError> {
        let Some(len) = self.read_length("string")? else {
            return Ok(None);
        };
        let bytes = self.take(len)?;
        if bytes.is_ascii() {
            // One byte per char; no multi-byte sequences to validate.
            return Ok(Some(bytes.iter().map(|b| char::from(*b)).collect()));
        }
        std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
    }

    pub fn read_byte_array(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(len) = self.read_length("byte[]")? else {
            return Ok(None);
        };
        Ok(Some(self.take(len)?.to_vec()))
    }

    pub fn read_int_array(&mut self) -> Result<Option<Vec<i32>>, ProtocolError> {
        let Some(len) = self.read_length("int[]")? else {
            return Ok(None);
        };
        let bytes = self.take(element_bytes(len, 4)?)?;
        Ok(Some(
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }

    pub fn read_double_array(&mut self) -> Result<Option<Vec<f64>>, ProtocolError> {
        let Some(len) = self.read_length("double[]")? else {
            return Ok(None);
        };
        let bytes = self.take(element_bytes(len, 8)?)?;
        Ok(Some(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    f64::from_be_bytes(raw)
                })
                .collect(),
        ))
    }

    /// Reads a length prefix, mapping the null marker to `None`.
    fn read_length(&mut self, context: &str) -> Result<Option<usize>, ProtocolError> {
        match self.read_int()? {
            NULL_LENGTH => Ok(None),
            len if len < 0 => Err(ProtocolError::MalformedPayload(format!(
                "{context}: negative length {len}"
            ))),
            len => Ok(Some(len as usize)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::UnexpectedEof {
                needed: n,
                offset: self.pos,
                limit: self.limit,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }
}

fn element_bytes(len: usize, size: usize) -> Result<usize, ProtocolError> {
    len.checked_mul(size)
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("array length {len} overflows")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
