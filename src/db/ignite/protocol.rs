//! Ignite binary thin-client protocol, the subset the adapter needs.
//!
//! Every integer is little-endian. Frames are `len:i32` followed by `len`
//! bytes of body.

use thiserror::Error;

use crate::models::Record;

pub const VERSION: (i16, i16, i16) = (1, 2, 0);

pub const OP_HANDSHAKE: u8 = 1;
pub const CLIENT_CODE_THIN: u8 = 2;

pub const OP_CACHE_GET: i16 = 1000;
pub const OP_CACHE_PUT: i16 = 1001;
pub const OP_CACHE_REMOVE_KEY: i16 = 1016;
pub const OP_CACHE_GET_NAMES: i16 = 1050;

pub const TYPE_STRING: u8 = 9;
pub const TYPE_BYTE_ARRAY: u8 = 12;
pub const TYPE_MAP: u8 = 25;
pub const TYPE_NULL: u8 = 101;

pub const MAP_KIND_HASH_MAP: u8 = 1;

pub const STATUS_SUCCESS: i32 = 0;

/// Largest frame body a client will buffer.
pub const MAX_FRAME_LEN: usize = 64 << 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message truncated: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("unexpected type code {found}, expected {expected}")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("string object is not valid utf-8")]
    InvalidUtf8,
    #[error("response id {found} does not match request id {expected}")]
    RequestIdMismatch { expected: i64, found: i64 },
}

/// Cache id as the server derives it: Java `String.hashCode` of the name.
pub fn cache_id(name: &str) -> i32 {
    name.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

//////////////////////////////////////////////// Writer ////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.u8(TYPE_NULL)
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u8(TYPE_STRING).i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn byte_array(&mut self, bytes: &[u8]) -> &mut Self {
        self.u8(TYPE_BYTE_ARRAY).i32(bytes.len() as i32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// A record travels as a HashMap object of string -> byte[].
    pub fn record(&mut self, record: &Record) -> &mut Self {
        self.u8(TYPE_MAP).i32(record.len() as i32).u8(MAP_KIND_HASH_MAP);
        for (field, value) in record {
            self.string(field).byte_array(value);
        }
        self
    }

    /// Prefix shared by every cache operation.
    pub fn cache_header(&mut self, cache_id: i32) -> &mut Self {
        self.i32(cache_id).u8(0)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

//////////////////////////////////////////////// Reader ////////////////////////////////////////////

#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.u8()? != 0)
    }

    pub fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn length(&mut self) -> Result<usize, ProtocolError> {
        let len = self.i32()?;
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        Ok(len as usize)
    }

    fn expect_type(&mut self, expected: u8) -> Result<(), ProtocolError> {
        let found = self.u8()?;
        if found != expected {
            return Err(ProtocolError::UnexpectedType { expected, found });
        }
        Ok(())
    }

    /// Body of a string object whose type code was already consumed.
    fn string_body(&mut self) -> Result<String, ProtocolError> {
        let len = self.length()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn string(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.u8()? {
            TYPE_NULL => Ok(None),
            TYPE_STRING => self.string_body().map(Some),
            found => Err(ProtocolError::UnexpectedType {
                expected: TYPE_STRING,
                found,
            }),
        }
    }

    pub fn byte_array(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.expect_type(TYPE_BYTE_ARRAY)?;
        let len = self.length()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn record(&mut self) -> Result<Option<Record>, ProtocolError> {
        match self.u8()? {
            TYPE_NULL => Ok(None),
            TYPE_MAP => {
                let count = self.length()?;
                let _kind = self.u8()?;
                let mut record = Record::with_capacity(count.min(1024));
                for _ in 0..count {
                    self.expect_type(TYPE_STRING)?;
                    let field = self.string_body()?;
                    let value = self.byte_array()?;
                    record.insert(field, value);
                }
                Ok(Some(record))
            }
            found => Err(ProtocolError::UnexpectedType {
                expected: TYPE_MAP,
                found,
            }),
        }
    }

    pub fn string_list(&mut self) -> Result<Vec<String>, ProtocolError> {
        let count = self.length()?;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if let Some(name) = self.string()? {
                out.push(name);
            }
        }
        Ok(out)
    }
}

//////////////////////////////////////////////// Frames ////////////////////////////////////////////

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&(body.len() as i32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Handshake frame with no credentials.
pub fn handshake_request() -> Vec<u8> {
    let (major, minor, patch) = VERSION;
    let mut w = Writer::new();
    w.u8(OP_HANDSHAKE)
        .i16(major)
        .i16(minor)
        .i16(patch)
        .u8(CLIENT_CODE_THIN)
        .null()
        .null();
    frame(w.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    Accepted,
    Rejected {
        server_version: (i16, i16, i16),
        message: String,
    },
}

pub fn parse_handshake_reply(body: &[u8]) -> Result<HandshakeReply, ProtocolError> {
    let mut r = Reader::new(body);
    if r.bool()? {
        return Ok(HandshakeReply::Accepted);
    }
    let server_version = (r.i16()?, r.i16()?, r.i16()?);
    let message = r.string()?.unwrap_or_default();
    Ok(HandshakeReply::Rejected {
        server_version,
        message,
    })
}

pub fn request(op: i16, request_id: i64, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.i16(op).i64(request_id);
    let mut body = w.into_inner();
    body.extend_from_slice(payload);
    frame(body)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    Success(Reader<'a>),
    Failure { status: i32, message: String },
}

impl<'a> PartialEq for Reader<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl<'a> Eq for Reader<'a> {}

/// Splits a response body into its payload or the server's error.
pub fn parse_reply(body: &[u8], expected_id: i64) -> Result<Reply<'_>, ProtocolError> {
    let mut r = Reader::new(body);
    let found = r.i64()?;
    if found != expected_id {
        return Err(ProtocolError::RequestIdMismatch {
            expected: expected_id,
            found,
        });
    }
    let status = r.i32()?;
    if status == STATUS_SUCCESS {
        return Ok(Reply::Success(r));
    }
    let message = r.string()?.unwrap_or_default();
    Ok(Reply::Failure { status, message })
}
