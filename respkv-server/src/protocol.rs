//! # Request Parsing and Reply Encoding
//!
//! Requests are arrays of bulk strings. The parser works on whatever bytes
//! have arrived so far and only consumes a request once it is complete.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Longest header line accepted before the request is rejected.
const MAX_HEADER_LEN: usize = 32;

/// Largest argument count or bulk length accepted.
const MAX_DECLARED_LEN: usize = 512 * 1024 * 1024;

/// Request framing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespError {
    /// Bytes did not form an array of bulk strings.
    #[error("protocol error")]
    Protocol,
}

/// Incremental parser for request arrays.
#[derive(Debug, Default)]
pub struct RespParser;

impl RespParser {
    pub fn new() -> Self {
        RespParser
    }

    /// Takes one complete request off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the request is
    /// still incomplete.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let mut pos = 0;
        let count = match read_header(buf, &mut pos, b'*')? {
            Some(count) => count,
            None => return Ok(None),
        };

        let mut args = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let len = match read_header(buf, &mut pos, b'$')? {
                Some(len) => len,
                None => return Ok(None),
            };
            if buf.len() < pos + len + 2 {
                return Ok(None);
            }
            if &buf[pos + len..pos + len + 2] != b"\r\n" {
                return Err(RespError::Protocol);
            }
            args.push(buf[pos..pos + len].to_vec());
            pos += len + 2;
        }

        buf.advance(pos);
        Ok(Some(args))
    }
}

fn read_header(buf: &[u8], pos: &mut usize, prefix: u8) -> Result<Option<usize>, RespError> {
    let rest = &buf[*pos..];
    match rest.first() {
        None => return Ok(None),
        Some(&b) if b != prefix => return Err(RespError::Protocol),
        Some(_) => {}
    }

    let end = match rest.windows(2).position(|w| w == b"\r\n") {
        Some(end) => end,
        None if rest.len() > MAX_HEADER_LEN => return Err(RespError::Protocol),
        None => return Ok(None),
    };

    let value = parse_usize(&rest[1..end])?;
    if value > MAX_DECLARED_LEN {
        return Err(RespError::Protocol);
    }
    *pos += end + 2;
    Ok(Some(value))
}

fn parse_usize(data: &[u8]) -> Result<usize, RespError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(RespError::Protocol)
}

pub fn resp_simple(message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.len() + 3);
    buf.push(b'+');
    buf.extend_from_slice(message.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}

/// `-ERR <message>`.
pub fn resp_error(message: &str) -> Vec<u8> {
    resp_error_kind("ERR", message)
}

/// Error reply with an explicit kind, e.g. `WRONGTYPE` or `NOAUTH`.
pub fn resp_error_kind(kind: &str, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(kind.len() + message.len() + 4);
    buf.push(b'-');
    buf.extend_from_slice(kind.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(message.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}

pub fn resp_integer(value: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    push_integer(&mut buf, value);
    buf
}

pub fn resp_bulk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 16);
    push_bulk(&mut buf, Some(data));
    buf
}

pub fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Array of bulk strings; `None` entries encode as null bulks.
pub fn resp_array<'a>(items: impl ExactSizeIterator<Item = Option<&'a [u8]>>) -> Vec<u8> {
    let mut buf = Vec::new();
    push_array_header(&mut buf, items.len());
    for item in items {
        push_bulk(&mut buf, item);
    }
    buf
}

/// Three-element pub/sub reply: kind, name, then an integer.
pub fn push_ack(out: &mut Vec<u8>, kind: &[u8], name: Option<&[u8]>, count: i64) {
    push_array_header(out, 3);
    push_bulk(out, Some(kind));
    push_bulk(out, name);
    push_integer(out, count);
}

/// Array of bulk strings appended to `out`.
pub fn push_bulks(out: &mut Vec<u8>, items: &[&[u8]]) {
    push_array_header(out, items.len());
    for item in items {
        push_bulk(out, Some(*item));
    }
}

fn push_array_header(out: &mut Vec<u8>, len: usize) {
    out.push(b'*');
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn push_bulk(out: &mut Vec<u8>, data: Option<&[u8]>) {
    match data {
        Some(data) => {
            out.push(b'$');
            out.extend_from_slice(data.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        None => out.extend_from_slice(b"$-1\r\n"),
    }
}

fn push_integer(out: &mut Vec<u8>, value: i64) {
    out.push(b':');
    out.extend_from_slice(value.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}
