//! # RESP Encoding and Decoding
//!
//! Purpose: Encode commands as arrays of bulk strings and decode exactly one
//! reply from a buffered stream.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are decoded top-down with no carried state.
//! 2. **Buffer Reuse**: Callers own the line buffer so each call stays allocation-light.
//! 3. **Binary-Safe**: Bulk payloads are length-delimited raw bytes.
//! 4. **Typed Outcomes**: `-` replies become `ClientError::Server` and `$-1`
//!    becomes `ClientError::NotFound`; inside arrays absence is kept as `None`.
//!
//! Lines are read up to `\n` and trimmed, so both CRLF and bare LF framing are
//! accepted on input. Output always uses CRLF.

use std::io::{self, BufRead, Read};

use crate::error::{ClientError, ClientResult};

/// Upper bound for up-front allocation driven by a length the server declared.
const MAX_PREALLOC: usize = 64 * 1024;

/// Decoded reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`, `+PONG` style status text.
    Status(String),
    /// `:123` integer reply.
    Integer(i64),
    /// `$n` bulk payload that is present.
    Bulk(Vec<u8>),
    /// `*n` multibulk; `None` marks an absent element.
    Array(Vec<Option<Vec<u8>>>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk",
            Reply::Array(_) => "array",
        }
    }

    fn mismatch(&self, expected: &str) -> ClientError {
        ClientError::UnexpectedReply(format!("expected {}, got {}", expected, self.kind()))
    }

    /// Returns the status text.
    pub fn into_status(self) -> ClientResult<String> {
        match self {
            Reply::Status(text) => Ok(text),
            other => Err(other.mismatch("status")),
        }
    }

    /// Returns the integer value.
    pub fn into_integer(self) -> ClientResult<i64> {
        match self {
            Reply::Integer(value) => Ok(value),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Returns the bulk payload.
    pub fn into_bulk(self) -> ClientResult<Vec<u8>> {
        match self {
            Reply::Bulk(data) => Ok(data),
            other => Err(other.mismatch("bulk")),
        }
    }

    /// Returns the multibulk elements.
    pub fn into_array(self) -> ClientResult<Vec<Option<Vec<u8>>>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.mismatch("array")),
        }
    }
}

/// Encodes `command` and `args` as one request frame into `out`.
pub fn encode_command(command: &[u8], args: &[&[u8]], out: &mut Vec<u8>) {
    push_header(out, b'*', args.len() + 1);
    push_bulk(out, command);
    for arg in args {
        push_bulk(out, arg);
    }
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    push_header(out, b'$', data.len());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn push_header(out: &mut Vec<u8>, prefix: u8, len: usize) {
    out.push(prefix);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Reads one reply, skipping blank lines before it.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    loop {
        read_line(reader, line_buf)?;
        if !trim(line_buf).is_empty() {
            break;
        }
    }

    let line = trim(line_buf);
    match line[0] {
        b'+' => Ok(Reply::Status(lossy(&line[1..]))),
        b'-' => Err(ClientError::Server(server_message(&line[1..]))),
        b':' => parse_i64(&line[1..])
            .map(Reply::Integer)
            .ok_or_else(|| ClientError::protocol("integer reply is not a number")),
        b'*' => {
            let size = parse_i64(&line[1..])
                .ok_or_else(|| ClientError::protocol("multibulk reply expected a number"))?;
            read_array(reader, size, line_buf)
        }
        _ => bulk_from_head(reader, line_buf).map(Reply::Bulk),
    }
}

/// Reads one bulk (or integer-as-bytes) element.
///
/// Array elements always go through this path, never through `read_reply`.
pub(crate) fn read_bulk<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Vec<u8>> {
    read_line(reader, line_buf)?;
    bulk_from_head(reader, line_buf)
}

fn read_array<R: BufRead>(
    reader: &mut R,
    size: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<Reply> {
    if size <= 0 {
        return Ok(Reply::Array(Vec::new()));
    }

    let size = size as usize;
    let mut items = Vec::with_capacity(size.min(MAX_PREALLOC));
    for _ in 0..size {
        match read_bulk(reader, line_buf) {
            Ok(data) => items.push(Some(data)),
            Err(ClientError::NotFound) => items.push(None),
            Err(err) => return Err(err),
        }
    }
    Ok(Reply::Array(items))
}

// `head_buf` holds the header line that was just read.
fn bulk_from_head<R: BufRead>(reader: &mut R, head_buf: &mut Vec<u8>) -> ClientResult<Vec<u8>> {
    let head = trim(head_buf);
    let size = match head.first() {
        Some(b':') => return Ok(head[1..].to_vec()),
        Some(b'$') => parse_i64(&head[1..])
            .ok_or_else(|| ClientError::protocol("bulk reply expected a length"))?,
        _ => return Err(ClientError::protocol("expected prefix $ or :")),
    };
    if size == -1 {
        return Err(ClientError::NotFound);
    }
    if size < 0 {
        return Err(ClientError::protocol("bulk reply expected a length"));
    }

    let size = size as usize;
    let mut data = Vec::with_capacity(size.min(MAX_PREALLOC));
    reader.by_ref().take(size as u64).read_to_end(&mut data)?;
    if data.len() < size {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    read_line(reader, head_buf)?;
    if !trim(head_buf).is_empty() {
        return Err(ClientError::protocol("bulk reply longer than declared"));
    }
    Ok(data)
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    reader.read_until(b'\n', buf)?;
    if buf.last() != Some(&b'\n') {
        // Zero bytes or a torn line both mean the peer went away mid-reply.
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

fn trim(line: &[u8]) -> &[u8] {
    line.trim_ascii()
}

fn parse_i64(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(trim(data)).ok()?.parse().ok()
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(trim(data)).into_owned()
}

fn server_message(data: &[u8]) -> String {
    match data.strip_prefix(b"ERR ") {
        Some(rest) => lossy(rest),
        None => lossy(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(input: &[u8]) -> ClientResult<Reply> {
        let mut reader = Cursor::new(input.to_vec());
        let mut line = Vec::new();
        read_reply(&mut reader, &mut line)
    }

    #[test]
    fn encodes_command() {
        let mut buf = Vec::new();
        encode_command(b"GET", &[b"key"], &mut buf);
        assert_eq!(&buf, b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    #[test]
    fn encodes_command_without_args() {
        let mut buf = Vec::new();
        encode_command(b"PING", &[], &mut buf);
        assert_eq!(&buf, b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn encoded_frame_decodes_back_to_arguments() {
        let args: [&[u8]; 4] = [b"with space", b"line\r\nbreak", b"", b"\n"];
        let mut buf = Vec::new();
        encode_command(b"SET", &args, &mut buf);

        let items = decode(&buf).unwrap().into_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].as_deref(), Some(&b"SET"[..]));
        for (item, arg) in items[1..].iter().zip(args) {
            assert_eq!(item.as_deref(), Some(arg));
        }
    }

    #[test]
    fn parses_status() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), Reply::Status("OK".into()));
    }

    #[test]
    fn server_error_strips_err_prefix() {
        match decode(b"-ERR bad thing\r\n") {
            Err(ClientError::Server(message)) => assert_eq!(message, "bad thing"),
            other => panic!("unexpected {:?}", other),
        }
        match decode(b"-WRONGTYPE nope\r\n") {
            Err(ClientError::Server(message)) => assert_eq!(message, "WRONGTYPE nope"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_integer() {
        assert_eq!(decode(b":42\r\n").unwrap(), Reply::Integer(42));
        assert_eq!(decode(b":-7\r\n").unwrap(), Reply::Integer(-7));
    }

    #[test]
    fn rejects_non_numeric_integer() {
        match decode(b":abc\r\n") {
            Err(ClientError::Protocol(message)) => assert_eq!(message, "integer reply is not a number"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_bulk() {
        assert_eq!(decode(b"$5\r\nhello\r\n").unwrap(), Reply::Bulk(b"hello".to_vec()));
        assert_eq!(decode(b"$0\r\n\r\n").unwrap(), Reply::Bulk(Vec::new()));
    }

    #[test]
    fn null_bulk_is_not_found() {
        assert!(decode(b"$-1\r\n").unwrap_err().is_not_found());
    }

    #[test]
    fn empty_and_negative_arrays_are_empty() {
        assert_eq!(decode(b"*0\r\n").unwrap(), Reply::Array(Vec::new()));
        assert_eq!(decode(b"*-3\r\n").unwrap(), Reply::Array(Vec::new()));
    }

    #[test]
    fn array_keeps_missing_slots() {
        let reply = decode(b"*3\r\n$1\r\na\r\n$-1\r\n:5\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![Some(b"a".to_vec()), None, Some(b"5".to_vec())])
        );
    }

    #[test]
    fn array_element_with_bad_prefix_fails_whole_reply() {
        match decode(b"*2\r\n$1\r\na\r\n+OK\r\n") {
            Err(ClientError::Protocol(message)) => assert_eq!(message, "expected prefix $ or :"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn skips_blank_lines_and_accepts_bare_newlines() {
        assert_eq!(decode(b"\r\n  \n+PONG\n").unwrap(), Reply::Status("PONG".into()));
        assert_eq!(decode(b"$2\nhi\n").unwrap(), Reply::Bulk(b"hi".to_vec()));
    }

    #[test]
    fn short_bulk_read_is_io_error() {
        match decode(b"$10\r\nabc") {
            Err(ClientError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn end_of_stream_is_transient() {
        assert!(decode(b"").unwrap_err().is_transient());
    }

    #[test]
    fn unknown_prefix_is_protocol_error() {
        match decode(b"%2\r\n") {
            Err(ClientError::Protocol(message)) => assert_eq!(message, "expected prefix $ or :"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn accessors_report_mismatch() {
        match Reply::Integer(1).into_bulk() {
            Err(ClientError::UnexpectedReply(message)) => {
                assert_eq!(message, "expected bulk, got integer")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
