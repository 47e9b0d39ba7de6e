//! # Connection
//!
//! Purpose: Own one TCP socket to the server together with the buffers used
//! to frame requests and decode replies on it.
//!
//! ## Design Principles
//! 1. **Single Owner**: A connection is used by one exchange at a time; the
//!    pool hands it out and takes it back.
//! 2. **Health Tracking**: Any failure that may leave unread bytes on the
//!    socket marks the connection broken so it is never reused.
//! 3. **Split for Streaming**: Pub/sub turns the connection into independent
//!    read and write halves that can block concurrently.

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_reply, Reply};

/// Single TCP connection with reusable buffers.
pub struct Connection {
    addr: String,
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    broken: bool,
}

impl Connection {
    /// Dials the configured address, then authenticates and selects the
    /// configured database when those are set.
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(addr = %config.addr, "dialed connection");

        let mut conn = Connection {
            addr: config.addr.clone(),
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            broken: false,
        };

        if let Some(password) = &config.password {
            conn.exchange(b"AUTH", &[password.as_bytes()])?.into_status()?;
            debug!(addr = %conn.addr, "authenticated");
        }
        if config.db != 0 {
            let db = config.db.to_string();
            conn.exchange(b"SELECT", &[db.as_bytes()])?.into_status()?;
            debug!(addr = %conn.addr, db = config.db, "selected database");
        }

        Ok(conn)
    }

    /// Writes one request frame and decodes exactly one reply.
    pub fn exchange(&mut self, command: &[u8], args: &[&[u8]]) -> ClientResult<Reply> {
        self.write_buf.clear();
        encode_command(command, args, &mut self.write_buf);

        let result = self.write_then_read();
        if let Err(err) = &result {
            if !err.leaves_connection_usable() {
                self.broken = true;
            }
        }
        result
    }

    fn write_then_read(&mut self) -> ClientResult<Reply> {
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_reply(&mut self.reader, &mut self.line_buf)
    }

    /// Returns true once an exchange failed in a way that desynchronised it.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Shuts both directions down and releases the socket.
    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
        debug!(addr = %self.addr, broken = self.broken, "closed connection");
    }

    /// Splits into independently blocking halves for a streaming session.
    ///
    /// The read timeout is cleared: pushes may arrive arbitrarily late.
    pub(crate) fn split(self) -> ClientResult<(ReplyReader, FrameWriter, ShutdownHandle)> {
        let stream = self.reader.get_ref();
        stream.set_read_timeout(None)?;
        let writer = stream.try_clone()?;
        let control = stream.try_clone()?;

        Ok((
            ReplyReader {
                reader: self.reader,
                line_buf: self.line_buf,
            },
            FrameWriter {
                stream: writer,
                buf: self.write_buf,
            },
            ShutdownHandle {
                stream: control,
                addr: self.addr,
            },
        ))
    }
}

/// Read half of a split connection.
pub(crate) struct ReplyReader {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
}

impl ReplyReader {
    pub(crate) fn read(&mut self) -> ClientResult<Reply> {
        read_reply(&mut self.reader, &mut self.line_buf)
    }
}

/// Write half of a split connection.
pub(crate) struct FrameWriter {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl FrameWriter {
    pub(crate) fn write(&mut self, command: &[u8], args: &[&[u8]]) -> ClientResult<()> {
        self.buf.clear();
        encode_command(command, args, &mut self.buf);
        self.stream.write_all(&self.buf)?;
        self.stream.flush()?;
        Ok(())
    }
}

/// Handle that can tear a split connection down from a third thread.
pub(crate) struct ShutdownHandle {
    stream: TcpStream,
    addr: String,
}

impl ShutdownHandle {
    /// Unblocks any read or write pending on either half.
    pub(crate) fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!(addr = %self.addr, "closed streaming connection");
    }
}

fn connect_stream(config: &ClientConfig) -> ClientResult<TcpStream> {
    let addrs: Vec<SocketAddr> = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(source) => Err(ClientError::Connect {
            addr: config.addr.clone(),
            source,
        }),
        None => Err(ClientError::InvalidAddress(config.addr.clone())),
    }
}
