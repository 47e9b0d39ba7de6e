#![allow(dead_code)]

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Scripted loopback server. The script runs on its own thread and owns the
/// listener; dropping the listener makes later dials fail.
pub struct Stub {
    pub addr: String,
    handle: JoinHandle<()>,
}

impl Stub {
    /// Waits for the script to finish, re-raising its assertion failures.
    pub fn join(self) {
        if let Err(panic) = self.handle.join() {
            std::panic::resume_unwind(panic);
        }
    }
}

pub fn spawn_server<F>(script: F) -> Stub
where
    F: FnOnce(TcpListener) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let handle = thread::spawn(move || script(listener));
    Stub { addr, handle }
}

/// Address nobody listens on.
pub fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").to_string()
}

/// One accepted connection seen from the server side.
pub struct StubConn {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl StubConn {
    pub fn accept(listener: &TcpListener) -> StubConn {
        let (stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone"));
        StubConn { stream, reader }
    }

    /// Reads one request, or `None` once the client closed the connection.
    pub fn try_read_command(&mut self) -> std::io::Result<Option<Vec<Vec<u8>>>> {
        let line = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };
        if line.first() != Some(&b'*') {
            return Err(invalid("expected array"));
        }
        let count = parse_usize(&line[1..])?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self
                .read_line()?
                .ok_or_else(|| std::io::Error::new(ErrorKind::UnexpectedEof, "eof"))?;
            if line.first() != Some(&b'$') {
                return Err(invalid("expected bulk"));
            }
            let len = parse_usize(&line[1..])?;
            let mut data = vec![0u8; len + 2];
            self.reader.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(invalid("missing crlf"));
            }
            data.truncate(len);
            args.push(data);
        }
        Ok(Some(args))
    }

    pub fn read_command(&mut self) -> Vec<Vec<u8>> {
        self.try_read_command()
            .expect("read command")
            .expect("client closed the connection")
    }

    /// Reads one request and asserts it matches `expected` word for word.
    pub fn expect(&mut self, expected: &[&str]) {
        let args: Vec<String> = self
            .read_command()
            .into_iter()
            .map(|arg| String::from_utf8_lossy(&arg).into_owned())
            .collect();
        assert_eq!(args, expected);
    }

    pub fn reply(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).expect("write reply");
    }

    /// Expects `request` and answers with `raw`.
    pub fn answer(&mut self, request: &[&str], raw: &[u8]) {
        self.expect(request);
        self.reply(raw);
    }

    /// Asserts the client closes the connection without sending more.
    pub fn wait_closed(&mut self) {
        match self.try_read_command() {
            Ok(None) => {}
            Err(err) if err.kind() == ErrorKind::ConnectionReset => {}
            Ok(Some(args)) => panic!("unexpected request {:?}", args),
            Err(err) => panic!("connection was not closed: {}", err),
        }
    }

    fn read_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if !line.ends_with(b"\r\n") {
            return Err(invalid("invalid line"));
        }
        line.truncate(line.len() - 2);
        Ok(Some(line))
    }
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(ErrorKind::InvalidData, message.to_string())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("expected a length"))
}

/// Encodes a pub/sub push of bulk strings.
pub fn push(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n{}\r\n", part.len(), part).as_bytes());
    }
    out
}

/// Encodes a subscription acknowledgement.
pub fn ack(kind: &str, name: &str, count: i64) -> Vec<u8> {
    format!(
        "*3\r\n${}\r\n{}\r\n${}\r\n{}\r\n:{}\r\n",
        kind.len(),
        kind,
        name.len(),
        name,
        count
    )
    .into_bytes()
}
