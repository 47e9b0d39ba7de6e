//! # TCP Server
//!
//! Accept RESP connections, parse requests, and dispatch them to the
//! keyspace or the pub/sub broker. Each connection runs in its own task and
//! multiplexes request handling with pushes queued by the broker.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::broker::{Broker, SubscriberId, Target};
use crate::commands;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    push_ack, push_bulks, resp_bulk, resp_error, resp_error_kind, resp_integer, resp_simple,
    RespError, RespParser,
};
use crate::store::{Keyspace, DATABASES};

/// State shared by every connection.
#[derive(Debug, Default)]
pub struct ServerState {
    pub keyspace: Keyspace,
    pub broker: Broker,
    pub metrics: ServerMetrics,
    password: Option<String>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires clients to AUTH with `password` before anything else.
    pub fn with_password(password: impl Into<String>) -> Self {
        ServerState {
            password: Some(password.into()),
            ..Self::default()
        }
    }
}

/// Accepts connections until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        state.metrics.record_open();
        debug!(%peer, "connection accepted");

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, Arc::clone(&state)).await {
                warn!(%peer, error = %err, "connection ended with error");
            }
            state.metrics.record_close();
            debug!(%peer, "connection closed");
        });
    }
}

/// Binds `addr` and serves it, logging the bound address.
pub async fn run(addr: &str, state: Arc<ServerState>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    info!(addr = %local, "listening");
    serve(listener, state).await
}

/// Per-connection protocol state.
struct Session {
    db: usize,
    authed: bool,
    subscriber: SubscriberId,
}

/// Handles a single TCP client connection.
pub async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (outbound_tx, mut outbound_rx) = unbounded_channel();
    let mut session = Session {
        db: 0,
        authed: state.password.is_none(),
        subscriber: state.broker.register(outbound_tx),
    };

    let result = drive(stream, &state, &mut session, &mut outbound_rx).await;
    state.broker.remove(session.subscriber);
    result
}

async fn drive(
    mut stream: TcpStream,
    state: &ServerState,
    session: &mut Session,
    outbound: &mut UnboundedReceiver<Vec<u8>>,
) -> io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut parser = RespParser::new();

    loop {
        tokio::select! {
            read = stream.read_buf(&mut buffer) => {
                if read? == 0 {
                    return Ok(());
                }

                let mut response = Vec::new();
                loop {
                    match parser.parse(&mut buffer) {
                        Ok(Some(args)) => {
                            let reply = session.dispatch(&args, state);
                            state.metrics.record_command();
                            if reply.first() == Some(&b'-') {
                                state.metrics.record_error();
                            }
                            response.extend_from_slice(&reply);
                        }
                        Ok(None) => break,
                        Err(RespError::Protocol) => {
                            response.extend_from_slice(&resp_error("protocol error"));
                            stream.write_all(&response).await?;
                            return Ok(());
                        }
                    }
                }
                stream.write_all(&response).await?;
            }
            Some(frame) = outbound.recv() => {
                stream.write_all(&frame).await?;
            }
        }
    }
}

impl Session {
    fn dispatch(&mut self, args: &[Vec<u8>], state: &ServerState) -> Vec<u8> {
        let cmd = match args.first() {
            Some(cmd) => cmd.to_ascii_uppercase(),
            None => return resp_error("empty command"),
        };

        if cmd == b"AUTH" {
            return self.auth(args, state);
        }
        if !self.authed {
            return resp_error_kind("NOAUTH", "Authentication required.");
        }

        let subscribed = state.broker.subscriptions(self.subscriber) > 0;
        match cmd.as_slice() {
            b"SUBSCRIBE" => return self.subscribe(args, state, Target::Channel, b"subscribe"),
            b"PSUBSCRIBE" => return self.subscribe(args, state, Target::Pattern, b"psubscribe"),
            b"UNSUBSCRIBE" => {
                return self.unsubscribe(args, state, Target::Channel, b"unsubscribe")
            }
            b"PUNSUBSCRIBE" => {
                return self.unsubscribe(args, state, Target::Pattern, b"punsubscribe")
            }
            b"PING" if subscribed => {
                let mut out = Vec::new();
                let payload = args.get(1).map_or(&b""[..], |arg| arg.as_slice());
                push_bulks(&mut out, &[&b"pong"[..], payload]);
                return out;
            }
            _ if subscribed => {
                return resp_error(
                    "only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context",
                )
            }
            _ => {}
        }

        match cmd.as_slice() {
            b"PING" => match args.len() {
                1 => resp_simple("PONG"),
                2 => resp_bulk(&args[1]),
                _ => resp_error("wrong number of arguments for 'ping' command"),
            },
            b"ECHO" if args.len() == 2 => resp_bulk(&args[1]),
            b"ECHO" => resp_error("wrong number of arguments for 'echo' command"),
            b"SELECT" => self.select(args),
            b"FLUSHALL" => {
                state.keyspace.flush_all();
                resp_simple("OK")
            }
            b"PUBLISH" if args.len() == 3 => {
                resp_integer(state.broker.publish(&args[1], &args[2]) as i64)
            }
            b"PUBLISH" => resp_error("wrong number of arguments for 'publish' command"),
            _ => match state.keyspace.db(self.db) {
                Some(mut db) => commands::execute(&mut db, args)
                    .unwrap_or_else(|| resp_error("unknown command")),
                None => resp_error("DB index is out of range"),
            },
        }
    }

    fn auth(&mut self, args: &[Vec<u8>], state: &ServerState) -> Vec<u8> {
        if args.len() != 2 {
            return resp_error("wrong number of arguments for 'auth' command");
        }
        match &state.password {
            None => resp_error("Client sent AUTH, but no password is set"),
            Some(password) if password.as_bytes() == args[1].as_slice() => {
                self.authed = true;
                resp_simple("OK")
            }
            Some(_) => {
                self.authed = false;
                resp_error_kind("WRONGPASS", "invalid password")
            }
        }
    }

    fn select(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        if args.len() != 2 {
            return resp_error("wrong number of arguments for 'select' command");
        }
        let index = std::str::from_utf8(&args[1])
            .ok()
            .and_then(|text| text.parse::<usize>().ok());
        match index {
            Some(index) if index < DATABASES => {
                self.db = index;
                resp_simple("OK")
            }
            Some(_) => resp_error("DB index is out of range"),
            None => resp_error("value is not an integer or out of range"),
        }
    }

    fn subscribe(
        &mut self,
        args: &[Vec<u8>],
        state: &ServerState,
        target: Target,
        kind: &[u8],
    ) -> Vec<u8> {
        if args.len() < 2 {
            return resp_error(&format!(
                "wrong number of arguments for '{}' command",
                String::from_utf8_lossy(kind)
            ));
        }
        let mut out = Vec::new();
        for name in &args[1..] {
            let count = state.broker.subscribe(self.subscriber, target, name);
            push_ack(&mut out, kind, Some(name.as_slice()), count as i64);
        }
        out
    }

    /// Without names, drops every subscription of `target`.
    fn unsubscribe(
        &mut self,
        args: &[Vec<u8>],
        state: &ServerState,
        target: Target,
        kind: &[u8],
    ) -> Vec<u8> {
        let names = if args.len() > 1 {
            args[1..].to_vec()
        } else {
            state.broker.names(self.subscriber, target)
        };

        let mut out = Vec::new();
        if names.is_empty() {
            let count = state.broker.subscriptions(self.subscriber);
            push_ack(&mut out, kind, None, count as i64);
            return out;
        }
        for name in &names {
            let count = state.broker.unsubscribe(self.subscriber, target, name);
            push_ack(&mut out, kind, Some(name.as_slice()), count as i64);
        }
        out
    }
}
