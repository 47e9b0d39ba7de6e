//! # Publish/Subscribe Session
//!
//! Purpose: Hold one dedicated connection open for subscription traffic and
//! run both directions of it at once.
//!
//! ## Design Principles
//! 1. **Two Tasks, One Socket**: A writer thread turns requests into
//!    SUBSCRIBE-family frames while a reader thread decodes pushes; each owns
//!    one half of the socket, so they never lock against each other.
//! 2. **First Exit Wins**: Whichever thread stops first decides the session
//!    result; the other is then unblocked and joined.
//! 3. **Always Close**: The socket is shut down on every exit path.
//!
//! ## Flow
//!
//! ```text
//! subscribe ─┐
//! unsubscribe┤                ┌──────── socket ────────┐
//! psubscribe ├─► writer ──────┤ write half   read half ├──► reader ──► messages
//! punsubscr. ┘      ▲         └────────────────────────┘       │
//!                   └──── stop signal ◄── coordinator ◄────────┘
//! ```

use std::collections::HashSet;
use std::thread;

use crossbeam::channel::{self, Receiver, Select, Sender};
use tracing::{debug, trace, warn};

use crate::client::KvClient;
use crate::connection::{Connection, FrameWriter, ReplyReader};
use crate::error::{ClientError, ClientResult};
use crate::resp::Reply;

/// A payload published on a channel the session is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Pattern that matched, or the channel itself for exact subscriptions.
    pub channel_matched: String,
    /// Channel the payload was published on.
    pub channel: String,
    /// Published payload.
    pub payload: Vec<u8>,
}

/// The four request streams a session consumes.
///
/// Each stream yields channel names (patterns for the `p` variants). An empty
/// name on any stream, or all four streams disconnecting, ends the session.
pub struct SubscriptionRequests {
    /// Channel names to SUBSCRIBE to.
    pub subscribe: Receiver<String>,
    /// Channel names to UNSUBSCRIBE from.
    pub unsubscribe: Receiver<String>,
    /// Patterns to PSUBSCRIBE to.
    pub psubscribe: Receiver<String>,
    /// Patterns to PUNSUBSCRIBE from.
    pub punsubscribe: Receiver<String>,
}

/// Sending side matching a [`SubscriptionRequests`].
///
/// Dropping the control (or calling [`close`](Self::close)) disconnects all
/// four streams and lets the session finish.
pub struct SubscriptionControl {
    subscribe: Sender<String>,
    unsubscribe: Sender<String>,
    psubscribe: Sender<String>,
    punsubscribe: Sender<String>,
}

impl SubscriptionControl {
    /// Requests SUBSCRIBE; false once the session has stopped listening.
    pub fn subscribe(&self, channel: impl Into<String>) -> bool {
        self.subscribe.send(channel.into()).is_ok()
    }

    /// Requests UNSUBSCRIBE.
    pub fn unsubscribe(&self, channel: impl Into<String>) -> bool {
        self.unsubscribe.send(channel.into()).is_ok()
    }

    /// Requests PSUBSCRIBE.
    pub fn psubscribe(&self, pattern: impl Into<String>) -> bool {
        self.psubscribe.send(pattern.into()).is_ok()
    }

    /// Requests PUNSUBSCRIBE.
    pub fn punsubscribe(&self, pattern: impl Into<String>) -> bool {
        self.punsubscribe.send(pattern.into()).is_ok()
    }

    /// Disconnects all four streams.
    pub fn close(self) {}
}

/// Builds a connected control/requests pair backed by unbounded channels.
pub fn subscription_channels() -> (SubscriptionControl, SubscriptionRequests) {
    let (subscribe_tx, subscribe_rx) = channel::unbounded();
    let (unsubscribe_tx, unsubscribe_rx) = channel::unbounded();
    let (psubscribe_tx, psubscribe_rx) = channel::unbounded();
    let (punsubscribe_tx, punsubscribe_rx) = channel::unbounded();
    (
        SubscriptionControl {
            subscribe: subscribe_tx,
            unsubscribe: unsubscribe_tx,
            psubscribe: psubscribe_tx,
            punsubscribe: punsubscribe_tx,
        },
        SubscriptionRequests {
            subscribe: subscribe_rx,
            unsubscribe: unsubscribe_rx,
            psubscribe: psubscribe_rx,
            punsubscribe: punsubscribe_rx,
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Subscribe,
    Unsubscribe,
    PSubscribe,
    PUnsubscribe,
}

impl RequestKind {
    fn command(self) -> &'static [u8] {
        match self {
            RequestKind::Subscribe => b"SUBSCRIBE",
            RequestKind::Unsubscribe => b"UNSUBSCRIBE",
            RequestKind::PSubscribe => b"PSUBSCRIBE",
            RequestKind::PUnsubscribe => b"PUNSUBSCRIBE",
        }
    }
}

/// Channels and patterns a session has asked for.
#[derive(Debug, Default)]
struct SubscriptionSet {
    channels: HashSet<String>,
    patterns: HashSet<String>,
}

impl SubscriptionSet {
    fn apply(&mut self, kind: RequestKind, name: String) {
        match kind {
            RequestKind::Subscribe => {
                self.channels.insert(name);
            }
            RequestKind::Unsubscribe => {
                self.channels.remove(&name);
            }
            RequestKind::PSubscribe => {
                self.patterns.insert(name);
            }
            RequestKind::PUnsubscribe => {
                self.patterns.remove(&name);
            }
        }
    }

    /// Exact channel subscriptions.
    fn channels(&self) -> &HashSet<String> {
        &self.channels
    }

    /// Pattern subscriptions.
    fn patterns(&self) -> &HashSet<String> {
        &self.patterns
    }
}

/// Classified array reply received while subscribed.
#[derive(Debug, PartialEq, Eq)]
enum Push {
    Message(Message),
    Ack {
        kind: String,
        name: Option<String>,
        count: Option<i64>,
    },
    Unknown(String),
}

fn classify(items: Vec<Option<Vec<u8>>>) -> ClientResult<Push> {
    let mut parts = items.into_iter();
    let kind = match parts.next().flatten() {
        Some(kind) => kind,
        None => return Ok(Push::Unknown(String::new())),
    };

    match kind.as_slice() {
        b"message" => {
            let channel = text(&field(&mut parts, "channel")?);
            let payload = field(&mut parts, "payload")?;
            Ok(Push::Message(Message {
                channel_matched: channel.clone(),
                channel,
                payload,
            }))
        }
        b"pmessage" => {
            let pattern = text(&field(&mut parts, "pattern")?);
            let channel = text(&field(&mut parts, "channel")?);
            let payload = field(&mut parts, "payload")?;
            Ok(Push::Message(Message {
                channel_matched: pattern,
                channel,
                payload,
            }))
        }
        b"subscribe" | b"unsubscribe" | b"psubscribe" | b"punsubscribe" => Ok(Push::Ack {
            kind: text(&kind),
            name: parts.next().flatten().map(|raw| text(&raw)),
            count: parts
                .next()
                .flatten()
                .and_then(|raw| String::from_utf8(raw).ok())
                .and_then(|raw| raw.parse().ok()),
        }),
        _ => Ok(Push::Unknown(text(&kind))),
    }
}

fn field(parts: &mut impl Iterator<Item = Option<Vec<u8>>>, what: &str) -> ClientResult<Vec<u8>> {
    parts
        .next()
        .flatten()
        .ok_or_else(|| ClientError::protocol(format!("push is missing its {}", what)))
}

fn text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

impl KvClient {
    /// Runs a subscription session until it ends.
    ///
    /// Requests arriving on the four streams are written as they come;
    /// `message` and `pmessage` pushes are delivered to `messages`, while
    /// subscription acknowledgements and unknown pushes are dropped. Returns
    /// `Ok(())` after a cooperative shutdown (empty name, all request streams
    /// closed, or the message receiver dropped) and the first fatal failure
    /// otherwise. The session's connection is closed before returning.
    pub fn subscribe(&self, requests: SubscriptionRequests, messages: Sender<Message>) -> ClientResult<()> {
        let conn = self.open_streaming()?;
        let (reader, writer, control) = conn.split()?;

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::bounded::<(&'static str, ClientResult<()>)>(2);

        thread::scope(|scope| {
            let reader_stop = stop_rx.clone();
            let writer_done = done_tx.clone();
            scope.spawn(move || {
                let mut writer = writer;
                let result = write_requests(&mut writer, &requests, &stop_rx);
                let _ = writer_done.send(("writer", result));
            });

            let reader_done = done_tx;
            scope.spawn(move || {
                let mut reader = reader;
                let result = read_pushes(&mut reader, &messages, &reader_stop);
                let _ = reader_done.send(("reader", result));
            });

            let first = done_rx.recv();
            drop(stop_tx);
            control.shutdown();
            // The survivor fails or stops because of the shutdown; only the
            // first outcome counts.
            let _ = done_rx.recv();

            match first {
                Ok((task, Err(err))) => {
                    warn!(task, error = %err, "subscription session failed");
                    Err(err)
                }
                Ok((task, Ok(()))) => {
                    debug!(task, "subscription session finished");
                    Ok(())
                }
                Err(_) => Ok(()),
            }
        })
    }

    /// Takes a connection for streaming and confirms it is alive.
    ///
    /// An idle pooled connection may have been closed by the server; in that
    /// case a fresh one is dialed instead.
    fn open_streaming(&self) -> ClientResult<Connection> {
        let mut conn = self.pool.acquire()?;
        match conn.exchange(b"PING", &[]) {
            Ok(Reply::Status(status)) if status == "PONG" => Ok(conn.detach()),
            Ok(_) => {
                conn.detach().close();
                Err(ClientError::protocol("unexpected response to PING"))
            }
            Err(err) if err.is_transient() => {
                debug!(error = %err, "streaming connection was stale, dialing a new one");
                drop(conn);
                Ok(self.pool.connect()?.detach())
            }
            Err(err) => Err(err),
        }
    }
}

fn write_requests(
    writer: &mut FrameWriter,
    requests: &SubscriptionRequests,
    stop: &Receiver<()>,
) -> ClientResult<()> {
    let sources = [
        (RequestKind::Subscribe, &requests.subscribe),
        (RequestKind::Unsubscribe, &requests.unsubscribe),
        (RequestKind::PSubscribe, &requests.psubscribe),
        (RequestKind::PUnsubscribe, &requests.punsubscribe),
    ];
    let mut open = [true; 4];
    let mut subscriptions = SubscriptionSet::default();

    loop {
        let mut select = Select::new();
        select.recv(stop);
        // Select index i + 1 belongs to sources[registered[i]].
        let mut registered = Vec::with_capacity(sources.len());
        for (slot, (_, rx)) in sources.iter().enumerate() {
            if open[slot] {
                select.recv(rx);
                registered.push(slot);
            }
        }
        if registered.is_empty() {
            debug!("all request streams closed");
            return Ok(());
        }

        let op = select.select();
        let index = op.index();
        if index == 0 {
            let _ = op.recv(stop);
            return Ok(());
        }

        let slot = registered[index - 1];
        let (kind, rx) = sources[slot];
        match op.recv(rx) {
            Ok(name) if name.is_empty() => {
                debug!("empty channel name, ending session");
                return Ok(());
            }
            Ok(name) => {
                writer.write(kind.command(), &[name.as_bytes()])?;
                trace!(?kind, channel = %name, "request written");
                subscriptions.apply(kind, name);
                trace!(
                    channels = subscriptions.channels().len(),
                    patterns = subscriptions.patterns().len(),
                    "subscriptions updated"
                );
            }
            Err(_) => open[slot] = false,
        }
    }
}

fn read_pushes(
    reader: &mut ReplyReader,
    messages: &Sender<Message>,
    stop: &Receiver<()>,
) -> ClientResult<()> {
    loop {
        let items = match reader.read()? {
            Reply::Array(items) => items,
            other => {
                trace!(?other, "ignoring non-array reply");
                continue;
            }
        };

        match classify(items)? {
            Push::Message(message) => {
                trace!(channel = %message.channel, "message received");
                // A full bounded receiver must not outlive the session.
                channel::select! {
                    send(messages, message) -> sent => if sent.is_err() {
                        debug!("message receiver dropped, ending session");
                        return Ok(());
                    },
                    recv(stop) -> _ => {
                        debug!("session stopping, dropping undelivered message");
                        return Ok(());
                    }
                }
            }
            Push::Ack { kind, name, count } => {
                debug!(kind = %kind, channel = ?name, count = ?count, "subscription acknowledged");
            }
            Push::Unknown(kind) => {
                trace!(kind = %kind, "ignoring unknown push");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(parts: &[Option<&str>]) -> Vec<Option<Vec<u8>>> {
        parts
            .iter()
            .map(|part| part.map(|p| p.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn classifies_message() {
        let push = classify(items(&[Some("message"), Some("chan1"), Some("hello")])).unwrap();
        assert_eq!(
            push,
            Push::Message(Message {
                channel_matched: "chan1".into(),
                channel: "chan1".into(),
                payload: b"hello".to_vec(),
            })
        );
    }

    #[test]
    fn classifies_pattern_message() {
        let push = classify(items(&[Some("pmessage"), Some("ch*"), Some("chan1"), Some("hi")])).unwrap();
        assert_eq!(
            push,
            Push::Message(Message {
                channel_matched: "ch*".into(),
                channel: "chan1".into(),
                payload: b"hi".to_vec(),
            })
        );
    }

    #[test]
    fn acknowledgements_are_not_messages() {
        let push = classify(items(&[Some("subscribe"), Some("chan1"), Some("1")])).unwrap();
        assert_eq!(
            push,
            Push::Ack {
                kind: "subscribe".into(),
                name: Some("chan1".into()),
                count: Some(1),
            }
        );
        let push = classify(items(&[Some("unsubscribe"), None, Some("0")])).unwrap();
        assert!(matches!(push, Push::Ack { name: None, count: Some(0), .. }));
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        assert_eq!(
            classify(items(&[Some("pong"), Some("")])).unwrap(),
            Push::Unknown("pong".into())
        );
        assert_eq!(classify(Vec::new()).unwrap(), Push::Unknown(String::new()));
    }

    #[test]
    fn truncated_message_is_protocol_error() {
        match classify(items(&[Some("message"), Some("chan1")])) {
            Err(ClientError::Protocol(message)) => assert_eq!(message, "push is missing its payload"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subscription_set_tracks_requests() {
        let mut set = SubscriptionSet::default();
        set.apply(RequestKind::Subscribe, "a".into());
        set.apply(RequestKind::Subscribe, "b".into());
        set.apply(RequestKind::PSubscribe, "c*".into());
        set.apply(RequestKind::Unsubscribe, "a".into());
        assert_eq!(set.channels().len(), 1);
        assert!(set.channels().contains("b"));
        assert!(set.patterns().contains("c*"));
        set.apply(RequestKind::PUnsubscribe, "c*".into());
        assert!(set.patterns().is_empty());
    }
}
