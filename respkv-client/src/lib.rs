//! # RespKV Client
//!
//! Purpose: Provide a blocking client for RESP key-value stores with connection
//! pooling, one-shot reconnect on stale connections, and a pub/sub session.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Typed Failures**: Absence, server errors, protocol errors and transport
//!    errors are distinct `ClientError` variants.
//! 3. **Protocol Clarity**: Encode/decode RESP explicitly for correctness.
//! 4. **Thread per Direction**: Pub/sub runs its reader and writer concurrently
//!    on one socket.
//!
//! ## Example
//!
//! ```no_run
//! use respkv_client::{KvClient, OptionalExt};
//!
//! let client = KvClient::connect("127.0.0.1:7379");
//! client.set("greeting", b"hello")?;
//! assert_eq!(client.get("greeting").optional()?, Some(b"hello".to_vec()));
//! # Ok::<(), respkv_client::ClientError>(())
//! ```

mod client;
mod commands;
mod config;
mod connection;
mod error;
mod pool;
mod pubsub;
mod record;
mod resp;

pub use client::KvClient;
pub use config::{ClientConfig, DEFAULT_ADDR, DEFAULT_POOL_SIZE};
pub use error::{ClientError, ClientResult, OptionalExt};
pub use pubsub::{subscription_channels, Message, SubscriptionControl, SubscriptionRequests};
pub use record::{parse_field, HashRecord};
pub use resp::{encode_command, read_reply, Reply};
