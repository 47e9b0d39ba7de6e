//! # RespKV Server
//!
//! A small in-memory RESP store: strings, lists, sets, hashes, sixteen
//! logical databases, optional password and pub/sub fan-out. It backs the
//! client's end-to-end tests and local experiments.

pub mod broker;
pub mod commands;
pub mod glob;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod store;

pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use server::{handle_connection, run, serve, ServerState};
