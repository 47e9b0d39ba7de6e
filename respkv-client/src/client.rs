//! # Client Facade and Command Dispatcher
//!
//! Purpose: Expose one blocking entry point that sends a command over a pooled
//! connection and returns the decoded reply.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KvClient` hides pooling and protocol details.
//! 2. **One In Flight**: Each connection carries a single request at a time.
//! 3. **Retry Once**: A stale connection gets exactly one fresh replacement.
//! 4. **Fail Fast**: Server and protocol errors are never retried.

use tracing::warn;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::pool::ConnectionPool;
use crate::resp::Reply;

/// Blocking client with connection pooling.
///
/// Cloning is cheap; clones share the pool. Each call acquires a connection,
/// performs one exchange and hands the connection back if it is still healthy.
#[derive(Clone)]
pub struct KvClient {
    pub(crate) pool: ConnectionPool,
}

impl KvClient {
    /// Creates a client with default configuration for `addr`.
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(addr))
    }

    /// Creates a client with a custom configuration. Nothing is dialed yet.
    pub fn with_config(config: ClientConfig) -> Self {
        KvClient {
            pool: ConnectionPool::new(config),
        }
    }

    /// Configuration the client dials with.
    pub fn config(&self) -> &ClientConfig {
        self.pool.config()
    }

    /// Number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    /// Sends `command` with `args` and returns the decoded reply.
    ///
    /// A reset, broken pipe or premature close on the first attempt causes
    /// one retry on a freshly dialed connection; whatever the retry yields is
    /// returned. The connection used last goes back to the pool only when the
    /// exchange left it in sync.
    pub fn send(&self, command: &str, args: &[&[u8]]) -> ClientResult<Reply> {
        let mut conn = self.pool.acquire()?;
        match conn.exchange(command.as_bytes(), args) {
            Err(err) if err.is_transient() => {
                warn!(command, error = %err, "connection failed, retrying on a new connection");
                drop(conn);
                let mut fresh = self.pool.connect()?;
                fresh.exchange(command.as_bytes(), args)
            }
            result => result,
        }
    }
}
