//! # Connection Pool
//!
//! Purpose: Reuse TCP connections across commands to avoid a dial per call.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of idle connections.
//! 2. **Never Block**: An empty pool dials, a full pool closes; callers never wait.
//! 3. **Healthy Only**: Broken connections are closed instead of re-pooled.
//! 4. **Minimal Locking**: The mutex is held only while moving idle connections.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientResult;
use crate::resp::Reply;

struct PoolInner {
    config: ClientConfig,
    idle: Mutex<VecDeque<Connection>>,
}

/// Connection pool handle. Clones share the same idle set.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool; nothing is dialed until the first acquire.
    pub fn new(config: ClientConfig) -> Self {
        let idle = VecDeque::with_capacity(config.pool_size.min(16));
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                idle: Mutex::new(idle),
            }),
        }
    }

    /// Takes an idle connection, or dials a new one when none is idle.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let idle = self.inner.idle.lock().pop_front();
        match idle {
            Some(conn) => Ok(self.wrap(conn)),
            None => self.connect(),
        }
    }

    /// Dials a fresh connection regardless of what is idle.
    pub fn connect(&self) -> ClientResult<PooledConnection> {
        let conn = Connection::open(&self.inner.config)?;
        Ok(self.wrap(conn))
    }

    /// Number of idle connections currently held.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Configuration connections are dialed with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn wrap(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            pool: self.clone(),
            conn: Some(conn),
        }
    }

    fn release(&self, conn: Connection) {
        if conn.is_broken() {
            conn.close();
            return;
        }

        let overflow = {
            let mut idle = self.inner.idle.lock();
            if idle.len() < self.inner.config.pool_size {
                idle.push_back(conn);
                None
            } else {
                Some(conn)
            }
        };
        if let Some(conn) = overflow {
            debug!(capacity = self.inner.config.pool_size, "pool full, closing connection");
            conn.close();
        }
    }
}

/// RAII wrapper that hands the connection back to the pool on drop.
pub struct PooledConnection {
    pool: ConnectionPool,
    conn: Option<Connection>,
}

impl PooledConnection {
    /// Performs one request/response exchange.
    pub fn exchange(&mut self, command: &[u8], args: &[&[u8]]) -> ClientResult<Reply> {
        match self.conn.as_mut() {
            Some(conn) => conn.exchange(command, args),
            None => unreachable!("connection taken before drop"),
        }
    }

    /// Removes the connection from pool management; the caller must close it.
    pub fn detach(mut self) -> Connection {
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("connection taken before drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
