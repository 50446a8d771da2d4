//! Idle connection tracking for timeout eviction.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A connection waiting in the idle set.
#[derive(Debug)]
pub struct IdleConnection<T> {
    /// The connection.
    pub conn: T,

    /// When the connection was returned to the pool.
    pub since: Instant,
}

impl<T> IdleConnection<T> {
    /// Start tracking an idle connection.
    pub fn new(conn: T) -> Self {
        Self {
            conn,
            since: Instant::now(),
        }
    }

    /// How long the connection has been idle.
    pub fn idle_for(&self) -> Duration {
        self.since.elapsed()
    }

    /// Whether the connection has been idle longer than `timeout`.
    /// A zero timeout never expires.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        !timeout.is_zero() && self.idle_for() > timeout
    }
}

/// Idle connections ordered from most to least recently released.
///
/// Reuse takes the freshest connection; the oldest ones collect at the back
/// where expiry is checked.
#[derive(Debug)]
pub struct IdleSet<T> {
    entries: VecDeque<IdleConnection<T>>,

    /// Idle timeout (zero means no expiration).
    timeout: Duration,
}

impl<T> IdleSet<T> {
    /// Create an empty idle set with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            timeout,
        }
    }

    /// Return a connection to the set (resets its idle timer).
    pub fn push(&mut self, conn: T) {
        self.entries.push_front(IdleConnection::new(conn));
    }

    /// Take the most recently released connection.
    ///
    /// Expired entries sit at the back; call
    /// [`drain_expired`](Self::drain_expired) first to discard them.
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front().map(|idle| idle.conn)
    }

    /// Remove every expired connection and return them for closing.
    pub fn drain_expired(&mut self) -> Vec<T> {
        let mut expired = Vec::new();
        while self
            .entries
            .back()
            .is_some_and(|idle| idle.is_expired(self.timeout))
        {
            if let Some(idle) = self.entries.pop_back() {
                expired.push(idle.conn);
            }
        }
        expired
    }

    /// Remove every connection.
    pub fn clear(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|idle| idle.conn).collect()
    }

    /// Number of idle connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no idle connections.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured idle timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Update the idle timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}
