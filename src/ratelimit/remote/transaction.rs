//! Optimistic transaction seam over a shared key-value service.
//!
//! A `TxConnection` exposes the four steps of a watched read-modify-write:
//! watch a key, read it, then either commit one write or release the watch.
//! The service must abort the commit if the watched key changed (or expired)
//! after `watch`, and report that as [`TxOutcome::Conflict`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// The single write a transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxWrite {
    /// Create the counter at 1, expiring after `ttl`.
    Open { ttl: Duration },
    /// Add one to the counter, leaving its expiry untouched.
    Increment,
}

/// Result of committing a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The write was applied.
    Committed,
    /// The watched key changed concurrently; nothing was written.
    Conflict,
}

/// A connection dedicated to one caller for the duration of its transaction.
#[async_trait]
pub trait TxConnection: Send {
    /// Start watching `key` for concurrent modification.
    async fn watch(&mut self, key: &str) -> Result<()>;

    /// Read the counter under `key`, `None` if absent or expired.
    async fn get(&mut self, key: &str) -> Result<Option<u64>>;

    /// Atomically apply `write` to `key` unless the watch was tripped.
    async fn exec(&mut self, key: &str, write: TxWrite) -> Result<TxOutcome>;

    /// Release the watch without writing.
    async fn unwatch(&mut self) -> Result<()>;
}

/// Hands out transaction connections to the shared service.
#[async_trait]
pub trait TxClient: Send + Sync {
    /// Connection type produced by this client.
    type Conn: TxConnection;

    /// Open a connection whose watch state is not shared with other callers.
    async fn connection(&self) -> Result<Self::Conn>;
}
