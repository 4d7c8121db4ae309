//! In-process transactional key-value service for exercising `RemoteStore`.
//!
//! Each entry carries a version bumped on every write. A watch records the
//! version seen (or `None` for an absent or expired key) and `exec` refuses
//! to write when the key's current version differs, which is how Redis
//! treats a watched key that was written or expired in the meantime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transaction::{TxClient, TxConnection, TxOutcome, TxWrite};
use crate::error::{AdmissionError, Result};

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    version: u64,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    next_version: u64,
    injected_conflicts: u32,
    fail_transport: bool,
    exec_calls: u32,
    connections: u32,
}

impl State {
    fn live(&self, key: &str, now: Instant) -> Option<Entry> {
        self.entries
            .get(key)
            .copied()
            .filter(|e| e.expires_at.map_or(true, |at| now < at))
    }
}

/// Shared handle to the in-process service.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryKv {
    state: Arc<Mutex<State>>,
}

impl MemoryKv {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits report a conflict without writing.
    pub(crate) fn inject_conflicts(&self, n: u32) {
        self.state.lock().injected_conflicts = n;
    }

    /// Make every operation fail as if the transport were down.
    pub(crate) fn fail_transport(&self, fail: bool) {
        self.state.lock().fail_transport = fail;
    }

    /// Live counter value under `key`.
    pub(crate) fn value(&self, key: &str) -> Option<u64> {
        self.state.lock().live(key, Instant::now()).map(|e| e.value)
    }

    /// Remaining time to live of `key`.
    pub(crate) fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .live(key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of commit attempts seen so far.
    pub(crate) fn exec_calls(&self) -> u32 {
        self.state.lock().exec_calls
    }

    /// Number of connections handed out so far.
    pub(crate) fn connections(&self) -> u32 {
        self.state.lock().connections
    }
}

/// A connection with its own watch state.
pub(crate) struct MemoryConn {
    state: Arc<Mutex<State>>,
    watched: Option<(String, Option<u64>)>,
}

impl MemoryConn {
    fn check_transport(&self) -> Result<()> {
        if self.state.lock().fail_transport {
            return Err(AdmissionError::Backend("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TxClient for MemoryKv {
    type Conn = MemoryConn;

    async fn connection(&self) -> Result<Self::Conn> {
        self.state.lock().connections += 1;
        Ok(MemoryConn {
            state: self.state.clone(),
            watched: None,
        })
    }
}

#[async_trait]
impl TxConnection for MemoryConn {
    async fn watch(&mut self, key: &str) -> Result<()> {
        self.check_transport()?;
        let version = self.state.lock().live(key, Instant::now()).map(|e| e.version);
        self.watched = Some((key.to_string(), version));
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<u64>> {
        self.check_transport()?;
        Ok(self.state.lock().live(key, Instant::now()).map(|e| e.value))
    }

    async fn exec(&mut self, key: &str, write: TxWrite) -> Result<TxOutcome> {
        self.check_transport()?;
        let watched = self.watched.take();
        let now = Instant::now();
        let mut state = self.state.lock();
        state.exec_calls += 1;

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Ok(TxOutcome::Conflict);
        }

        let current = state.live(key, now);
        if let Some((watched_key, seen)) = watched {
            if watched_key == key && seen != current.map(|e| e.version) {
                return Ok(TxOutcome::Conflict);
            }
        }

        state.next_version += 1;
        let version = state.next_version;
        let entry = match write {
            TxWrite::Open { ttl } => Entry {
                value: 1,
                version,
                expires_at: Some(now + ttl),
            },
            TxWrite::Increment => Entry {
                value: current.map_or(1, |e| e.value + 1),
                version,
                expires_at: current.and_then(|e| e.expires_at),
            },
        };
        state.entries.insert(key.to_string(), entry);
        Ok(TxOutcome::Committed)
    }

    async fn unwatch(&mut self) -> Result<()> {
        self.check_transport()?;
        self.watched = None;
        Ok(())
    }
}
