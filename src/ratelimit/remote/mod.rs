//! Shared admission store for horizontally scaled deployments.
//!
//! Counters live in an external key-value service and are only ever
//! mutated inside a watched transaction. The counter is created with a
//! time to live equal to the window, so an absent key means no window is
//! open for it; no timestamps are stored.

mod redis_client;
mod transaction;

#[cfg(test)]
pub(crate) mod memory;

pub use redis_client::{RedisClient, RedisConnection};
pub use transaction::{TxClient, TxConnection, TxOutcome, TxWrite};

use std::borrow::Cow;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::backend::Store;
use super::window::RateLimitSpec;
use crate::error::{AdmissionError, Result};

/// Default number of transaction attempts per admission check.
pub const DEFAULT_MAX_RETRIES: u32 = 100;

/// Outcome of one transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Admitted,
    Denied,
    Conflict,
}

/// Admission counters held in a shared service reached through `C`.
#[derive(Debug, Clone)]
pub struct RemoteStore<C> {
    client: C,
    spec: RateLimitSpec,
    max_retries: u32,
    key_prefix: String,
}

impl<C: TxClient> RemoteStore<C> {
    /// Create a store enforcing `spec` through `client`.
    pub fn new(client: C, spec: RateLimitSpec) -> Self {
        Self {
            client,
            spec,
            max_retries: DEFAULT_MAX_RETRIES,
            key_prefix: String::new(),
        }
    }

    /// Bound the number of transaction attempts per admission check.
    ///
    /// A bound of zero is treated as one attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Namespace every counter under `prefix` in the shared service.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// The limits this store enforces.
    pub fn spec(&self) -> RateLimitSpec {
        self.spec
    }

    /// Maximum transaction attempts per admission check.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The client used to reach the shared service.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn counter_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.key_prefix.is_empty() {
            Cow::Borrowed(key)
        } else {
            Cow::Owned(format!("{}{}", self.key_prefix, key))
        }
    }

    /// Run one watched read-modify-write on `key`.
    async fn attempt(&self, conn: &mut C::Conn, key: &str) -> Result<Attempt> {
        conn.watch(key).await?;

        let write = match conn.get(key).await? {
            None => TxWrite::Open {
                ttl: self.spec.window(),
            },
            Some(count) if count >= self.spec.max_admits() => {
                conn.unwatch().await?;
                debug!(
                    key = %key,
                    count,
                    limit = self.spec.max_admits(),
                    "Admission capacity reached"
                );
                return Ok(Attempt::Denied);
            }
            Some(_) => TxWrite::Increment,
        };

        match conn.exec(key, write).await? {
            TxOutcome::Committed => Ok(Attempt::Admitted),
            TxOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }
}

#[async_trait]
impl<C: TxClient> Store for RemoteStore<C> {
    async fn use_token(&self, key: &str) -> Result<bool> {
        let counter_key = self.counter_key(key);
        let mut conn = self.client.connection().await?;

        for attempt in 1..=self.max_retries {
            trace!(key = %counter_key, attempt, "Starting admission transaction");
            match self.attempt(&mut conn, &counter_key).await? {
                Attempt::Admitted => return Ok(true),
                Attempt::Denied => return Ok(false),
                Attempt::Conflict => {
                    debug!(key = %counter_key, attempt, "Concurrent update on key, retrying");
                }
            }
        }

        warn!(
            key = %counter_key,
            attempts = self.max_retries,
            "Exhausted admission transaction retries"
        );
        Err(AdmissionError::RetriesExhausted {
            key: counter_key.into_owned(),
            attempts: self.max_retries,
        })
    }

    fn spec(&self) -> RateLimitSpec {
        self.spec
    }
}
