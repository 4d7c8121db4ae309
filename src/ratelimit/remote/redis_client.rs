//! Redis implementation of the transaction seam.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::trace;

use super::transaction::{TxClient, TxConnection, TxOutcome, TxWrite};
use crate::error::Result;

/// A `TxClient` backed by a Redis server.
///
/// `WATCH` state belongs to the connection, so every transaction gets a
/// freshly opened connection that no other caller shares.
#[derive(Debug, Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    /// Wrap an existing client handle.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Create a client from a connection URL such as `redis://127.0.0.1:6379/0`.
    ///
    /// No connection is made until the first transaction.
    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::new(redis::Client::open(url)?))
    }
}

/// One dedicated Redis connection.
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl TxClient for RedisClient {
    type Conn = RedisConnection;

    async fn connection(&self) -> Result<Self::Conn> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(RedisConnection { conn })
    }
}

#[async_trait]
impl TxConnection for RedisConnection {
    async fn watch(&mut self, key: &str) -> Result<()> {
        let _: () = redis::cmd("WATCH").arg(key).query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<u64>> {
        let value: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut self.conn).await?;
        Ok(value)
    }

    async fn exec(&mut self, key: &str, write: TxWrite) -> Result<TxOutcome> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        match write {
            TxWrite::Open { ttl } => {
                pipe.cmd("SET").arg(key).arg(1).arg("PX").arg(ttl_millis(ttl));
            }
            TxWrite::Increment => {
                pipe.cmd("INCR").arg(key);
            }
        }

        // EXEC replies nil when a watched key was touched.
        let reply: redis::Value = pipe.query_async(&mut self.conn).await?;
        trace!(key = %key, write = ?write, reply = ?reply, "EXEC reply");
        match reply {
            redis::Value::Nil => Ok(TxOutcome::Conflict),
            _ => Ok(TxOutcome::Committed),
        }
    }

    async fn unwatch(&mut self) -> Result<()> {
        let _: () = redis::cmd("UNWATCH").query_async(&mut self.conn).await?;
        Ok(())
    }
}

/// Expiry in whole milliseconds, never zero since `PX 0` is rejected.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
