//! Store trait for abstracting local and shared admission counters.

use std::sync::Arc;

use async_trait::async_trait;

use super::window::RateLimitSpec;
use crate::error::Result;

/// Trait for admission counter stores.
///
/// This trait abstracts over both the in-process `LocalStore` and the
/// shared `RemoteStore` so the `Limiter` and the HTTP middleware can work
/// with either.
///
/// `use_token` consumes exactly one admission unit for `key` when it
/// returns `Ok(true)`, and the consumption is durable in the store before
/// the call returns. `Ok(false)` means the key's capacity for the current
/// window is used up and nothing was written. `Err` is reserved for
/// failures to reach a decision at all.
#[async_trait]
pub trait Store: Send + Sync {
    /// Consume one admission unit for `key`.
    async fn use_token(&self, key: &str) -> Result<bool>;

    /// The limits this store enforces.
    fn spec(&self) -> RateLimitSpec;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn use_token(&self, key: &str) -> Result<bool> {
        (**self).use_token(key).await
    }

    fn spec(&self) -> RateLimitSpec {
        (**self).spec()
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Box<S> {
    async fn use_token(&self, key: &str) -> Result<bool> {
        (**self).use_token(key).await
    }

    fn spec(&self) -> RateLimitSpec {
        (**self).spec()
    }
}
