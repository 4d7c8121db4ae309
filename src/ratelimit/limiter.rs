//! The admission decision point.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::backend::Store;
use super::local::LocalStore;
use super::remote::{RedisClient, RemoteStore, TxClient, DEFAULT_MAX_RETRIES};
use super::window::RateLimitSpec;
use crate::error::Result;
use crate::http::{HttpOptions, RateLimitLayer};

/// Admits at most `max_admits` units of work per key per window.
///
/// The limiter adds no policy of its own: `is_allowed` returns exactly
/// what the configured store decided, errors included. Clones share the
/// same store.
#[derive(Clone)]
pub struct Limiter {
    store: Arc<dyn Store>,
    spec: RateLimitSpec,
    http_options: Arc<HttpOptions>,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("spec", &self.spec)
            .field("http_options", &self.http_options)
            .finish()
    }
}

impl Limiter {
    /// Create a limiter over an already constructed store, reporting the
    /// limits that store enforces.
    pub fn new(store: impl Store + 'static) -> Self {
        Self::from_shared(Arc::new(store), HttpOptions::default())
    }

    /// Create a limiter with in-process counters.
    pub fn local(spec: RateLimitSpec) -> Self {
        Self::new(LocalStore::new(spec))
    }

    /// Create a limiter with counters shared through Redis.
    pub fn redis(client: redis::Client, spec: RateLimitSpec) -> Self {
        Self::new(RemoteStore::new(RedisClient::new(client), spec))
    }

    fn from_shared(store: Arc<dyn Store>, http_options: HttpOptions) -> Self {
        Self {
            spec: store.spec(),
            store,
            http_options: Arc::new(http_options),
        }
    }

    /// Start configuring a limiter.
    pub fn builder(max_admits: u64, window: Duration) -> LimiterBuilder {
        LimiterBuilder::new(max_admits, window)
    }

    /// Decide whether one unit of work for `key` is admitted.
    pub async fn is_allowed(&self, key: &str) -> Result<bool> {
        self.store.use_token(key).await
    }

    /// The limits in force.
    pub fn spec(&self) -> RateLimitSpec {
        self.spec
    }

    /// How the HTTP middleware renders rejections.
    pub fn http_options(&self) -> &HttpOptions {
        &self.http_options
    }

    /// Replace the HTTP rejection settings.
    pub fn with_http_options(mut self, http_options: HttpOptions) -> Self {
        self.http_options = Arc::new(http_options);
        self
    }

    /// A tower layer enforcing this limiter on HTTP requests.
    pub fn layer(&self) -> RateLimitLayer {
        RateLimitLayer::new(self.clone())
    }
}

/// Builds a shared store from the spec, retry bound and key prefix.
type SharedFactory = Box<dyn FnOnce(RateLimitSpec, u32, String) -> Arc<dyn Store> + Send>;

/// Which store a builder produces.
enum StoreChoice {
    Local,
    Shared(SharedFactory),
    Custom(Arc<dyn Store>),
}

/// Builder applying optional settings over a base configuration.
///
/// Every setting is independent; unset ones keep their defaults (local
/// store, 100 transaction attempts, default HTTP options).
pub struct LimiterBuilder {
    max_admits: u64,
    window: Duration,
    store: StoreChoice,
    max_retries: u32,
    key_prefix: String,
    http_options: HttpOptions,
}

impl LimiterBuilder {
    fn new(max_admits: u64, window: Duration) -> Self {
        Self {
            max_admits,
            window,
            store: StoreChoice::Local,
            max_retries: DEFAULT_MAX_RETRIES,
            key_prefix: String::new(),
            http_options: HttpOptions::default(),
        }
    }

    /// Keep counters in this process.
    pub fn local_store(mut self) -> Self {
        self.store = StoreChoice::Local;
        self
    }

    /// Share counters through the Redis server behind `client`.
    pub fn redis_store(self, client: redis::Client) -> Self {
        self.redis_client(RedisClient::new(client))
    }

    /// Share counters through an already wrapped Redis client.
    pub fn redis_client(self, client: RedisClient) -> Self {
        self.shared_store(client)
    }

    /// Share counters through any transactional key-value client.
    pub fn shared_store<C: TxClient + 'static>(mut self, client: C) -> Self {
        let factory = move |spec: RateLimitSpec, max_retries: u32, key_prefix: String| -> Arc<dyn Store> {
            Arc::new(
                RemoteStore::new(client, spec)
                    .with_max_retries(max_retries)
                    .with_key_prefix(key_prefix),
            )
        };
        self.store = StoreChoice::Shared(Box::new(factory));
        self
    }

    /// Namespace shared counters under `prefix`; ignored by other stores.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Use a caller-provided store. Its own limits replace the builder's.
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = StoreChoice::Custom(Arc::new(store));
        self
    }

    /// Bound the transaction attempts of a shared store.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Customize the HTTP rejection response.
    pub fn http_options(mut self, http_options: HttpOptions) -> Self {
        self.http_options = http_options;
        self
    }

    /// Validate the settings and build the limiter.
    pub fn build(self) -> Result<Limiter> {
        let spec = RateLimitSpec::new(self.max_admits, self.window)?;

        let store: Arc<dyn Store> = match self.store {
            StoreChoice::Local => Arc::new(LocalStore::new(spec)),
            StoreChoice::Shared(factory) => factory(spec, self.max_retries, self.key_prefix),
            StoreChoice::Custom(store) => store,
        };

        let limiter = Limiter::from_shared(store, self.http_options);
        debug!(
            max_admits = limiter.spec.max_admits(),
            window = ?limiter.spec.window(),
            "Limiter built"
        );
        Ok(limiter)
    }
}
