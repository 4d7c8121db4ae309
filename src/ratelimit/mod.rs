//! Admission stores and the limiter built on them.

mod backend;
mod limiter;
mod local;
pub mod remote;
mod window;

pub use backend::Store;
pub use limiter::{Limiter, LimiterBuilder};
pub use local::LocalStore;
pub use remote::{RedisClient, RemoteStore, DEFAULT_MAX_RETRIES};
pub use window::RateLimitSpec;
