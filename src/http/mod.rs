//! HTTP surface: rejection options, tower middleware, and a small server.

mod middleware;
mod options;
mod server;
mod shutdown;

pub use middleware::{RateLimitLayer, RateLimitService};
pub use options::{
    HttpOptions, DEFAULT_HEADER_KEY, DEFAULT_MESSAGE, DEFAULT_STATUS_CODE, JSON_CONTENT_TYPE,
};
pub use server::HttpServer;
pub use shutdown::{Shutdown, ShutdownSignals};
