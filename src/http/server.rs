//! HTTP server with every route behind the limiter.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{AdmissionError, Result};
use crate::ratelimit::Limiter;

/// HTTP server whose routes are all protected by one `Limiter`.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Routes to protect
    routes: Router,
    /// The limiter instance
    limiter: Limiter,
}

impl HttpServer {
    /// Create a new server for `routes`.
    pub fn new(addr: SocketAddr, routes: Router, limiter: Limiter) -> Self {
        Self {
            addr,
            routes,
            limiter,
        }
    }

    /// The routes with the rate limit layer applied.
    pub fn app(&self) -> Router {
        self.routes.clone().layer(self.limiter.layer())
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.app();
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            max_admits = self.limiter.spec().max_admits(),
            window = ?self.limiter.spec().window(),
            header_key = %self.limiter.http_options().header_key,
            "Starting HTTP server"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                AdmissionError::Io(e)
            })
    }
}
