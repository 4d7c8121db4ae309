//! Tower middleware enforcing a `Limiter` on HTTP requests.

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, error, warn};

use super::options::{HttpOptions, JSON_CONTENT_TYPE};
use crate::error::AdmissionError;
use crate::ratelimit::Limiter;

/// A layer that admits or rejects requests using a [`Limiter`].
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: Limiter,
}

impl RateLimitLayer {
    /// Create a new rate limit layer.
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
        }
    }
}

/// Middleware service that keys each request by a header and checks it
/// against the limiter before calling the wrapped service.
///
/// Rejections and store failures become responses, so the wrapped
/// service's error type passes through unchanged.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Limiter,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let limiter = self.limiter.clone();
        // Call the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let options = limiter.http_options();
            let key = request_key(&req, &options.header_key);

            match limiter.is_allowed(&key).await {
                Ok(true) => inner.call(req).await,
                Ok(false) => {
                    debug!(key = %key, path = %req.uri().path(), "Request rate limited");
                    Ok(rejection(options))
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Admission check failed");
                    Ok(failure(&e))
                }
            }
        })
    }
}

/// The caller's key, or an empty key when the header is absent or not text.
fn request_key<B>(req: &Request<B>, header_key: &str) -> String {
    req.headers()
        .get(header_key)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn rejection<B: From<String>>(options: &HttpOptions) -> Response<B> {
    let status = StatusCode::from_u16(options.status_code).unwrap_or_else(|_| {
        warn!(
            status_code = options.status_code,
            "Invalid rejection status code, using 429"
        );
        StatusCode::TOO_MANY_REQUESTS
    });
    let content_type = HeaderValue::from_str(&options.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(JSON_CONTENT_TYPE));
    respond(status, content_type, options.message.clone())
}

fn failure<B: From<String>>(err: &AdmissionError) -> Response<B> {
    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
        err.to_string(),
    )
}

fn respond<B: From<String>>(status: StatusCode, content_type: HeaderValue, body: String) -> Response<B> {
    let mut response = Response::new(B::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::ratelimit::{RateLimitSpec, Store};
    use async_trait::async_trait;
    use std::convert::Infallible;
    use std::future::{ready, Ready};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn use_token(&self, _key: &str) -> Result<bool> {
            Err(AdmissionError::Backend("store unavailable".to_string()))
        }

        fn spec(&self) -> RateLimitSpec {
            RateLimitSpec::new(1, Duration::from_secs(10)).unwrap()
        }
    }

    /// Downstream service counting how often it is reached.
    #[derive(Clone)]
    struct Downstream {
        calls: Arc<AtomicUsize>,
    }

    impl Service<Request<String>> for Downstream {
        type Response = Response<String>;
        type Error = Infallible;
        type Future = Ready<std::result::Result<Response<String>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<String>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response = Response::new("hello".to_string());
            response
                .headers_mut()
                .insert("x-downstream", HeaderValue::from_static("yes"));
            ready(Ok(response))
        }
    }

    fn downstream(calls: Arc<AtomicUsize>) -> Downstream {
        Downstream { calls }
    }

    fn request(addr: &str) -> Request<String> {
        Request::builder()
            .uri("/")
            .header("RemoteAddr", addr)
            .body(String::new())
            .unwrap()
    }

    fn limiter(max_admits: u64) -> Limiter {
        Limiter::builder(max_admits, Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_reaches_downstream_unchanged() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = limiter(1).layer().layer(downstream(calls.clone()));

        let response = service.oneshot(request("10.0.0.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-downstream"], "yes");
        assert_eq!(response.body(), "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_request_gets_default_rejection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = limiter(1).layer().layer(downstream(calls.clone()));

        service.clone().oneshot(request("10.0.0.1")).await.unwrap();
        let response = service.oneshot(request("10.0.0.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.body(), "Rate Limited! Too many requests.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_request_uses_configured_rejection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let options = HttpOptions::default()
            .with_header_key("X-Client-Id")
            .with_status_code(503)
            .with_content_type("text/plain")
            .with_message("slow down");
        let limiter = Limiter::builder(1, Duration::from_secs(10))
            .http_options(options)
            .build()
            .unwrap();
        let service = limiter.layer().layer(downstream(calls.clone()));

        let req = || {
            Request::builder()
                .header("x-client-id", "tenant-a")
                .body(String::new())
                .unwrap()
        };
        service.clone().oneshot(req()).await.unwrap();
        let response = service.oneshot(req()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.body(), "slow down");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_error_becomes_server_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = Limiter::builder(1, Duration::from_secs(10))
            .store(FailingStore)
            .build()
            .unwrap();
        let service = limiter.layer().layer(downstream(calls.clone()));

        let response = service.oneshot(request("10.0.0.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().contains("store unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_requests_keyed_by_header_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = limiter(1).layer().layer(downstream(calls.clone()));

        let a = service.clone().oneshot(request("10.0.0.1")).await.unwrap();
        let b = service.clone().oneshot(request("10.0.0.2")).await.unwrap();
        let a_again = service.oneshot(request("10.0.0.1")).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_missing_header_shares_empty_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = limiter(1).layer().layer(downstream(calls.clone()));

        let bare = || Request::builder().body(String::new()).unwrap();
        let first = service.clone().oneshot(bare()).await.unwrap();
        let second = service.oneshot(bare()).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_invalid_status_code_falls_back_to_429() {
        let options = HttpOptions::default().with_status_code(42);
        let response: Response<String> = rejection(&options);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
