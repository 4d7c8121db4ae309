//! Windowgate - Fixed-Window Admission Control
//!
//! This crate bounds each caller-supplied key to at most N admits inside a
//! window of duration D. Counters live either in process (`LocalStore`) or
//! in a shared Redis instance (`RemoteStore`), so several service instances
//! can enforce one limit per key. An HTTP middleware layer applies the
//! limiter to any tower or axum service.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;

pub use error::{AdmissionError, Result};
pub use ratelimit::{Limiter, RateLimitSpec, Store};
