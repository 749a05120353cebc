//! portgate-http: execute one logical HTTP request reliably.
//!
//! A [`HttpClient`] runs each request through a fixed-order middleware chain
//! (logging, JSON content negotiation, authentication header injection) and
//! applies the request's [`RetryPolicy`] to transport failures and retryable
//! status codes. Request bodies carry a separate redacted form so secret
//! material never reaches the logs.
//!
//! # Example
//! ```ignore
//! use portgate_http::{HttpClient, JsonMiddleware, LoggingMiddleware, Payload, Request, RetryPolicy};
//!
//! let client = HttpClient::builder()
//!     .timeout(std::time::Duration::from_secs(30))
//!     .middleware(LoggingMiddleware)
//!     .middleware(JsonMiddleware)
//!     .build()?;
//!
//! let request = Request::post("https://api.example.com/orders")
//!     .with_body(Payload::clear(br#"{"order":{}}"#.to_vec()))
//!     .with_retry(RetryPolicy::new(3, 2));
//! let response = client.execute(request, None).await?;
//! ```

mod client;
mod error;
mod middleware;
mod retry;

pub use client::{HttpClient, HttpClientBuilder, Payload, Request, Response};
pub use error::Error;
pub use middleware::{
    AuthKind, AuthMiddleware, JsonMiddleware, LoggingMiddleware, Middleware, UnknownAuthKind,
};
pub use retry::RetryPolicy;

// Re-exported so callers can name methods without depending on reqwest.
pub use reqwest::Method;
