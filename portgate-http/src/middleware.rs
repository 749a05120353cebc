//! Cross-cutting request/response transforms.
//!
//! Middleware runs in registration order: request hooks once before the
//! first attempt, response hooks once on the definitive response. Retried
//! attempts reuse the transformed request unchanged.

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::client::{Request, Response};

/// One link in the middleware chain.
pub trait Middleware: Send + Sync {
    fn on_request(&self, _request: &mut Request) {}
    fn on_response(&self, _request: &Request, _response: &Response) {}
}

/// Records method, URL and status. Only ever sees the redacted body form;
/// plaintext payloads stay out of the logs.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn on_request(&self, request: &mut Request) {
        debug!(
            method = %request.method,
            url = %request.url,
            body = request.body.redacted(),
            "outbound request"
        );
    }

    fn on_response(&self, request: &Request, response: &Response) {
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "response received"
        );
    }
}

/// Sets `Content-Type` and `Accept` to `application/json` unless the caller
/// already chose something else.
pub struct JsonMiddleware;

impl Middleware for JsonMiddleware {
    fn on_request(&self, request: &mut Request) {
        request
            .headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());
        request
            .headers
            .entry("Accept".to_string())
            .or_insert_with(|| "application/json".to_string());
    }
}

/// Supported authentication schemes. A closed set: unknown scheme names are
/// rejected when credentials are parsed, not silently passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthKind {
    /// Unauthenticated client.
    #[default]
    None,
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// `Authorization: Basic <secret>`; the secret is the pre-encoded
    /// user:password pair.
    Basic,
    /// `X-API-Key: <secret>`.
    ApiKey,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown auth type {0:?}")]
pub struct UnknownAuthKind(pub String);

impl FromStr for AuthKind {
    type Err = UnknownAuthKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthKind::None),
            "bearer" => Ok(AuthKind::Bearer),
            "basic" => Ok(AuthKind::Basic),
            "apikey" | "api-key" | "api_key" => Ok(AuthKind::ApiKey),
            _ => Err(UnknownAuthKind(s.to_string())),
        }
    }
}

/// Injects the authentication header for the configured scheme.
pub struct AuthMiddleware {
    kind: AuthKind,
    secret: String,
}

impl AuthMiddleware {
    pub fn new(kind: AuthKind, secret: impl Into<String>) -> Self {
        Self {
            kind,
            secret: secret.into(),
        }
    }
}

impl Middleware for AuthMiddleware {
    fn on_request(&self, request: &mut Request) {
        match self.kind {
            AuthKind::None => {}
            AuthKind::Bearer => {
                request.headers.insert(
                    "Authorization".to_string(),
                    format!("Bearer {}", self.secret),
                );
            }
            AuthKind::Basic => {
                request.headers.insert(
                    "Authorization".to_string(),
                    format!("Basic {}", self.secret),
                );
            }
            AuthKind::ApiKey => {
                request
                    .headers
                    .insert("X-API-Key".to_string(), self.secret.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Request;

    #[test]
    fn auth_kind_parsing() {
        assert_eq!("bearer".parse::<AuthKind>(), Ok(AuthKind::Bearer));
        assert_eq!("Bearer".parse::<AuthKind>(), Ok(AuthKind::Bearer));
        assert_eq!("basic".parse::<AuthKind>(), Ok(AuthKind::Basic));
        assert_eq!("apiKey".parse::<AuthKind>(), Ok(AuthKind::ApiKey));
        assert_eq!("api-key".parse::<AuthKind>(), Ok(AuthKind::ApiKey));
        assert_eq!("".parse::<AuthKind>(), Ok(AuthKind::None));
        assert_eq!(
            "digest".parse::<AuthKind>(),
            Err(UnknownAuthKind("digest".to_string()))
        );
    }

    #[test]
    fn bearer_injects_authorization() {
        let mut request = Request::post("http://example.invalid/orders");
        AuthMiddleware::new(AuthKind::Bearer, "tok").on_request(&mut request);
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer tok")
        );
    }

    #[test]
    fn api_key_injects_header() {
        let mut request = Request::post("http://example.invalid/orders");
        AuthMiddleware::new(AuthKind::ApiKey, "k-123").on_request(&mut request);
        assert_eq!(
            request.headers.get("X-API-Key").map(String::as_str),
            Some("k-123")
        );
    }

    #[test]
    fn json_middleware_respects_existing_content_type() {
        let mut request = Request::post("http://example.invalid/orders")
            .with_header("Content-Type", "application/xml");
        JsonMiddleware.on_request(&mut request);
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/xml")
        );
        assert_eq!(
            request.headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }
}
