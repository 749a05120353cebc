//! The execution client: middleware chain around a retried send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tokio::time::Instant;
use tracing::warn;

use crate::error::Error;
use crate::middleware::Middleware;
use crate::retry::RetryPolicy;

/// Request body with two representations: the plaintext actually sent and a
/// redacted form that is safe to log. Logging middleware only ever reads
/// the redacted form.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    plaintext: Vec<u8>,
    redacted: String,
}

impl Payload {
    /// A body with nothing sensitive in it; the redacted form is the body
    /// itself.
    pub fn clear(data: impl Into<Vec<u8>>) -> Self {
        let plaintext = data.into();
        let redacted = String::from_utf8_lossy(&plaintext).into_owned();
        Self { plaintext, redacted }
    }

    /// A body whose plaintext must not reach the logs. The caller supplies
    /// the replacement text.
    pub fn sensitive(data: impl Into<Vec<u8>>, redacted: impl Into<String>) -> Self {
        Self {
            plaintext: data.into(),
            redacted: redacted.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_empty()
    }

    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    pub(crate) fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }
}

/// One logical outbound request. Built fresh per operation; headers are a
/// private copy, never shared with other requests.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Payload,
    pub retry: RetryPolicy,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: Payload::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Payload) -> Self {
        self.body = body;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The definitive response for one logical request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Executes logical requests through a middleware chain with retry.
///
/// One client per reconcile pass: construction is cheap and clients must
/// not be shared across resources.
pub struct HttpClient {
    inner: reqwest::Client,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("middleware_count", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

pub struct HttpClientBuilder {
    timeout: Duration,
    accept_invalid_certs: bool,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl HttpClientBuilder {
    /// Per-attempt timeout for connect plus response.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable TLS certificate verification. Lab endpoints only.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Append a link to the middleware chain. Order of registration is the
    /// order of execution.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Result<HttpClient, Error> {
        let inner = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|source| Error::Build { source })?;

        Ok(HttpClient {
            inner,
            middleware: self.middleware,
        })
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            middleware: Vec::new(),
        }
    }

    /// Execute one logical request.
    ///
    /// Transport failures and retryable statuses are retried up to the
    /// request's `max_attempts` with a fixed delay in between. `deadline`,
    /// when set, bounds the whole schedule: an attempt or backoff sleep
    /// that would cross it is abandoned with [`Error::DeadlineExceeded`].
    /// Whatever response ends the schedule - including a retryable status
    /// on the last attempt - is returned for the caller to judge.
    pub async fn execute(
        &self,
        mut request: Request,
        deadline: Option<Instant>,
    ) -> Result<Response, Error> {
        for middleware in &self.middleware {
            middleware.on_request(&mut request);
        }

        let url: url::Url = request.url.parse().map_err(|source| Error::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;
        let headers = build_header_map(&request.headers)?;
        let max_attempts = request.retry.max_attempts.max(1);

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            match self.send_once(&request, &url, &headers, deadline).await {
                Attempt::Response(response) => {
                    let retryable = RetryPolicy::is_retryable_status(response.status);
                    if retryable && attempt < max_attempts {
                        warn!(
                            url = %request.url,
                            status = response.status,
                            attempt,
                            "retryable status, backing off"
                        );
                        self.back_off(&request, deadline, attempt).await?;
                        continue;
                    }
                    for middleware in &self.middleware {
                        middleware.on_response(&request, &response);
                    }
                    return Ok(response);
                }
                Attempt::Transport(source) => {
                    if attempt < max_attempts {
                        warn!(
                            url = %request.url,
                            attempt,
                            error = %source,
                            "transport failure, backing off"
                        );
                        self.back_off(&request, deadline, attempt).await?;
                        continue;
                    }
                    return Err(Error::Transport {
                        url: request.url.clone(),
                        attempts: attempt,
                        source,
                    });
                }
                Attempt::DeadlineExceeded => {
                    return Err(Error::DeadlineExceeded {
                        url: request.url.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &Request,
        url: &url::Url,
        headers: &HeaderMap,
        deadline: Option<Instant>,
    ) -> Attempt {
        let send = async {
            let response = self
                .inner
                .request(request.method.clone(), url.clone())
                .headers(headers.clone())
                .body(request.body.plaintext().to_vec())
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<Response, reqwest::Error>(Response {
                status,
                body: body.to_vec(),
            })
        };

        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, send).await {
                Ok(result) => result,
                Err(_) => return Attempt::DeadlineExceeded,
            },
            None => send.await,
        };

        match result {
            Ok(response) => Attempt::Response(response),
            Err(source) => Attempt::Transport(source),
        }
    }

    /// Sleep the fixed inter-attempt delay, unless that would cross the
    /// deadline.
    async fn back_off(
        &self,
        request: &Request,
        deadline: Option<Instant>,
        attempts: u32,
    ) -> Result<(), Error> {
        let delay = request.retry.backoff();
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(Error::DeadlineExceeded {
                    url: request.url.clone(),
                    attempts,
                });
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

enum Attempt {
    Response(Response),
    Transport(reqwest::Error),
    DeadlineExceeded,
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader { name: name.clone() })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader { name: name.clone() })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{AuthKind, AuthMiddleware, JsonMiddleware, LoggingMiddleware};
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::builder()
            .timeout(Duration::from_secs(2))
            .middleware(LoggingMiddleware)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::post(format!("{}/orders", server.uri()))
            .with_body(Payload::clear("hello".as_bytes().to_vec()));
        let response = client().execute(request, None).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"created");
    }

    #[tokio::test]
    async fn retries_retryable_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::post(format!("{}/orders", server.uri()))
            .with_retry(RetryPolicy::new(3, 0));
        let response = client().execute(request, None).await.unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let request = Request::post(format!("{}/orders", server.uri()))
            .with_retry(RetryPolicy::new(3, 0));
        let response = client().execute(request, None).await.unwrap();

        // The caller judges the final status; the client just stops retrying.
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"busy");
    }

    #[tokio::test]
    async fn non_retryable_status_returns_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad order"))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::post(format!("{}/orders", server.uri()))
            .with_retry(RetryPolicy::new(3, 0));
        let response = client().execute(request, None).await.unwrap();

        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn transport_failure_reports_attempt_count() {
        // Nothing listens on this port; every attempt fails at connect.
        let request = Request::post("http://127.0.0.1:9/orders").with_retry(RetryPolicy::new(3, 0));
        let err = client().execute(request, None).await.unwrap_err();

        match err {
            Error::Transport { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_aborts_backoff_schedule() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let request = Request::post(format!("{}/orders", server.uri()))
            .with_retry(RetryPolicy::new(3, 5));
        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = client().execute(request, Some(deadline)).await.unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded { .. }));
        // Must abort promptly instead of sleeping out the 5s backoff.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn auth_middleware_applies_to_outbound_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder()
            .timeout(Duration::from_secs(2))
            .middleware(LoggingMiddleware)
            .middleware(JsonMiddleware)
            .middleware(AuthMiddleware::new(AuthKind::Bearer, "tok-1"))
            .build()
            .unwrap();

        let request = Request::post(format!("{}/orders", server.uri()));
        let response = client.execute(request, None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn invalid_header_surfaces_without_retry() {
        let request = Request::post("http://127.0.0.1:9/orders")
            .with_header("bad header name", "x")
            .with_retry(RetryPolicy::new(3, 0));
        let err = client().execute(request, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[test]
    fn sensitive_payload_redacts_plaintext() {
        let payload = Payload::sensitive(b"secret-token".to_vec(), "[redacted]");
        assert_eq!(payload.redacted(), "[redacted]");
        assert_eq!(payload.plaintext(), b"secret-token");
    }
}
