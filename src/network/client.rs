//! Retrying HTTP client with in-flight request de-duplication
//!
//! Every attempt is bounded by `tokio::time::timeout`, failed attempts are
//! retried with exponential backoff, and identical concurrent requests
//! (same url, method and body) share one attempt chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, NetworkErrorKind, Result};

use super::transport::{HttpTransport, Method, TransportRequest};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Defaults applied to requests that don't override them
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retry_attempts: u32,
    /// Base delay before the first retry
    pub retry_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Concurrency ceiling for batch requests
    pub batch_concurrency: usize,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            batch_concurrency: 3,
            user_agent: format!("persona-council/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────

/// An outbound request with optional per-call policy overrides
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: Vec::new(),
            timeout: None,
            retry_attempts: None,
            retry_delay: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach an `Authorization: Bearer` header
    pub fn with_bearer(self, credential: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", credential))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = Some(attempts);
        self.retry_delay = Some(delay);
        self
    }

    fn signature(&self) -> Signature {
        Signature {
            url: self.url.clone(),
            method: self.method,
            body: self.body.as_ref().map(|b| b.to_string()),
        }
    }
}

/// Decoded response of a successful request
#[derive(Debug, Clone)]
pub struct Response {
    /// JSON body, `Value::Null` when the body is empty
    pub data: Value,
    pub status: u16,
    /// Wall time across all attempts
    pub execution_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    url: String,
    method: Method,
    body: Option<String>,
}

type SharedResponse = Shared<BoxFuture<'static, Result<Response>>>;

// ─────────────────────────────────────────────────────────────────
// Retry Client
// ─────────────────────────────────────────────────────────────────

struct ClientInner {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    in_flight: Mutex<HashMap<Signature, (u64, SharedResponse)>>,
    next_id: AtomicU64,
}

/// Cloneable handle to a retrying HTTP client
#[derive(Clone)]
pub struct RetryClient {
    inner: Arc<ClientInner>,
}

impl RetryClient {
    /// Create a client over the given transport
    pub fn new(transport: Arc<dyn HttpTransport>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Client defaults
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Number of distinct requests currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Issue a request, joining an identical in-flight one if present
    pub async fn request(&self, request: Request) -> Result<Response> {
        let signature = request.signature();

        let (id, shared) = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&signature) {
                Some((id, shared)) => {
                    debug!(url = %request.url, method = %request.method, "Joining in-flight request");
                    (*id, shared.clone())
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let inner = Arc::clone(&self.inner);
                    let key = signature.clone();
                    let shared = async move {
                        let result = inner.execute(request).await;
                        inner.release(&key, id);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(signature.clone(), (id, shared.clone()));
                    (id, shared)
                }
            }
        };

        let mut guard = InFlightGuard {
            inner: &self.inner,
            signature,
            id,
            shared,
        };
        (&mut guard.shared).await
    }

    /// Issue a request that aborts with `Cancelled` when `token` fires
    pub async fn request_cancellable(
        &self,
        request: Request,
        token: &CancellationToken,
    ) -> Result<Response> {
        let url = request.url.clone();
        tokio::select! {
            result = self.request(request) => result,
            _ = token.cancelled() => Err(Error::cancelled(format!("request to {}", url))),
        }
    }

    /// Convenience GET with client defaults
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Request::get(url)).await
    }

    /// Issue independent GETs with at most `concurrency` in flight
    ///
    /// Results are returned in input order; a failed entry does not abort
    /// the batch.
    pub async fn batch_request(&self, urls: &[String], concurrency: usize) -> Vec<Result<Response>> {
        stream::iter(urls.iter().cloned())
            .map(|url| async move { self.get(&url).await })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Check that an endpoint answers with a 2xx status
    pub async fn health_check(&self, url: &str) -> bool {
        let request = Request::get(url)
            .with_timeout(Duration::from_millis(5_000))
            .with_retries(1, self.inner.config.retry_delay);
        match self.request(request).await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %url, error = %e, "Health check failed");
                false
            }
        }
    }
}

impl ClientInner {
    /// Drop the in-flight entry if it still belongs to chain `id`
    fn release(&self, signature: &Signature, id: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(signature).map_or(false, |(current, _)| *current == id) {
            in_flight.remove(signature);
        }
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let retries = request.retry_attempts.unwrap_or(self.config.retry_attempts);
        let delay = request.retry_delay.unwrap_or(self.config.retry_delay);

        let mut backoff = ExponentialBackoff {
            initial_interval: delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.config.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        let total_attempts = retries + 1;
        let mut last_error = None;

        for attempt in 0..total_attempts {
            match self.attempt(&request, timeout).await {
                Ok((data, status)) => {
                    trace!(url = %request.url, attempt, status, "Request succeeded");
                    return Ok(Response {
                        data,
                        status,
                        execution_time: started.elapsed(),
                    });
                }
                Err(e) => {
                    warn!(
                        url = %request.url,
                        attempt = attempt + 1,
                        of = total_attempts,
                        error = %e,
                        "Request attempt failed"
                    );
                    last_error = Some(e);
                    if attempt + 1 < total_attempts {
                        let wait = backoff.next_backoff().unwrap_or(self.config.max_delay);
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::network(
                request.url.clone(),
                NetworkErrorKind::Transport {
                    message: "no attempts were made".to_string(),
                },
            )
        }))
    }

    async fn attempt(&self, request: &Request, timeout: Duration) -> Result<(Value, u16)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        for (name, value) in &request.headers {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        let outbound = TransportRequest {
            url: request.url.clone(),
            method: request.method,
            headers,
            body: request.body.as_ref().map(|b| b.to_string()),
        };

        let raw = match tokio::time::timeout(timeout, self.transport.send(outbound)).await {
            Err(_) => {
                return Err(Error::network(
                    request.url.clone(),
                    NetworkErrorKind::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                ))
            }
            Ok(result) => result?,
        };

        if !(200..300).contains(&raw.status) {
            return Err(Error::network(
                request.url.clone(),
                NetworkErrorKind::Http { status: raw.status },
            ));
        }

        let data = if raw.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw.body).map_err(|e| {
                Error::network(
                    request.url.clone(),
                    NetworkErrorKind::Transport {
                        message: format!("invalid JSON body: {}", e),
                    },
                )
            })?
        };

        Ok((data, raw.status))
    }
}

/// Removes an abandoned in-flight entry when its last waiter goes away
struct InFlightGuard<'a> {
    inner: &'a Arc<ClientInner>,
    signature: Signature,
    id: u64,
    shared: SharedResponse,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        let abandoned = match in_flight.get(&self.signature) {
            // The map's handle plus ours; None once the chain has settled
            Some((current, _)) if *current == self.id => self.shared.strong_count() == Some(2),
            _ => false,
        };
        if abandoned {
            in_flight.remove(&self.signature);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
