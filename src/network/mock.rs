//! Scripted transport for tests
//!
//! Replies are configured per URL; each URL may hold a sequence of replies
//! whose last element repeats. Every call is counted so tests can verify
//! retry and de-duplication behaviour.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, NetworkErrorKind, Result};

use super::transport::{HttpTransport, RawResponse, TransportRequest};

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Status code with a JSON body
    Json(u16, Value),
    /// Status code with an empty body
    Status(u16),
    /// Transport failure with the given message
    Fail(String),
    /// Never answers; exercises timeouts
    Hang,
}

#[derive(Debug, Default)]
struct Route {
    replies: Vec<MockReply>,
    cursor: usize,
}

/// In-memory [`HttpTransport`] with per-URL scripted replies
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: RwLock<HashMap<String, Route>>,
    calls: RwLock<HashMap<String, u32>>,
    last_headers: RwLock<HashMap<String, Vec<(String, String)>>>,
    latency: Duration,
}

impl MockTransport {
    /// Transport with no routes; unrouted URLs fail at transport level
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Always answer `url` with `reply`
    pub fn route(&self, url: &str, reply: MockReply) {
        self.route_sequence(url, vec![reply]);
    }

    /// Answer `url` with `replies` in order, repeating the last one
    pub fn route_sequence(&self, url: &str, replies: Vec<MockReply>) {
        self.routes
            .write()
            .insert(url.to_string(), Route { replies, cursor: 0 });
    }

    /// Number of sends made to `url`
    pub fn calls(&self, url: &str) -> u32 {
        self.calls.read().get(url).copied().unwrap_or(0)
    }

    /// Number of sends across all URLs
    pub fn total_calls(&self) -> u32 {
        self.calls.read().values().sum()
    }

    /// Headers of the most recent send to `url`
    pub fn last_headers(&self, url: &str) -> Option<Vec<(String, String)>> {
        self.last_headers.read().get(url).cloned()
    }

    /// Reset call counters
    pub fn reset_counts(&self) {
        self.calls.write().clear();
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.write();
        let route = routes.get_mut(url)?;
        let idx = route.cursor.min(route.replies.len().saturating_sub(1));
        route.cursor += 1;
        route.replies.get(idx).cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        *self.calls.write().entry(request.url.clone()).or_insert(0) += 1;
        self.last_headers
            .write()
            .insert(request.url.clone(), request.headers.clone());

        let reply = self.next_reply(&request.url);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Some(MockReply::Json(status, body)) => Ok(RawResponse {
                status,
                body: body.to_string(),
            }),
            Some(MockReply::Status(status)) => Ok(RawResponse {
                status,
                body: String::new(),
            }),
            Some(MockReply::Fail(message)) => Err(Error::network(
                request.url,
                NetworkErrorKind::Transport { message },
            )),
            Some(MockReply::Hang) => futures_util::future::pending().await,
            None => Err(Error::network(
                request.url,
                NetworkErrorKind::Transport {
                    message: "no route configured".to_string(),
                },
            )),
        }
    }
}
