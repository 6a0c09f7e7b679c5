//! Outbound HTTP with timeout, retry and de-duplication
//!
//! - [`RetryClient`]: retry/backoff policy, in-flight sharing, batch GETs
//! - [`HttpTransport`]: the seam between policy and the wire
//! - [`ReqwestTransport`]: production transport
//! - [`MockTransport`]: scripted transport for tests

mod client;
pub mod mock;
mod transport;

pub use client::{ClientConfig, Request, Response, RetryClient};
pub use mock::{MockReply, MockTransport};
pub use transport::{HttpTransport, Method, RawResponse, ReqwestTransport, TransportRequest};
