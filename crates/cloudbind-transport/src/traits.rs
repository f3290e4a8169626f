//! Transport trait and wire types
//!
//! Defines the request/response shapes exchanged between a provider context
//! and whatever actually moves bytes.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use http::Method;
use std::fmt;
use std::pin::Pin;
use url::Url;

/// Response body as a stream of chunks
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A fully built request ready for dispatch.
///
/// Headers are kept as an ordered list so duplicates survive and the order a
/// signer saw is the order sent on the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method
    pub method: Method,

    /// Absolute request URL, query string included
    pub url: Url,

    /// Request headers in send order
    pub headers: Vec<(String, String)>,

    /// Request body (optional)
    pub body: Option<Bytes>,
}

impl WireRequest {
    /// Create a new request with no headers and no body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response whose body has not been read yet.
pub struct WireResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: Vec<(String, String)>,

    /// Response body chunks
    pub body: BodyStream,
}

impl WireResponse {
    /// Create a response from a body stream
    pub fn new(status: u16, headers: Vec<(String, String)>, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a response whose body is already in memory
    pub fn from_bytes(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, Box::pin(stream::once(async move { Ok(body) })))
    }

    /// Create a response whose body arrives as several chunks
    pub fn from_chunks(status: u16, headers: Vec<(String, String)>, chunks: Vec<Bytes>) -> Self {
        Self::new(
            status,
            headers,
            Box::pin(stream::iter(chunks.into_iter().map(Ok))),
        )
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Drain the body stream into a single buffer.
    ///
    /// # Errors
    ///
    /// Returns the first chunk error produced by the stream.
    pub async fn collect_body(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for WireResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Dispatch seam between provider contexts and the network
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a request and return the status, headers and a body stream
    async fn send(&self, request: WireRequest) -> Result<WireResponse>;

    /// Short name used in log records
    fn name(&self) -> &'static str {
        "transport"
    }
}

/// Transport that refuses every request.
///
/// Useful as a placeholder when a context is only used for binding and
/// signing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        Err(TransportError::Other(format!(
            "no transport configured for {} {}",
            request.method,
            request.url.path()
        )))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
