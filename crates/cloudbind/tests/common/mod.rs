//! Common test utilities and helpers

use async_trait::async_trait;
use bytes::Bytes;
use cloudbind_transport::{Result, Transport, TransportError, WireRequest, WireResponse};
use futures::{StreamExt, stream};
use std::sync::Mutex;
use std::time::Duration;

/// How the canned body is delivered.
#[derive(Debug, Clone)]
enum Body {
    Chunks(Vec<Bytes>),
    /// First chunk, then the stream never ends
    Stalled(Bytes),
}

/// Transport answering every request with the same response and recording
/// what it was sent.
#[derive(Debug)]
pub struct CannedTransport {
    status: u16,
    body: Body,
    delay: Option<Duration>,
    requests: Mutex<Vec<WireRequest>>,
}

#[allow(dead_code)]
impl CannedTransport {
    /// Respond with `status` and `body` in one chunk.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self::chunked(status, vec![body.into()])
    }

    /// Respond with `status` and the body split across `chunks`.
    pub fn chunked(status: u16, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            body: Body::Chunks(chunks),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Respond with one chunk and then never finish the body.
    pub fn stalled(status: u16, first: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: Body::Stalled(first.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received.
    pub fn sent(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(match &self.body {
            Body::Chunks(chunks) => WireResponse::from_chunks(self.status, Vec::new(), chunks.clone()),
            Body::Stalled(first) => {
                let first = first.clone();
                let body = stream::once(async move { Ok::<_, TransportError>(first) }).chain(stream::pending());
                WireResponse::new(self.status, Vec::new(), Box::pin(body))
            }
        })
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

/// Split a document into chunks of `size` bytes.
#[allow(dead_code)]
pub fn chunks(document: &str, size: usize) -> Vec<Bytes> {
    document
        .as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}
