//! Structured logging for invocations
//!
//! Every dispatch is logged through this module so log fields stay uniform
//! across providers. Records carry the provider id, operation name, method and
//! path; they never carry credentials, signatures or query strings (which may
//! hold a signature).

use crate::request::Request;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Request metadata for structured logging
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// Provider id
    pub provider: String,
    /// Operation name
    pub operation: String,
    /// HTTP method
    pub method: String,
    /// Host and path, without the query string
    pub target: String,
    /// Request body size in bytes
    pub body_size: Option<usize>,
}

impl RequestMetadata {
    /// Describe a signed request.
    pub fn new(provider: &str, operation: &str, request: &Request) -> Self {
        let uri = request.uri();
        Self {
            provider: provider.to_string(),
            operation: operation.to_string(),
            method: request.method().to_string(),
            target: format!("{}{}", uri.host_str().unwrap_or_default(), uri.path()),
            body_size: request.payload().map(|p| p.len()),
        }
    }

    /// Log request being sent
    pub fn log_request(&self) {
        debug!(
            provider = %self.provider,
            operation = %self.operation,
            method = %self.method,
            target = %self.target,
            body_size = self.body_size,
            "Dispatching request"
        );
    }
}

/// Response metadata for structured logging
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// HTTP status code
    pub status: u16,
    /// Time from dispatch to decoded value or classified error
    pub elapsed: Duration,
}

impl ResponseMetadata {
    /// Create new response metadata
    pub fn new(status: u16, elapsed: Duration) -> Self {
        Self { status, elapsed }
    }

    /// Log a decoded success response
    pub fn log_success(&self, request: &RequestMetadata, value_type: &str) {
        info!(
            provider = %request.provider,
            operation = %request.operation,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            value = value_type,
            "Invocation succeeded"
        );
    }

    /// Log a classified failure
    pub fn log_error(&self, request: &RequestMetadata, error: &str) {
        warn!(
            provider = %request.provider,
            operation = %request.operation,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            error = %error,
            "Invocation failed"
        );
    }
}

/// Log a request that never produced a response.
pub fn log_transport_failure(request: &RequestMetadata, elapsed: Duration, error: &str) {
    warn!(
        provider = %request.provider,
        operation = %request.operation,
        target = %request.target,
        elapsed_ms = elapsed.as_millis(),
        error = %error,
        "Transport failure"
    );
}

/// Log an invocation abandoned by its caller.
pub fn log_cancelled(provider: &str, operation: &str) {
    debug!(provider = %provider, operation = %operation, "Invocation cancelled");
}

/// Timer for measuring request duration
#[derive(Debug)]
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Install a `tracing-subscriber` formatter as the global subscriber.
///
/// Does nothing if a global subscriber is already set.
#[cfg(feature = "trace")]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    #[test]
    fn test_request_metadata_omits_query() {
        let request = Request::new(
            Method::GET,
            Url::parse("https://ec2.us-east-1.amazonaws.com/?Action=DescribeImages&Signature=abc").unwrap(),
        );
        let meta = RequestMetadata::new("ec2", "describeImagesInRegion", &request);
        assert_eq!(meta.target, "ec2.us-east-1.amazonaws.com/");
        assert!(!format!("{meta:?}").contains("Signature"));
        assert_eq!(meta.body_size, None);
    }

    #[test]
    fn test_timer() {
        let timer = RequestTimer::start();
        assert!(timer.elapsed() < Duration::from_secs(5));
        let meta = ResponseMetadata::new(200, timer.elapsed());
        assert_eq!(meta.status, 200);
    }
}
