//! Date header materialisation

use super::{FilterRole, RequestFilter};
use crate::config::Credentials;
use crate::error::AuthError;
use crate::request::Request;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Wire format of the materialised timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `2011-06-01T12:00:00Z`
    Iso8601,
    /// `Wed, 01 Jun 2011 12:00:00 GMT`
    Rfc1123,
}

impl TimestampFormat {
    /// Format an instant.
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            TimestampFormat::Rfc1123 => instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        }
    }
}

/// Sets a date header from a [`Clock`].
///
/// Replaceable: re-applying on retry refreshes the header instead of adding a
/// second one.
#[derive(Debug, Clone)]
pub struct TimestampFilter {
    header: String,
    format: TimestampFormat,
    clock: Arc<dyn Clock>,
}

impl TimestampFilter {
    /// Filter identity.
    pub const ID: &'static str = "timestamp";

    /// Create a filter writing `header` in `format`.
    pub fn new(header: impl Into<String>, format: TimestampFormat, clock: Arc<dyn Clock>) -> Self {
        Self {
            header: header.into(),
            format,
            clock,
        }
    }

    /// Header this filter writes.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl RequestFilter for TimestampFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn role(&self) -> FilterRole {
        FilterRole::Decorator
    }

    fn replaceable(&self) -> bool {
        true
    }

    fn apply(&self, request: Request, _credentials: &Credentials) -> Result<Request, AuthError> {
        let stamp = self.format.format(self.clock.now());
        Ok(request.with_replaced_header(self.header.clone(), stamp))
    }
}
