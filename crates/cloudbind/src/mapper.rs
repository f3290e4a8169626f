//! Error mapper
//!
//! Classifies non-2xx responses into [`ClassifiedError`]s. The status table
//! gives the generic answer; a provider fault parser can extract a code and
//! message from the body, and a provider code table can override the generic
//! kind when the code is more specific (EC2 reports a missing image as
//! `400 InvalidAMIID.NotFound`).

use crate::error::{ClassifiedError, ErrorKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Provider fault extracted from an error body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fault {
    /// Provider error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Provider request id
    pub request_id: Option<String>,
}

/// Extracts a [`Fault`] from an error body in the provider's schema.
pub trait FaultParser: Send + Sync + fmt::Debug {
    /// `None` when the body is not a recognisable fault.
    fn parse_fault(&self, body: &[u8]) -> Option<Fault>;
}

/// Status code to kind table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    kinds: BTreeMap<u16, ErrorKind>,
    retryable: Vec<u16>,
}

impl Default for StatusTable {
    fn default() -> Self {
        let kinds = BTreeMap::from([
            (401, ErrorKind::Unauthorized),
            (403, ErrorKind::Unauthorized),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::Conflict),
            (429, ErrorKind::RateLimited),
            (503, ErrorKind::RateLimited),
        ]);
        Self {
            kinds,
            retryable: vec![500, 502, 504],
        }
    }
}

impl StatusTable {
    /// Map a status to a kind.
    pub fn with(mut self, status: u16, kind: ErrorKind) -> Self {
        self.kinds.insert(status, kind);
        self
    }

    /// Mark an unknown status as worth retrying.
    pub fn retry(mut self, status: u16) -> Self {
        if !self.retryable.contains(&status) {
            self.retryable.push(status);
        }
        self
    }

    /// Kind for a status; anything unlisted is `Unknown`.
    pub fn kind(&self, status: u16) -> ErrorKind {
        self.kinds.get(&status).copied().unwrap_or(ErrorKind::Unknown)
    }

    /// Retry hint for a status.
    pub fn retry_hint(&self, status: u16) -> bool {
        self.kind(status) == ErrorKind::RateLimited || self.retryable.contains(&status)
    }
}

/// How a provider code is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeMatch {
    /// Whole code
    Exact(String),
    /// Code ending with, e.g. `.NotFound`
    Suffix(String),
    /// Code starting with, e.g. `Unauthorized`
    Prefix(String),
}

impl CodeMatch {
    fn matches(&self, code: &str) -> bool {
        match self {
            CodeMatch::Exact(s) => code == s,
            CodeMatch::Suffix(s) => code.ends_with(s.as_str()),
            CodeMatch::Prefix(s) => code.starts_with(s.as_str()),
        }
    }
}

/// Table-driven classifier for one provider.
#[derive(Debug, Clone, Default)]
pub struct ErrorMapper {
    statuses: StatusTable,
    codes: Vec<(CodeMatch, ErrorKind)>,
    fault_parser: Option<Arc<dyn FaultParser>>,
}

impl ErrorMapper {
    /// Mapper with the default status table and no fault parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the status table.
    pub fn with_statuses(mut self, statuses: StatusTable) -> Self {
        self.statuses = statuses;
        self
    }

    /// Map a provider code exactly.
    pub fn code(mut self, code: &str, kind: ErrorKind) -> Self {
        self.codes.push((CodeMatch::Exact(code.to_string()), kind));
        self
    }

    /// Map provider codes by suffix.
    pub fn code_suffix(mut self, suffix: &str, kind: ErrorKind) -> Self {
        self.codes.push((CodeMatch::Suffix(suffix.to_string()), kind));
        self
    }

    /// Map provider codes by prefix.
    pub fn code_prefix(mut self, prefix: &str, kind: ErrorKind) -> Self {
        self.codes.push((CodeMatch::Prefix(prefix.to_string()), kind));
        self
    }

    /// Use a fault parser for error bodies.
    pub fn with_fault_parser(mut self, parser: Arc<dyn FaultParser>) -> Self {
        self.fault_parser = Some(parser);
        self
    }

    fn code_kind(&self, code: &str) -> Option<ErrorKind> {
        self.codes
            .iter()
            .find(|(matcher, _)| matcher.matches(code))
            .map(|(_, kind)| *kind)
    }

    /// Classify a status and an already-parsed fault.
    ///
    /// A fault code found in the provider code table wins over the status
    /// table; otherwise the status decides and the fault only contributes its
    /// code and message.
    pub fn classify(&self, status: u16, fault: Option<&Fault>) -> ClassifiedError {
        let status_kind = self.statuses.kind(status);
        let kind = fault
            .and_then(|f| self.code_kind(&f.code))
            .unwrap_or(status_kind);

        let message = match fault {
            Some(f) if !f.message.is_empty() => f.message.clone(),
            Some(f) => f.code.clone(),
            None => format!("HTTP {status}"),
        };

        let retry_hint = kind == ErrorKind::RateLimited
            || (kind == status_kind && self.statuses.retry_hint(status));

        let mut err = ClassifiedError::new(kind, message)
            .with_status(status)
            .with_retry_hint(retry_hint);
        if let Some(fault) = fault {
            if !fault.code.is_empty() {
                err = err.with_code(fault.code.clone());
            }
            if let Some(request_id) = &fault.request_id {
                err = err.with_request_id(request_id.clone());
            }
        }
        err
    }

    /// Classify a status and raw error body.
    ///
    /// Without a recognisable fault the body text becomes the message; a body
    /// that is not UTF-8 is reported by size instead of being reinterpreted.
    pub fn classify_body(&self, status: u16, body: &[u8]) -> ClassifiedError {
        let fault = self.fault_parser.as_ref().and_then(|p| p.parse_fault(body));
        let mut err = self.classify(status, fault.as_ref());
        if fault.is_none() && !body.is_empty() {
            err.message = match std::str::from_utf8(body) {
                Ok(text) => text.trim().to_string(),
                Err(_) => format!("HTTP {status} with {} byte non-UTF-8 body", body.len()),
            };
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(404, ErrorKind::NotFound, false)]
    #[case(401, ErrorKind::Unauthorized, false)]
    #[case(403, ErrorKind::Unauthorized, false)]
    #[case(409, ErrorKind::Conflict, false)]
    #[case(429, ErrorKind::RateLimited, true)]
    #[case(503, ErrorKind::RateLimited, true)]
    #[case(500, ErrorKind::Unknown, true)]
    #[case(400, ErrorKind::Unknown, false)]
    #[case(418, ErrorKind::Unknown, false)]
    fn test_status_table(#[case] status: u16, #[case] kind: ErrorKind, #[case] retry: bool) {
        let err = ErrorMapper::new().classify(status, None);
        assert_eq!(err.kind, kind);
        assert_eq!(err.retry_hint, retry);
        assert_eq!(err.status, Some(status));
    }

    #[test]
    fn test_specific_fault_code_wins() {
        let mapper = ErrorMapper::new().code_suffix(".NotFound", ErrorKind::NotFound);
        let fault = Fault {
            code: "InvalidAMIID.NotFound".into(),
            message: "The AMI ID 'ami-1' does not exist".into(),
            request_id: Some("req-1".into()),
        };

        let err = mapper.classify(400, Some(&fault));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.code.as_deref(), Some("InvalidAMIID.NotFound"));
        assert_eq!(err.message, "The AMI ID 'ami-1' does not exist");
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_unmapped_fault_code_keeps_status_kind() {
        let fault = Fault {
            code: "SomethingOdd".into(),
            message: String::new(),
            request_id: None,
        };
        let err = ErrorMapper::new().classify(409, Some(&fault));
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "SomethingOdd");
    }

    #[test]
    fn test_code_override_drops_status_retry_hint() {
        let mapper = ErrorMapper::new().code("InsufficientInstanceCapacity", ErrorKind::Conflict);
        let fault = Fault {
            code: "InsufficientInstanceCapacity".into(),
            ..Default::default()
        };
        let err = mapper.classify(500, Some(&fault));
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(!err.retry_hint);
    }

    #[test]
    fn test_body_without_fault_parser() {
        let err = ErrorMapper::new().classify_body(404, b"  no such server \n");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "no such server");

        let err = ErrorMapper::new().classify_body(500, &[0xff, 0xfe]);
        assert_eq!(err.message, "HTTP 500 with 2 byte non-UTF-8 body");
    }

    #[test]
    fn test_custom_status_table() {
        let mapper = ErrorMapper::new().with_statuses(StatusTable::default().with(410, ErrorKind::NotFound).retry(507));
        assert_eq!(mapper.classify(410, None).kind, ErrorKind::NotFound);
        assert!(mapper.classify(507, None).retry_hint);
    }
}
