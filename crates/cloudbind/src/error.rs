//! Error types for cloudbind
//!
//! Binding and authentication errors are construction defects: they surface
//! to the immediate caller and are never worth retrying. Everything that comes
//! back from the wire is normalised into a [`ClassifiedError`] carrying a
//! provider-agnostic [`ErrorKind`] and a retry hint. Nothing in this crate
//! retries on its own.

use cloudbind_transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Result type alias for cloudbind operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type returned by provider contexts and the registry.
#[derive(Debug, Error)]
pub enum Error {
    /// Arguments could not be bound onto a request.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The authentication filter chain rejected the request.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A document could not be decoded outside of an invocation.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The provider (or the transport) reported a failure.
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    /// Provider or context configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No provider with this identifier is registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider has no operation with this name.
    #[error("Unknown operation '{operation}' for provider '{provider}'")]
    UnknownOperation {
        /// Provider identifier
        provider: String,
        /// Requested operation name
        operation: String,
    },

    /// The decoded value is not of the type the caller asked for.
    #[error("Operation '{operation}' produced {found}, not the requested type")]
    UnexpectedValue {
        /// Operation name
        operation: String,
        /// Type name of the produced value
        found: &'static str,
    },

    /// The caller cancelled the invocation before it completed.
    #[error("Invocation cancelled before completion")]
    Cancelled,
}

impl Error {
    /// The classification, if this error came back from the wire.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Classified(err) => Some(err),
            _ => None,
        }
    }

    /// Check if this error means the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.classified()
            .is_some_and(|err| err.kind == ErrorKind::NotFound)
    }

    /// Retry hint for the orchestration layer.
    ///
    /// Only classified errors can be retryable; binding and auth errors are
    /// local defects.
    pub fn is_retryable(&self) -> bool {
        self.classified().is_some_and(|err| err.retry_hint)
    }
}

/// Errors raised while turning an operation and its arguments into a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    /// A required argument or path placeholder had no value.
    #[error("Missing argument '{0}'")]
    MissingArgument(String),

    /// A payload entry exceeds the provider's size cap.
    #[error("{name} is {size} bytes; the provider limit is {limit} bytes")]
    PayloadTooLarge {
        /// What was too large (file path, metadata key, ...)
        name: String,
        /// Actual size in bytes
        size: usize,
        /// Maximum allowed size in bytes
        limit: usize,
    },

    /// Too many entries of one kind were supplied.
    #[error("{count} {kind} entries supplied; the provider allows at most {limit}")]
    TooManyEntries {
        /// Entry kind ("file", "metadata", ...)
        kind: &'static str,
        /// Number supplied
        count: usize,
        /// Maximum allowed
        limit: usize,
    },

    /// More than one argument wants to be the payload root.
    #[error("More than one argument binds as the payload root: {0:?}")]
    AmbiguousPayloadRoot(Vec<String>),

    /// An argument has a shape its binding cannot use.
    #[error("Argument '{name}' cannot be bound: expected {expected}")]
    InvalidArgument {
        /// Argument name
        name: String,
        /// Expected shape
        expected: &'static str,
    },

    /// The URI template itself is malformed or inconsistent with its bindings.
    #[error("Invalid URI template '{template}': {reason}")]
    InvalidTemplate {
        /// Template text
        template: String,
        /// What is wrong with it
        reason: String,
    },

    /// The expanded template is not a valid absolute URI.
    #[error("Invalid request URI '{uri}': {reason}")]
    InvalidUri {
        /// Expanded URI text
        uri: String,
        /// Parser message
        reason: String,
    },

    /// The payload could not be encoded.
    #[error("Payload encoding failed: {0}")]
    Encoding(String),
}

/// Errors raised by the authentication filter chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A signer was declared but the chain has none.
    #[error("Signer '{expected}' is declared but the filter chain has no signer")]
    MissingSigner {
        /// Declared signer identity
        expected: &'static str,
    },

    /// The chain contains more than one signer.
    #[error("Filter chain contains more than one signer: {0:?}")]
    DuplicateSigner(Vec<&'static str>),

    /// The chain resolved to a different signer than the one declared.
    #[error("Filter chain resolved signer '{found}' but '{expected}' is declared")]
    UnexpectedSigner {
        /// Declared signer identity
        expected: &'static str,
        /// Signer actually present
        found: &'static str,
    },

    /// A non-replaceable filter was applied to a request it already touched.
    #[error("Filter '{0}' has already been applied and is not replaceable")]
    AlreadyApplied(&'static str),

    /// The timestamp a signer depends on has not been materialised.
    #[error("Header '{0}' must be set before signing")]
    MissingTimestamp(String),

    /// The credential material cannot be used by this filter.
    #[error("Credential rejected: {0}")]
    InvalidCredential(String),
}

/// Errors raised by the streaming response parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A closing element does not match the innermost open element.
    #[error("Closing element '{found}' does not match open element {expected:?}")]
    StructureMismatch {
        /// Innermost open element, if any
        expected: Option<String>,
        /// Element actually closed
        found: String,
    },

    /// The document ended with elements still open.
    #[error("Document ended with {open} element(s) still open")]
    UnexpectedEof {
        /// Number of elements left open
        open: usize,
    },

    /// The document is not well-formed.
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// The document is not valid in its declared encoding.
    #[error("Invalid character encoding: {0}")]
    Encoding(String),

    /// An element's content could not be converted.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field or element name
        field: String,
        /// Conversion failure
        reason: String,
    },
}

/// Errors raised while wiring a provider context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint is not a usable base URI.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Endpoint text
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// An operation descriptor failed eager validation.
    #[error("Operation '{operation}' is invalid: {reason}")]
    InvalidOperation {
        /// Operation name
        operation: String,
        /// Validation failure
        reason: String,
    },

    /// The same operation name was registered twice.
    #[error("Operation '{0}' is defined more than once")]
    DuplicateOperation(String),

    /// Credentials could not be found.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Invalid default header.
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),
}

/// Provider-agnostic failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    /// Credentials were rejected or lack permission.
    Unauthorized,
    /// The resource is in a state that conflicts with the request.
    Conflict,
    /// The provider is throttling the caller.
    RateLimited,
    /// A success response could not be decoded.
    MalformedResponse,
    /// The request never produced a response.
    TransportFailure,
    /// Anything else.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::TransportFailure => "transport failure",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Normalised failure signal replacing provider status codes and fault bodies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct ClassifiedError {
    /// Failure category
    pub kind: ErrorKind,
    /// Whether the orchestration layer may reasonably retry
    pub retry_hint: bool,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Provider error code from the fault body
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Provider request id, when reported
    pub request_id: Option<String>,
}

impl ClassifiedError {
    /// Create a classification with no status or code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retry_hint: matches!(kind, ErrorKind::RateLimited),
            status: None,
            code: None,
            message: message.into(),
            request_id: None,
        }
    }

    /// A success response whose body could not be decoded.
    pub fn malformed(status: u16, err: &ParseError) -> Self {
        Self::new(ErrorKind::MalformedResponse, err.to_string()).with_status(status)
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the provider error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Override the retry hint.
    pub fn with_retry_hint(mut self, retry_hint: bool) -> Self {
        self.retry_hint = retry_hint;
        self
    }

    /// Set the provider request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Check if the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match (&self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, " (status {status}, code {code})")?,
            (Some(status), None) => write!(f, " (status {status})")?,
            (None, Some(code)) => write!(f, " (code {code})")?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl From<TransportError> for ClassifiedError {
    fn from(err: TransportError) -> Self {
        let transient = err.is_transient();
        ClassifiedError::new(ErrorKind::TransportFailure, err.to_string()).with_retry_hint(transient)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Classified(err.into())
    }
}
