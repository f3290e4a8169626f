//! Wire-level transport abstraction for cloudbind
//!
//! The framework crate never talks to the network directly. It hands a fully
//! built, already-signed request to a [`Transport`] and gets back a status,
//! the response headers and a stream of body chunks.
//!
//! # Architecture
//!
//! - **Transport trait**: the single dispatch seam used by provider contexts
//! - **HTTP transport**: `reqwest`-backed implementation with streaming bodies
//! - **Error handling**: [`TransportError`] for connection, timeout and body failures
//!
//! # Usage
//!
//! ```ignore
//! use cloudbind_transport::{HttpTransport, Transport, WireRequest};
//!
//! let transport = HttpTransport::new()?;
//! let request = WireRequest::new(http::Method::GET, "https://ec2.us-east-1.amazonaws.com/".parse()?);
//! let response = transport.send(request).await?;
//! let body = response.collect_body().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod traits;

// Re-export commonly used types
pub use crate::error::{Result, TransportError};
pub use crate::http::{HttpTransport, HttpTransportConfig};
pub use crate::traits::{BodyStream, NoopTransport, Transport, WireRequest, WireResponse};
