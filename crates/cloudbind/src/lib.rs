//! # cloudbind
//!
//! Declarative plumbing for multi-provider cloud SDKs:
//! - Binding descriptors that turn named arguments into requests
//! - Authentication filter chains (timestamps, HMAC signing, tokens)
//! - Streaming XML and JSON response parsing into domain values
//! - Table-driven classification of provider errors
//! - A provider registry with single-flight context construction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloudbind::providers::{self, ec2};
//! use cloudbind::{ContextConfig, Credentials, HttpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = providers::registry(Arc::new(HttpTransport::new()?));
//!     let context = registry
//!         .context_for("ec2", ContextConfig::new(), Credentials::new("AKIDEXAMPLE", "secret"))
//!         .await?;
//!
//!     match ec2::image_in_region(&context, "us-east-1", "ami-be3adfd7").await? {
//!         Some(image) => println!("{} is {:?}", image.id, image.state),
//!         None => println!("no such image"),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Re-export commonly used types
pub use binder::{ArgValue, Args, Binder, BindingDescriptor};
pub use config::{ContextConfig, Credentials};
pub use context::{Operation, OperationTable, OptionalExt, Provider, ProviderContext};
pub use error::{ClassifiedError, Error, ErrorKind, Result};
pub use parser::DomainValue;
pub use registry::ProviderRegistry;
pub use request::Request;

// Module declarations
pub mod binder;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod observability;
pub mod parser;
pub mod providers;
pub mod registry;
pub mod request;

// Re-export the transport seam
pub use cloudbind_transport::{HttpTransport, HttpTransportConfig, NoopTransport, Transport, TransportError};

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use cloudbind::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ArgValue, Args, ClassifiedError, ContextConfig, Credentials, DomainValue, Error, ErrorKind, OptionalExt,
        Provider, ProviderContext, ProviderRegistry, Result,
    };
}

/// Crate version, taken from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
