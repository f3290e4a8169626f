//! Reference providers
//!
//! Each provider is a plain [`Provider`](crate::context::Provider)
//! implementation: descriptor tables, a filter chain and an error mapper.
//!
//! - [`ec2`]: query protocol, HMAC query signing, XML responses
//! - [`nova`]: JSON protocol, token header, server creation options
//! - [`vpdc`]: XML network sections behind basic authentication

pub mod ec2;
pub mod nova;
pub mod vpdc;

pub use ec2::Ec2;
pub use nova::Nova;
pub use vpdc::Vpdc;

use crate::registry::ProviderRegistry;
use cloudbind_transport::Transport;
use std::sync::Arc;

/// A registry with every reference provider registered.
pub fn registry(transport: Arc<dyn Transport>) -> ProviderRegistry {
    ProviderRegistry::new(transport)
        .with_provider(Ec2)
        .with_provider(Nova)
        .with_provider(Vpdc)
}
