//! Authentication filter chain
//!
//! Filters are pure transformations `(Request, Credentials) -> Request`
//! applied in declared order after binding and before dispatch. A chain holds
//! at most one [`FilterRole::Signer`], and it must be the signer the provider
//! declared; anything else is rejected when the chain is built.

pub mod signing;
pub mod timestamp;
pub mod token;

pub use signing::{HmacSigner, SignaturePlacement};
pub use timestamp::{Clock, FixedClock, SystemClock, TimestampFilter, TimestampFormat};
pub use token::TokenFilter;

use crate::config::Credentials;
use crate::error::AuthError;
use crate::request::Request;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What a filter does to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRole {
    /// Adds non-credential decoration (dates, user agents)
    Decorator,
    /// Authenticates the request; at most one per chain
    Signer,
}

/// A request transformer.
///
/// Implementations hold no mutable state. A filter marked
/// [`replaceable`](RequestFilter::replaceable) must replace its own previous
/// effect when applied again rather than add to it.
pub trait RequestFilter: Send + Sync + fmt::Debug {
    /// Stable identity recorded on the request.
    fn id(&self) -> &'static str;

    /// Role in the chain.
    fn role(&self) -> FilterRole {
        FilterRole::Decorator
    }

    /// Whether applying twice is allowed.
    fn replaceable(&self) -> bool {
        false
    }

    /// Transform the request.
    fn apply(&self, request: Request, credentials: &Credentials) -> Result<Request, AuthError>;
}

/// Ordered, validated list of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn RequestFilter>>,
    signer: Option<&'static str>,
}

impl FilterChain {
    /// Build a chain and check it against the declared signer.
    ///
    /// # Errors
    ///
    /// - `DuplicateSigner` when more than one filter is a signer
    /// - `MissingSigner` when a signer is declared but none is present
    /// - `UnexpectedSigner` when the signer present is not the declared one
    pub fn new(filters: Vec<Arc<dyn RequestFilter>>, declared: Option<&'static str>) -> Result<Self, AuthError> {
        let signers: Vec<&'static str> = filters
            .iter()
            .filter(|f| f.role() == FilterRole::Signer)
            .map(|f| f.id())
            .collect();

        if signers.len() > 1 {
            return Err(AuthError::DuplicateSigner(signers));
        }

        match (declared, signers.first()) {
            (Some(expected), None) => return Err(AuthError::MissingSigner { expected }),
            (Some(expected), Some(&found)) if found != expected => {
                return Err(AuthError::UnexpectedSigner { expected, found });
            }
            (None, Some(&found)) => {
                return Err(AuthError::UnexpectedSigner {
                    expected: "none",
                    found,
                });
            }
            _ => {}
        }

        Ok(Self {
            filters,
            signer: declared,
        })
    }

    /// Chain with no filters and no signer.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Identity of the signer, if any.
    pub fn signer(&self) -> Option<&'static str> {
        self.signer
    }

    /// Filter identities in order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.id()).collect()
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply every filter in order.
    ///
    /// A request that already carries a filter's identity (a retry) is only
    /// accepted when that filter is replaceable.
    pub fn apply(&self, request: Request, credentials: &Credentials) -> Result<Request, AuthError> {
        let mut request = request;
        for filter in &self.filters {
            let id = filter.id();
            if request.has_filter(id) && !filter.replaceable() {
                return Err(AuthError::AlreadyApplied(id));
            }
            request = filter.apply(request, credentials)?.mark_filter(id);
        }
        debug!(
            filters = ?request.filters(),
            identity = credentials.identity(),
            "Filter chain applied"
        );
        Ok(request)
    }
}
