//! Token and basic credential injection

use super::{FilterRole, RequestFilter};
use crate::config::Credentials;
use crate::error::AuthError;
use crate::request::Request;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::ExposeSecret;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scheme {
    Raw,
    Bearer,
    Basic,
}

/// Puts the credential into a header.
///
/// - raw: `X-Auth-Token: <secret>`
/// - bearer: `Authorization: Bearer <secret>`
/// - basic: `Authorization: Basic base64(<identity>:<secret>)`
#[derive(Debug, Clone)]
pub struct TokenFilter {
    header: String,
    scheme: Scheme,
}

impl TokenFilter {
    /// Filter identity.
    pub const ID: &'static str = "token";

    /// Send the secret verbatim in `header`.
    pub fn raw(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            scheme: Scheme::Raw,
        }
    }

    /// `Authorization: Bearer <secret>`.
    pub fn bearer() -> Self {
        Self {
            header: "Authorization".to_string(),
            scheme: Scheme::Bearer,
        }
    }

    /// `Authorization: Basic ...`.
    pub fn basic() -> Self {
        Self {
            header: "Authorization".to_string(),
            scheme: Scheme::Basic,
        }
    }

    /// Header this filter writes.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl RequestFilter for TokenFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn role(&self) -> FilterRole {
        FilterRole::Signer
    }

    fn replaceable(&self) -> bool {
        true
    }

    fn apply(&self, request: Request, credentials: &Credentials) -> Result<Request, AuthError> {
        let secret = credentials.secret().expose_secret();
        if secret.is_empty() {
            return Err(AuthError::InvalidCredential("empty secret".to_string()));
        }
        let value = match self.scheme {
            Scheme::Raw => secret.to_string(),
            Scheme::Bearer => format!("Bearer {secret}"),
            Scheme::Basic => {
                let pair = format!("{}:{secret}", credentials.identity());
                format!("Basic {}", STANDARD.encode(pair))
            }
        };
        Ok(request.with_replaced_header(self.header.clone(), value))
    }
}
