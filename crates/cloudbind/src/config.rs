//! Context configuration and credentials

use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Per-context overrides applied on top of a provider's defaults.
///
/// Payload limits are provider constants and cannot be overridden here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextConfig {
    /// Endpoint override, may contain `{placeholders}`
    pub endpoint: Option<String>,

    /// API version override
    pub api_version: Option<String>,

    /// Headers added to every request before signing
    pub default_headers: Vec<(String, String)>,
}

impl ContextConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder.
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::default()
    }

    /// Configuration overriding only the endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// Load overrides for a provider from environment variables.
    ///
    /// This will look for:
    /// - `CLOUDBIND_<PROVIDER>_ENDPOINT` for the endpoint
    /// - `CLOUDBIND_<PROVIDER>_API_VERSION` for the API version
    ///
    /// `<PROVIDER>` is the provider id uppercased with `-` replaced by `_`.
    /// With the `env` feature a `.env` file is loaded first when present.
    pub fn from_env(provider_id: &str) -> Self {
        use std::env;

        load_dotenv();
        let prefix = env_prefix(provider_id);
        let mut config = Self::default();

        if let Ok(endpoint) = env::var(format!("{prefix}_ENDPOINT"))
            && !endpoint.trim().is_empty()
        {
            config.endpoint = Some(endpoint.trim().to_string());
        }

        if let Ok(api_version) = env::var(format!("{prefix}_API_VERSION"))
            && !api_version.trim().is_empty()
        {
            config.api_version = Some(api_version.trim().to_string());
        }

        config
    }

    /// Merge this configuration with another, with the other taking precedence.
    ///
    /// Default headers are combined; a header set in `other` replaces every
    /// value of the same name from `self`.
    pub fn merge(mut self, other: ContextConfig) -> Self {
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint;
        }
        if other.api_version.is_some() {
            self.api_version = other.api_version;
        }
        for (name, value) in other.default_headers {
            self.default_headers
                .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            self.default_headers.push((name, value));
        }
        self
    }

    /// Check the overrides are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: "endpoint must be an http or https URI".to_string(),
            });
        }
        for (name, _) in &self.default_headers {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::InvalidHeader(name.clone()));
            }
        }
        Ok(())
    }
}

/// Builder for creating [`ContextConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct ContextConfigBuilder {
    config: ContextConfig,
}

impl ContextConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint override.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Set the API version override.
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.config.api_version = Some(api_version.into());
        self
    }

    /// Add a default header.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ContextConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Identity and secret for one provider account.
///
/// The secret never appears in `Debug` output or log records.
#[derive(Clone)]
pub struct Credentials {
    identity: String,
    secret: SecretString,
}

impl Credentials {
    /// Create credentials.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::new(secret.into().into_boxed_str()),
        }
    }

    /// Public identity (access key id, user name, tenant).
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Secret material.
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub(crate) fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }

    /// Load credentials for a provider from environment variables.
    ///
    /// This will look for `CLOUDBIND_<PROVIDER>_IDENTITY` and
    /// `CLOUDBIND_<PROVIDER>_CREDENTIAL`.
    ///
    /// # Errors
    ///
    /// `MissingCredentials` naming the first variable that is not set.
    pub fn from_env(provider_id: &str) -> Result<Self, ConfigError> {
        use std::env;

        load_dotenv();
        let prefix = env_prefix(provider_id);
        let identity_var = format!("{prefix}_IDENTITY");
        let credential_var = format!("{prefix}_CREDENTIAL");

        let identity = env::var(&identity_var)
            .map_err(|_| ConfigError::MissingCredentials(format!("{identity_var} is not set")))?;
        let secret = env::var(&credential_var)
            .map_err(|_| ConfigError::MissingCredentials(format!("{credential_var} is not set")))?;

        Ok(Self::new(identity, secret))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(feature = "env")]
fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(not(feature = "env"))]
fn load_dotenv() {}

fn env_prefix(provider_id: &str) -> String {
    let id: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CLOUDBIND_{id}")
}
