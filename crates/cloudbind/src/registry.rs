//! Provider registry
//!
//! Maps provider ids to [`Provider`] descriptions and caches one
//! [`ProviderContext`] per id. Construction is single-flight: concurrent first
//! access to an id builds the context once and every caller shares it.
//! [`ProviderRegistry::invoke`] on an id without a context builds it from the
//! environment. Contexts live until [`ProviderRegistry::invalidate`] drops them.

use crate::binder::Args;
use crate::cache::InvalidatingCache;
use crate::config::{ContextConfig, Credentials};
use crate::context::{Provider, ProviderContext};
use crate::error::{Error, Result};
use crate::filter::{Clock, SystemClock};
use crate::parser::DomainValue;
use cloudbind_transport::Transport;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Registry of providers and their constructed contexts.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    contexts: InvalidatingCache<String, Arc<ProviderContext>>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl ProviderRegistry {
    /// Create an empty registry dispatching through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            contexts: InvalidatingCache::new(),
            transport,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock for timestamp filters.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a provider, builder style.
    pub fn with_provider(self, provider: impl Provider + 'static) -> Self {
        self.register(Arc::new(provider));
        self
    }

    /// Register or replace a provider. A cached context for the same id is
    /// dropped.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        let replaced = self
            .providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), provider)
            .is_some();
        if replaced {
            self.contexts.invalidate(&id);
        }
        debug!(provider = %id, replaced, "Provider registered");
    }

    /// Registered provider for `id`.
    pub fn provider(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Registered provider ids, sorted.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Context for `id`, constructing it on first access.
    ///
    /// `config` and `credentials` are only used by the call that performs the
    /// construction; later calls get the cached context until it is
    /// invalidated.
    ///
    /// # Errors
    ///
    /// `UnknownProvider` for an unregistered id, or whatever construction
    /// fails with. A failed construction is not cached.
    pub async fn context_for(
        &self,
        id: &str,
        config: ContextConfig,
        credentials: Credentials,
    ) -> Result<Arc<ProviderContext>> {
        self.construct(id, move || Ok((config, credentials))).await
    }

    async fn construct<F>(&self, id: &str, settings: F) -> Result<Arc<ProviderContext>>
    where
        F: FnOnce() -> Result<(ContextConfig, Credentials)>,
    {
        let provider = self
            .provider(id)
            .ok_or_else(|| Error::UnknownProvider(id.to_string()))?;

        self.contexts
            .get_or_try_init(&id.to_string(), || async {
                // Only the constructing caller resolves settings.
                let (config, credentials) = settings()?;
                let context = ProviderContext::build(
                    provider.as_ref(),
                    config,
                    credentials,
                    self.transport.clone(),
                    self.clock.clone(),
                )?;
                Ok::<_, Error>(Arc::new(context))
            })
            .await
    }

    /// Already constructed context for `id`.
    pub fn context(&self, id: &str) -> Option<Arc<ProviderContext>> {
        self.contexts.get(&id.to_string())
    }

    /// Drop the cached context for `id`. The next `context_for` rebuilds it.
    pub fn invalidate(&self, id: &str) -> bool {
        let dropped = self.contexts.invalidate(&id.to_string());
        if dropped {
            info!(provider = %id, "Provider context invalidated");
        }
        dropped
    }

    /// Invoke an operation, constructing the context on first use.
    ///
    /// A missing context is built through the same single-flight path as
    /// [`context_for`](Self::context_for), with
    /// [`ContextConfig::from_env`] and [`Credentials::from_env`].
    ///
    /// # Errors
    ///
    /// `UnknownProvider` for an unregistered id, `MissingCredentials` when the
    /// context must be built and the environment holds no credentials, then
    /// anything [`ProviderContext::invoke`] returns.
    pub async fn invoke(&self, id: &str, operation: &str, args: &Args) -> Result<DomainValue> {
        let context = match self.context(id) {
            Some(context) => context,
            None => {
                debug!(provider = %id, "Constructing context from environment");
                self.construct(id, || Ok((ContextConfig::from_env(id), Credentials::from_env(id)?)))
                    .await?
            }
        };
        context.invoke(operation, args).await
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_ids())
            .field("contexts", &self.contexts.len())
            .field("transport", &self.transport.name())
            .finish()
    }
}
