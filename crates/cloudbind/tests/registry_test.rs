//! Integration tests for the provider registry
//!
//! These tests verify that:
//! - Concurrent first access constructs exactly one context
//! - Failed construction is not cached
//! - Invalidation and re-registration force a rebuild
//! - Invoking before any context exists builds one from the environment

mod common;

use assert_matches::assert_matches;
use cloudbind::context::{Operation, OperationTable, Provider};
use cloudbind::error::{AuthError, ConfigError};
use cloudbind::filter::{Clock, FilterChain};
use cloudbind::parser::EmptyParser;
use cloudbind::{Args, BindingDescriptor, ContextConfig, Credentials, Error, ProviderRegistry};
use common::CannedTransport;
use http::Method;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provider counting how often its operation table is built.
#[derive(Debug, Default)]
struct Counting {
    builds: Arc<AtomicUsize>,
}

impl Provider for Counting {
    fn id(&self) -> &'static str {
        "counting"
    }

    fn endpoint(&self) -> &str {
        "https://counting.example.com"
    }

    fn api_version(&self) -> &str {
        "1"
    }

    fn operations(&self) -> cloudbind::Result<OperationTable> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for concurrent callers.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let ping = BindingDescriptor::builder("ping", Method::GET, "/ping").build()?;
        Ok(OperationTable::new().with(Operation::new(ping, EmptyParser))?)
    }

    fn filters(&self, _clock: Arc<dyn Clock>) -> Result<FilterChain, AuthError> {
        Ok(FilterChain::unauthenticated())
    }
}

fn registry(builds: Arc<AtomicUsize>, transport: Arc<CannedTransport>) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new(transport).with_provider(Counting { builds }))
}

fn creds() -> Credentials {
    Credentials::new("id", "secret")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_first_access_builds_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = registry(builds.clone(), Arc::new(CannedTransport::new(204, "")));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.context_for("counting", ContextConfig::new(), creds()).await })
        })
        .collect();

    let mut contexts = Vec::new();
    for handle in handles {
        contexts.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(contexts.iter().all(|ctx| Arc::ptr_eq(ctx, &contexts[0])));
}

#[tokio::test]
async fn test_failed_construction_is_retried() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = registry(builds.clone(), Arc::new(CannedTransport::new(204, "")));

    let bad = ContextConfig::with_endpoint("not a uri");
    let err = registry.context_for("counting", bad, creds()).await.unwrap_err();
    assert_matches!(err, Error::Config(ConfigError::InvalidEndpoint { .. }));
    assert!(registry.context("counting").is_none());

    registry
        .context_for("counting", ContextConfig::new(), creds())
        .await
        .unwrap();
    assert!(registry.context("counting").is_some());
}

#[tokio::test]
async fn test_invalidate_and_reregister_rebuild() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = registry(builds.clone(), Arc::new(CannedTransport::new(204, "")));

    let first = registry
        .context_for("counting", ContextConfig::new(), creds())
        .await
        .unwrap();
    let cached = registry
        .context_for("counting", ContextConfig::with_endpoint("https://ignored.example.com"), creds())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(cached.endpoint(), "https://counting.example.com");

    assert!(registry.invalidate("counting"));
    assert!(!registry.invalidate("counting"));
    let rebuilt = registry
        .context_for("counting", ContextConfig::new(), creds())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    registry.register(Arc::new(Counting { builds: builds.clone() }));
    assert!(registry.context("counting").is_none());
}

#[test]
fn test_invoke_builds_context_from_environment() {
    temp_env::with_vars(
        [
            ("CLOUDBIND_COUNTING_IDENTITY", Some("env-id")),
            ("CLOUDBIND_COUNTING_CREDENTIAL", Some("env-secret")),
            ("CLOUDBIND_COUNTING_ENDPOINT", Some("https://env.counting.example.com")),
        ],
        || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let builds = Arc::new(AtomicUsize::new(0));
                let transport = Arc::new(CannedTransport::new(204, ""));
                let registry = registry(builds.clone(), transport.clone());
                assert!(registry.context("counting").is_none());

                let handles: Vec<_> = (0..10)
                    .map(|_| {
                        let registry = registry.clone();
                        tokio::spawn(async move { registry.invoke("counting", "ping", &Args::new()).await })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }

                assert_eq!(builds.load(Ordering::SeqCst), 1);
                let context = registry.context("counting").unwrap();
                assert_eq!(context.credentials().identity(), "env-id");
                assert_eq!(transport.sent(), 10);
                assert_eq!(
                    transport.requests()[0].url.as_str(),
                    "https://env.counting.example.com/ping"
                );
            });
        },
    );
}

#[test]
fn test_invoke_without_credentials_in_environment() {
    temp_env::with_vars_unset(["CLOUDBIND_COUNTING_IDENTITY", "CLOUDBIND_COUNTING_CREDENTIAL"], || {
        tokio_test::block_on(async {
            let transport = Arc::new(CannedTransport::new(204, ""));
            let registry = registry(Arc::default(), transport.clone());

            assert_matches!(
                registry.invoke("missing", "ping", &Args::new()).await,
                Err(Error::UnknownProvider(id)) if id == "missing"
            );
            assert_matches!(
                registry.invoke("counting", "ping", &Args::new()).await,
                Err(Error::Config(ConfigError::MissingCredentials(message)))
                    if message.contains("CLOUDBIND_COUNTING_IDENTITY")
            );
            assert!(registry.context("counting").is_none());
            assert_eq!(transport.sent(), 0);

            // An explicitly constructed context needs nothing from the environment.
            registry
                .context_for("counting", ContextConfig::new(), creds())
                .await
                .unwrap();
            registry.invoke("counting", "ping", &Args::new()).await.unwrap();
            assert_eq!(transport.requests()[0].url.as_str(), "https://counting.example.com/ping");
        })
    });
}
