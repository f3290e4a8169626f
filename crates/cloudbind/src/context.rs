//! Providers, operation tables and provider contexts
//!
//! A [`Provider`] is the static description of one backend: default endpoint,
//! API version, payload limits, operation table, filter chain and error
//! mapper. A [`ProviderContext`] is that description bound to an endpoint,
//! credentials and a transport. Contexts are immutable once built; rotating
//! credentials means building a new one.

use crate::binder::{Args, Binder, BindingDescriptor, PayloadEncoder, PayloadLimits};
use crate::config::{ContextConfig, Credentials};
use crate::error::{AuthError, ClassifiedError, ConfigError, Error, Result};
use crate::filter::{Clock, FilterChain};
use crate::mapper::ErrorMapper;
use crate::observability::{self, RequestMetadata, RequestTimer, ResponseMetadata};
use crate::parser::{DomainValue, ResponseParser};
use crate::request::Request;
use cloudbind_transport::Transport;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// One operation: how to bind it and how to decode its success response.
#[derive(Debug, Clone)]
pub struct Operation {
    descriptor: BindingDescriptor,
    parser: Arc<dyn ResponseParser>,
}

impl Operation {
    /// Pair a descriptor with a response parser.
    pub fn new(descriptor: BindingDescriptor, parser: impl ResponseParser + 'static) -> Self {
        Self {
            descriptor,
            parser: Arc::new(parser),
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Binding descriptor.
    pub fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    /// Success response parser.
    pub fn parser(&self) -> &Arc<dyn ResponseParser> {
        &self.parser
    }
}

/// Operations of one provider, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: BTreeMap<String, Operation>,
}

impl OperationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation, builder style.
    ///
    /// # Errors
    ///
    /// `DuplicateOperation` when the name is already taken.
    pub fn with(mut self, operation: Operation) -> std::result::Result<Self, ConfigError> {
        let name = operation.name().to_string();
        if self.operations.contains_key(&name) {
            return Err(ConfigError::DuplicateOperation(name));
        }
        self.operations.insert(name, operation);
        Ok(self)
    }

    /// Look up an operation.
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Operation names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validate every descriptor against a binder's endpoint.
    pub fn validate(&self, binder: &Binder) -> std::result::Result<(), ConfigError> {
        for (name, operation) in &self.operations {
            binder
                .validate(operation.descriptor())
                .map_err(|e| ConfigError::InvalidOperation {
                    operation: name.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Static description of a backend.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider id, e.g. `ec2`.
    fn id(&self) -> &'static str;

    /// Default endpoint template.
    fn endpoint(&self) -> &str;

    /// Default API version.
    fn api_version(&self) -> &str;

    /// Payload caps.
    fn limits(&self) -> PayloadLimits {
        PayloadLimits::UNLIMITED
    }

    /// Operation table. Called once per context construction.
    fn operations(&self) -> Result<OperationTable>;

    /// Authentication filter chain.
    fn filters(&self, clock: Arc<dyn Clock>) -> std::result::Result<FilterChain, AuthError>;

    /// Error classifier.
    fn error_mapper(&self) -> ErrorMapper {
        ErrorMapper::new()
    }

    /// Encoder for provider-specific payload values.
    fn payload_encoder(&self) -> Option<Arc<dyn PayloadEncoder>> {
        None
    }
}

/// A provider bound to an endpoint, credentials and a transport.
pub struct ProviderContext {
    id: String,
    binder: Binder,
    credentials: Credentials,
    operations: OperationTable,
    filters: FilterChain,
    errors: ErrorMapper,
    default_headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
}

impl ProviderContext {
    /// Build and validate a context.
    ///
    /// # Errors
    ///
    /// Configuration, operation table and filter chain problems are all
    /// reported here, before any request is bound.
    pub fn build(
        provider: &dyn Provider,
        config: ContextConfig,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| provider.endpoint().to_string());
        let api_version = config
            .api_version
            .unwrap_or_else(|| provider.api_version().to_string());

        let mut binder = Binder::new(endpoint, api_version).with_limits(provider.limits());
        if let Some(encoder) = provider.payload_encoder() {
            binder = binder.with_encoder(encoder);
        }

        let operations = provider.operations()?;
        operations.validate(&binder)?;
        let filters = provider.filters(clock)?;

        info!(
            provider = provider.id(),
            endpoint = binder.endpoint(),
            api_version = binder.api_version(),
            operations = operations.len(),
            filters = ?filters.ids(),
            identity = credentials.identity(),
            "Provider context constructed"
        );

        Ok(Self {
            id: provider.id().to_string(),
            binder,
            credentials,
            operations,
            filters,
            errors: provider.error_mapper(),
            default_headers: config.default_headers,
            transport,
        })
    }

    /// Provider id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolved endpoint template.
    pub fn endpoint(&self) -> &str {
        self.binder.endpoint()
    }

    /// Resolved API version.
    pub fn api_version(&self) -> &str {
        self.binder.api_version()
    }

    /// Credentials in use.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Operation table.
    pub fn operations(&self) -> &OperationTable {
        &self.operations
    }

    /// Filter chain.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn operation(&self, name: &str) -> Result<&Operation> {
        self.operations.get(name).ok_or_else(|| Error::UnknownOperation {
            provider: self.id.clone(),
            operation: name.to_string(),
        })
    }

    /// Bind and sign a request without sending it.
    pub fn prepare(&self, operation: &str, args: &Args) -> Result<Request> {
        let operation = self.operation(operation)?;
        self.prepare_operation(operation, args)
    }

    fn prepare_operation(&self, operation: &Operation, args: &Args) -> Result<Request> {
        let mut request = self.binder.bind(operation.descriptor(), args)?;
        for (name, value) in &self.default_headers {
            request = request.with_replaced_header(name.clone(), value.clone());
        }
        Ok(self.filters.apply(request, &self.credentials)?)
    }

    /// Run an operation: bind, sign, dispatch, then decode or classify.
    ///
    /// # Errors
    ///
    /// Binding and filter errors are returned as they are. Everything after
    /// dispatch is a [`ClassifiedError`]; a success body that cannot be
    /// decoded is `MalformedResponse`.
    pub async fn invoke(&self, operation: &str, args: &Args) -> Result<DomainValue> {
        let op = self.operation(operation)?;
        let request = self.prepare_operation(op, args)?;

        let meta = RequestMetadata::new(&self.id, operation, &request);
        meta.log_request();
        let timer = RequestTimer::start();

        let response = match self.transport.send(request.to_wire()).await {
            Ok(response) => response,
            Err(err) => {
                observability::log_transport_failure(&meta, timer.elapsed(), &err.to_string());
                return Err(err.into());
            }
        };
        let status = response.status;

        if !response.is_success() {
            let body = response.collect_body().await?;
            let err = self.errors.classify_body(status, &body);
            ResponseMetadata::new(status, timer.elapsed()).log_error(&meta, &err.to_string());
            return Err(err.into());
        }

        match op.parser().parse(response.body).await {
            Ok(value) => {
                ResponseMetadata::new(status, timer.elapsed()).log_success(&meta, value.type_name());
                Ok(value)
            }
            Err(Error::Parse(parse)) => {
                let err = ClassifiedError::malformed(status, &parse);
                ResponseMetadata::new(status, timer.elapsed()).log_error(&meta, &err.to_string());
                Err(err.into())
            }
            Err(other) => {
                ResponseMetadata::new(status, timer.elapsed()).log_error(&meta, &other.to_string());
                Err(other)
            }
        }
    }

    /// Run an operation and recover its concrete value type.
    pub async fn call<T: Any>(&self, operation: &str, args: &Args) -> Result<T> {
        let value = self.invoke(operation, args).await?;
        value.downcast::<T>().map_err(|value| Error::UnexpectedValue {
            operation: operation.to_string(),
            found: value.type_name(),
        })
    }

    /// Run an operation unless `cancel` resolves first.
    ///
    /// On cancellation the in-flight dispatch or body read is dropped, any
    /// partially parsed state is discarded and `Error::Cancelled` is returned.
    pub async fn invoke_until<C>(&self, operation: &str, args: &Args, cancel: C) -> Result<DomainValue>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                observability::log_cancelled(&self.id, operation);
                Err(Error::Cancelled)
            }
            result = self.invoke(operation, args) => result,
        }
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("id", &self.id)
            .field("endpoint", &self.binder.endpoint())
            .field("api_version", &self.binder.api_version())
            .field("credentials", &self.credentials)
            .field("operations", &self.operations.names().collect::<Vec<_>>())
            .field("filters", &self.filters.ids())
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Map a not-found failure to `None` at a lookup boundary.
///
/// Every other error, including a malformed response, is passed through.
pub trait OptionalExt<T> {
    /// `Ok(None)` for not-found, unchanged otherwise.
    fn or_absent(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn or_absent(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
