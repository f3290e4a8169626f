//! Request binder
//!
//! Turns an operation's [`BindingDescriptor`] and the caller's [`Args`] into
//! an unsigned [`Request`]. Descriptors are plain data built once at startup;
//! [`BindingDescriptor::build`] and [`Binder::validate`] reject inconsistent
//! tables before any request is bound. Binding itself does no I/O.
//!
//! # Example
//!
//! ```ignore
//! use cloudbind::binder::{Args, Binder, BindingDescriptor};
//! use http::Method;
//!
//! let describe = BindingDescriptor::builder("describeImagesInRegion", Method::GET, "/")
//!     .const_query("Action", "DescribeImages")
//!     .version_query("Version")
//!     .path("region")
//!     .query("imageIds", "ImageId")
//!     .build()?;
//!
//! let binder = Binder::new("https://ec2.{region}.amazonaws.com", "2011-05-15");
//! let request = binder.bind(&describe, &Args::new()
//!     .with("region", "us-east-1")
//!     .with("imageIds", vec!["ami-1"]))?;
//! ```

pub mod encode;
pub mod payload;
pub mod template;

pub use encode::url_encode;
pub use payload::{Attachment, PayloadBinder, PayloadEncoder, PayloadLimits};
pub use template::UriTemplate;

use crate::error::BindingError;
use crate::request::{Payload, Request, set_query};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::Method;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A single argument value.
#[derive(Clone)]
pub enum ArgValue {
    /// Text
    Str(String),
    /// Integer
    Int(i64),
    /// Boolean, bound as `true` / `false`
    Bool(bool),
    /// List of strings, expanded per the binding's [`ListStyle`]
    List(Vec<String>),
    /// Raw bytes, usable as an octet-stream payload
    Bytes(Bytes),
    /// JSON document
    Json(serde_json::Value),
    /// Ordered form fields
    Form(Vec<(String, String)>),
    /// File attachments, checked against the provider's limits
    Attachments(Vec<Attachment>),
    /// Options object that builds the payload itself
    Options(Arc<dyn PayloadBinder>),
    /// Value only the provider's [`PayloadEncoder`] understands
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ArgValue {
    /// Wrap an options object.
    pub fn options(binder: impl PayloadBinder + 'static) -> Self {
        ArgValue::Options(Arc::new(binder))
    }

    /// Wrap a provider-specific payload value.
    pub fn custom(value: impl Any + Send + Sync) -> Self {
        ArgValue::Custom(Arc::new(value))
    }

    fn scalar(&self) -> Option<String> {
        match self {
            ArgValue::Str(s) => Some(s.clone()),
            ArgValue::Int(i) => Some(i.to_string()),
            ArgValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            ArgValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
            ArgValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            ArgValue::List(l) => f.debug_tuple("List").field(l).finish(),
            ArgValue::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ArgValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ArgValue::Form(p) => f.debug_tuple("Form").field(p).finish(),
            ArgValue::Attachments(a) => write!(f, "Attachments({} files)", a.len()),
            ArgValue::Options(o) => f.debug_tuple("Options").field(o).finish(),
            ArgValue::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(value: Vec<String>) -> Self {
        ArgValue::List(value)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(value: Vec<&str>) -> Self {
        ArgValue::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Bytes> for ArgValue {
    fn from(value: Bytes) -> Self {
        ArgValue::Bytes(value)
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        ArgValue::Json(value)
    }
}

impl From<Vec<Attachment>> for ArgValue {
    fn from(value: Vec<Attachment>) -> Self {
        ArgValue::Attachments(value)
    }
}

/// Named arguments for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: BTreeMap<String, ArgValue>,
}

impl Args {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Add or replace an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up an argument.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Check if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where an argument lands on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A `{name}` placeholder in the endpoint or path template
    Path,
    /// A query parameter
    Query(String),
    /// A request header
    Header(String),
    /// A named field of the payload
    PayloadField(String),
    /// The payload root
    Payload,
}

/// How an argument's value is substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Inserted as given
    Raw,
    /// Percent-encoded, leaving the listed characters alone
    UrlEncoded {
        /// Characters kept literal
        skip: Vec<char>,
    },
    /// The value builds the payload itself
    OptionsMerge,
    /// A single DNS label substituted into the endpoint host
    HostLabel,
}

/// How list values expand into query parameters and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStyle {
    /// `Name.1=a&Name.2=b`
    #[default]
    Indexed,
    /// `Name=a&Name=b`
    Repeated,
}

/// Encoding for payload fields when no options object builds the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// JSON object
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

/// How one argument binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBinding {
    /// Argument name in [`Args`]
    pub arg: String,
    /// Target location
    pub location: Location,
    /// Substitution strategy
    pub strategy: Strategy,
    /// List expansion
    pub list_style: ListStyle,
    /// Whether absence is a binding error
    pub required: bool,
}

/// Static description of how an operation's arguments map onto a request.
#[derive(Debug, Clone)]
pub struct BindingDescriptor {
    name: String,
    method: Method,
    path: UriTemplate,
    const_query: Vec<(String, String)>,
    const_headers: Vec<(String, String)>,
    version_query: Option<String>,
    params: Vec<ParamBinding>,
    payload_format: PayloadFormat,
    payload_wrapper: Option<String>,
}

impl BindingDescriptor {
    /// Start a descriptor for an operation.
    pub fn builder(name: impl Into<String>, method: Method, path: impl Into<String>) -> BindingDescriptorBuilder {
        BindingDescriptorBuilder {
            name: name.into(),
            method,
            path: path.into(),
            const_query: Vec::new(),
            const_headers: Vec::new(),
            version_query: None,
            params: Vec::new(),
            payload_format: PayloadFormat::Json,
            payload_wrapper: None,
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template.
    pub fn path(&self) -> &UriTemplate {
        &self.path
    }

    /// Argument bindings in declaration order.
    pub fn params(&self) -> &[ParamBinding] {
        &self.params
    }

    fn path_param(&self, placeholder: &str) -> Option<&ParamBinding> {
        self.params
            .iter()
            .find(|p| p.location == Location::Path && p.arg == placeholder)
    }
}

/// Builder for [`BindingDescriptor`].
#[derive(Debug, Clone)]
pub struct BindingDescriptorBuilder {
    name: String,
    method: Method,
    path: String,
    const_query: Vec<(String, String)>,
    const_headers: Vec<(String, String)>,
    version_query: Option<String>,
    params: Vec<ParamBinding>,
    payload_format: PayloadFormat,
    payload_wrapper: Option<String>,
}

impl BindingDescriptorBuilder {
    fn param(mut self, arg: &str, location: Location, strategy: Strategy, required: bool) -> Self {
        self.params.push(ParamBinding {
            arg: arg.to_string(),
            location,
            strategy,
            list_style: ListStyle::Indexed,
            required,
        });
        self
    }

    /// Bind a path placeholder, percent-encoded.
    pub fn path(self, arg: &str) -> Self {
        self.param(arg, Location::Path, Strategy::UrlEncoded { skip: Vec::new() }, true)
    }

    /// Bind a path placeholder, percent-encoded except for `skip`.
    pub fn path_keeping(self, arg: &str, skip: &[char]) -> Self {
        self.param(arg, Location::Path, Strategy::UrlEncoded { skip: skip.to_vec() }, true)
    }

    /// Bind a path placeholder verbatim (pre-encoded paths).
    pub fn path_raw(self, arg: &str) -> Self {
        self.param(arg, Location::Path, Strategy::Raw, true)
    }

    /// Bind a placeholder that names part of the endpoint host. The value must
    /// be one DNS label: ASCII letters, digits and inner hyphens.
    pub fn path_host(self, arg: &str) -> Self {
        self.param(arg, Location::Path, Strategy::HostLabel, true)
    }

    /// Optional query parameter; lists expand as `name.1`, `name.2`, ...
    pub fn query(self, arg: &str, name: &str) -> Self {
        self.param(arg, Location::Query(name.to_string()), Strategy::UrlEncoded { skip: Vec::new() }, false)
    }

    /// Required query parameter.
    pub fn required_query(self, arg: &str, name: &str) -> Self {
        self.param(arg, Location::Query(name.to_string()), Strategy::UrlEncoded { skip: Vec::new() }, true)
    }

    /// Optional query parameter whose lists repeat the name.
    pub fn query_repeated(mut self, arg: &str, name: &str) -> Self {
        self = self.query(arg, name);
        if let Some(last) = self.params.last_mut() {
            last.list_style = ListStyle::Repeated;
        }
        self
    }

    /// Optional header.
    pub fn header(self, arg: &str, name: &str) -> Self {
        self.param(arg, Location::Header(name.to_string()), Strategy::Raw, false)
    }

    /// Optional payload field.
    pub fn payload_field(self, arg: &str, field: &str) -> Self {
        self.param(arg, Location::PayloadField(field.to_string()), Strategy::Raw, false)
    }

    /// Required payload field.
    pub fn required_payload_field(self, arg: &str, field: &str) -> Self {
        self.param(arg, Location::PayloadField(field.to_string()), Strategy::Raw, true)
    }

    /// Optional payload root, typically an options object.
    pub fn payload(self, arg: &str) -> Self {
        self.param(arg, Location::Payload, Strategy::OptionsMerge, false)
    }

    /// Query parameter with a fixed value, e.g. `Action=DescribeImages`.
    pub fn const_query(mut self, name: &str, value: &str) -> Self {
        self.const_query.push((name.to_string(), value.to_string()));
        self
    }

    /// Header with a fixed value.
    pub fn const_header(mut self, name: &str, value: &str) -> Self {
        self.const_headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Query parameter carrying the context's API version.
    pub fn version_query(mut self, name: &str) -> Self {
        self.version_query = Some(name.to_string());
        self
    }

    /// Encoding for payload fields.
    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    /// Wrap JSON payload fields in an outer object, e.g. `{"server": {...}}`.
    pub fn payload_wrapper(mut self, name: &str) -> Self {
        self.payload_wrapper = Some(name.to_string());
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// - `InvalidTemplate` when the path template is malformed, a path
    ///   placeholder has no bound argument, or an argument is bound twice
    /// - `AmbiguousPayloadRoot` when more than one argument is the payload root
    pub fn build(self) -> Result<BindingDescriptor, BindingError> {
        let path = UriTemplate::parse(&self.path)?;

        let mut seen: Vec<&str> = Vec::new();
        for param in &self.params {
            if seen.contains(&param.arg.as_str()) {
                return Err(BindingError::InvalidTemplate {
                    template: self.path.clone(),
                    reason: format!("argument '{}' is bound more than once", param.arg),
                });
            }
            seen.push(&param.arg);
        }

        let roots: Vec<String> = self
            .params
            .iter()
            .filter(|p| p.location == Location::Payload)
            .map(|p| p.arg.clone())
            .collect();
        if roots.len() > 1 {
            return Err(BindingError::AmbiguousPayloadRoot(roots));
        }

        let descriptor = BindingDescriptor {
            name: self.name,
            method: self.method,
            path,
            const_query: self.const_query,
            const_headers: self.const_headers,
            version_query: self.version_query,
            params: self.params,
            payload_format: self.payload_format,
            payload_wrapper: self.payload_wrapper,
        };

        for placeholder in descriptor.path.placeholders() {
            if descriptor.path_param(placeholder).is_none() {
                return Err(BindingError::InvalidTemplate {
                    template: descriptor.path.as_str().to_string(),
                    reason: format!("placeholder '{placeholder}' has no bound argument"),
                });
            }
        }

        Ok(descriptor)
    }
}

/// Binds descriptors against one endpoint, API version and set of limits.
#[derive(Debug, Clone)]
pub struct Binder {
    endpoint: String,
    api_version: String,
    limits: PayloadLimits,
    encoder: Option<Arc<dyn PayloadEncoder>>,
}

impl Binder {
    /// Create a binder for an endpoint template and API version.
    pub fn new(endpoint: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: api_version.into(),
            limits: PayloadLimits::UNLIMITED,
            encoder: None,
        }
    }

    /// Set the provider's payload limits.
    pub fn with_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the provider's custom payload encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn PayloadEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Endpoint template.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// API version.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Payload limits.
    pub fn limits(&self) -> &PayloadLimits {
        &self.limits
    }

    /// Check that every placeholder of the endpoint joined with the
    /// descriptor's path has exactly one bound argument.
    pub fn validate(&self, descriptor: &BindingDescriptor) -> Result<(), BindingError> {
        let template = UriTemplate::join(&self.endpoint, descriptor.path.as_str())?;
        for placeholder in template.placeholders() {
            if descriptor.path_param(placeholder).is_none() {
                return Err(BindingError::InvalidTemplate {
                    template: template.as_str().to_string(),
                    reason: format!("placeholder '{placeholder}' has no bound argument"),
                });
            }
        }
        Ok(())
    }

    /// Bind arguments to a request.
    ///
    /// Deterministic: the same descriptor and arguments always yield an equal
    /// request.
    ///
    /// # Errors
    ///
    /// See [`BindingError`].
    pub fn bind(&self, descriptor: &BindingDescriptor, args: &Args) -> Result<Request, BindingError> {
        let template = UriTemplate::join(&self.endpoint, descriptor.path.as_str())?;

        let mut path_values = BTreeMap::new();
        let mut query: Vec<(String, String)> = descriptor.const_query.clone();
        if let Some(name) = &descriptor.version_query {
            query.push((name.clone(), self.api_version.clone()));
        }
        let mut headers: Vec<(String, String)> = descriptor.const_headers.clone();
        let mut fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        let mut root: Option<&ArgValue> = None;

        for param in &descriptor.params {
            let Some(value) = args.get(&param.arg) else {
                if param.required && (param.location != Location::Path || template.has_placeholder(&param.arg)) {
                    return Err(BindingError::MissingArgument(param.arg.clone()));
                }
                continue;
            };

            match &param.location {
                Location::Path => {
                    let text = scalar(param, value)?;
                    let text = match &param.strategy {
                        Strategy::UrlEncoded { skip } => url_encode(&text, skip),
                        Strategy::HostLabel => host_label(param, text)?,
                        Strategy::Raw | Strategy::OptionsMerge => text,
                    };
                    path_values.insert(param.arg.clone(), text);
                }
                Location::Query(name) => expand(param, name, value, &mut query)?,
                Location::Header(name) => expand(param, name, value, &mut headers)?,
                Location::PayloadField(field) => {
                    fields.insert(field.clone(), self.field_value(param, value)?);
                }
                Location::Payload => root = Some(value),
            }
        }

        let expanded = template.expand(&path_values)?;
        let mut uri = Url::parse(&expanded).map_err(|e| BindingError::InvalidUri {
            uri: expanded.clone(),
            reason: e.to_string(),
        })?;
        if !query.is_empty() {
            let mut pairs: Vec<(String, String)> = uri
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.extend(query);
            set_query(&mut uri, &pairs);
        }

        let mut request = Request::new(descriptor.method.clone(), uri);
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        if let Some(payload) = self.payload(descriptor, root, fields)? {
            request = request.with_payload(payload);
        }
        Ok(request)
    }

    fn field_value(&self, param: &ParamBinding, value: &ArgValue) -> Result<serde_json::Value, BindingError> {
        Ok(match value {
            ArgValue::Str(s) => serde_json::Value::String(s.clone()),
            ArgValue::Int(i) => serde_json::Value::from(*i),
            ArgValue::Bool(b) => serde_json::Value::Bool(*b),
            ArgValue::List(items) => serde_json::Value::from(items.clone()),
            ArgValue::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            ArgValue::Json(v) => v.clone(),
            ArgValue::Attachments(files) => {
                self.limits.check_attachments(files)?;
                serde_json::Value::Array(files.iter().map(Attachment::to_json).collect())
            }
            ArgValue::Form(_) | ArgValue::Options(_) | ArgValue::Custom(_) => {
                return Err(BindingError::InvalidArgument {
                    name: param.arg.clone(),
                    expected: "a scalar, list, json or attachments value",
                });
            }
        })
    }

    fn payload(
        &self,
        descriptor: &BindingDescriptor,
        root: Option<&ArgValue>,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> Result<Option<Payload>, BindingError> {
        let ambiguous = |root: &str| {
            let mut names: Vec<String> = descriptor
                .params
                .iter()
                .filter(|p| matches!(p.location, Location::PayloadField(_)))
                .map(|p| p.arg.clone())
                .collect();
            names.insert(0, root.to_string());
            BindingError::AmbiguousPayloadRoot(names)
        };
        let root_name = descriptor
            .params
            .iter()
            .find(|p| p.location == Location::Payload)
            .map(|p| p.arg.as_str())
            .unwrap_or("payload");

        let payload = match root {
            Some(ArgValue::Options(options)) => options.bind_payload(&fields, &self.limits)?,
            Some(ArgValue::Custom(value)) => {
                if !fields.is_empty() {
                    return Err(ambiguous(root_name));
                }
                let encoded = self
                    .encoder
                    .as_ref()
                    .and_then(|encoder| encoder.encode(value.as_ref(), &self.limits));
                match encoded {
                    Some(result) => result?,
                    None => {
                        return Err(BindingError::InvalidArgument {
                            name: root_name.to_string(),
                            expected: "a payload value the provider can encode",
                        });
                    }
                }
            }
            Some(ArgValue::Json(value)) => {
                let mut value = value.clone();
                if !fields.is_empty() {
                    let Some(object) = value.as_object_mut() else {
                        return Err(ambiguous(root_name));
                    };
                    object.extend(fields);
                }
                Payload::json(&self.wrap(descriptor, value))?
            }
            Some(ArgValue::Attachments(files)) => {
                if !fields.is_empty() {
                    return Err(ambiguous(root_name));
                }
                self.limits.check_attachments(files)?;
                let files = serde_json::Value::Array(files.iter().map(Attachment::to_json).collect());
                Payload::json(&self.wrap(descriptor, files))?
            }
            Some(other) if !fields.is_empty() => {
                return Err(BindingError::InvalidArgument {
                    name: root_name.to_string(),
                    expected: match other {
                        ArgValue::Bytes(_) | ArgValue::Str(_) | ArgValue::Form(_) => {
                            "no payload fields alongside a raw payload"
                        }
                        _ => "a payload value",
                    },
                });
            }
            Some(ArgValue::Bytes(bytes)) => Payload::new(bytes.clone(), "application/octet-stream"),
            Some(ArgValue::Str(text)) => Payload::new(text.clone(), "text/plain; charset=utf-8"),
            Some(ArgValue::Form(pairs)) => Payload::form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            Some(_) => {
                return Err(BindingError::InvalidArgument {
                    name: root_name.to_string(),
                    expected: "a payload value, not a scalar or list",
                });
            }
            None if fields.is_empty() => return Ok(None),
            None => match descriptor.payload_format {
                PayloadFormat::Json => {
                    let object = serde_json::Value::Object(fields.into_iter().collect());
                    Payload::json(&self.wrap(descriptor, object))?
                }
                PayloadFormat::Form => {
                    let pairs: Vec<(String, String)> = fields
                        .into_iter()
                        .map(|(k, v)| {
                            let text = match v {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            };
                            (k, text)
                        })
                        .collect();
                    Payload::form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                }
            },
        };
        Ok(Some(payload))
    }

    fn wrap(&self, descriptor: &BindingDescriptor, value: serde_json::Value) -> serde_json::Value {
        match &descriptor.payload_wrapper {
            Some(name) => {
                let mut outer = serde_json::Map::new();
                outer.insert(name.clone(), value);
                serde_json::Value::Object(outer)
            }
            None => value,
        }
    }
}

fn scalar(param: &ParamBinding, value: &ArgValue) -> Result<String, BindingError> {
    value.scalar().ok_or_else(|| BindingError::InvalidArgument {
        name: param.arg.clone(),
        expected: "a string, integer or boolean",
    })
}

fn host_label(param: &ParamBinding, text: String) -> Result<String, BindingError> {
    let valid = !text.is_empty()
        && text.len() <= 63
        && !text.starts_with('-')
        && !text.ends_with('-')
        && text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if valid {
        Ok(text)
    } else {
        Err(BindingError::InvalidArgument {
            name: param.arg.clone(),
            expected: "a DNS label",
        })
    }
}

fn expand(
    param: &ParamBinding,
    name: &str,
    value: &ArgValue,
    out: &mut Vec<(String, String)>,
) -> Result<(), BindingError> {
    match value {
        ArgValue::List(items) => match param.list_style {
            ListStyle::Indexed => {
                for (idx, item) in items.iter().enumerate() {
                    out.push((format!("{name}.{}", idx + 1), item.clone()));
                }
            }
            ListStyle::Repeated => {
                for item in items {
                    out.push((name.to_string(), item.clone()));
                }
            }
        },
        other => out.push((name.to_string(), scalar(param, other)?)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn describe_images() -> BindingDescriptor {
        BindingDescriptor::builder("describeImagesInRegion", Method::GET, "/")
            .const_query("Action", "DescribeImages")
            .version_query("Version")
            .path_host("region")
            .query("imageIds", "ImageId")
            .query("owners", "Owner")
            .build()
            .unwrap()
    }

    fn ec2() -> Binder {
        Binder::new("https://ec2.{region}.amazonaws.com", "2011-05-15")
    }

    #[test]
    fn test_bind_query_api() {
        let request = ec2()
            .bind(
                &describe_images(),
                &Args::new()
                    .with("region", "us-east-1")
                    .with("imageIds", vec!["ami-1", "ami-2"]),
            )
            .unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(
            request.uri().as_str(),
            "https://ec2.us-east-1.amazonaws.com/?Action=DescribeImages&Version=2011-05-15&ImageId.1=ami-1&ImageId.2=ami-2"
        );
        assert!(request.payload().is_none());
    }

    #[test]
    fn test_missing_path_argument() {
        let err = ec2()
            .bind(&describe_images(), &Args::new().with("imageIds", vec!["ami-1"]))
            .unwrap_err();
        assert_eq!(err, BindingError::MissingArgument("region".into()));
    }

    #[rstest]
    #[case::path_and_fragment("attacker.example/x#")]
    #[case::extra_label("us-east-1.attacker")]
    #[case::userinfo("x@attacker")]
    #[case::leading_hyphen("-east")]
    #[case::empty("")]
    fn test_host_label_rejects_foreign_hosts(#[case] region: &str) {
        let err = ec2()
            .bind(&describe_images(), &Args::new().with("region", region))
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::InvalidArgument {
                name: "region".into(),
                expected: "a DNS label",
            }
        );
    }

    #[test]
    fn test_absent_optional_arguments_are_omitted() {
        let request = ec2()
            .bind(&describe_images(), &Args::new().with("region", "eu-west-1"))
            .unwrap();
        assert_eq!(
            request.uri().query(),
            Some("Action=DescribeImages&Version=2011-05-15")
        );
    }

    #[test]
    fn test_path_encoding_strategies() {
        let descriptor = BindingDescriptor::builder("getObject", Method::GET, "/{bucket}/{key}")
            .path("bucket")
            .path_keeping("key", &['/'])
            .header("range", "Range")
            .build()
            .unwrap();
        let binder = Binder::new("https://storage.example.com", "1");

        let request = binder
            .bind(
                &descriptor,
                &Args::new()
                    .with("bucket", "my bucket")
                    .with("key", "photos/june 2011/a*.jpg")
                    .with("range", "bytes=0-9"),
            )
            .unwrap();

        assert_eq!(
            request.uri().as_str(),
            "https://storage.example.com/my%20bucket/photos/june%202011/a%2A.jpg"
        );
        assert_eq!(request.header("range"), Some("bytes=0-9"));
    }

    #[test]
    fn test_unbound_placeholder_is_rejected_at_build() {
        let err = BindingDescriptor::builder("getServer", Method::GET, "/servers/{id}")
            .build()
            .unwrap_err();
        assert_matches!(err, BindingError::InvalidTemplate { reason, .. } if reason.contains("'id'"));
    }

    #[test]
    fn test_endpoint_placeholder_is_validated() {
        let descriptor = BindingDescriptor::builder("listServers", Method::GET, "/servers")
            .build()
            .unwrap();
        let binder = Binder::new("https://{zone}.compute.example.com", "1.1");
        assert_matches!(binder.validate(&descriptor), Err(BindingError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_two_payload_roots_are_ambiguous() {
        let err = BindingDescriptor::builder("put", Method::PUT, "/")
            .payload("body")
            .payload("options")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::AmbiguousPayloadRoot(vec!["body".into(), "options".into()])
        );
    }

    #[test]
    fn test_payload_fields_wrap_into_json() {
        let descriptor = BindingDescriptor::builder("createServer", Method::POST, "/servers")
            .required_payload_field("name", "name")
            .required_payload_field("flavorRef", "flavorRef")
            .payload_wrapper("server")
            .build()
            .unwrap();
        let request = Binder::new("http://localhost:8774/v1.1", "1.1")
            .bind(
                &descriptor,
                &Args::new().with("name", "web-1").with("flavorRef", 2u32),
            )
            .unwrap();

        let payload = request.payload().unwrap();
        assert_eq!(payload.content_type(), "application/json");
        let json: serde_json::Value = serde_json::from_slice(payload.bytes()).unwrap();
        assert_eq!(json, serde_json::json!({"server": {"name": "web-1", "flavorRef": 2}}));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_form_payload_fields() {
        let descriptor = BindingDescriptor::builder("login", Method::POST, "/login")
            .required_payload_field("user", "username")
            .payload_field("remember", "remember")
            .payload_format(PayloadFormat::Form)
            .build()
            .unwrap();
        let request = Binder::new("https://api.example.com", "1")
            .bind(&descriptor, &Args::new().with("user", "a b").with("remember", true))
            .unwrap();

        assert_eq!(&request.payload().unwrap().bytes()[..], b"remember=true&username=a%20b");
    }

    #[test]
    fn test_attachment_root_is_capped() {
        let descriptor = BindingDescriptor::builder("inject", Method::POST, "/files")
            .payload("files")
            .build()
            .unwrap();
        let limits = PayloadLimits {
            max_files: 5,
            ..PayloadLimits::UNLIMITED
        };
        let files: Vec<_> = (0..6).map(|i| Attachment::new(format!("/f{i}"), "x")).collect();

        let err = Binder::new("https://api.example.com", "1")
            .with_limits(limits)
            .bind(&descriptor, &Args::new().with("files", files))
            .unwrap_err();
        assert_matches!(err, BindingError::TooManyEntries { count: 6, limit: 5, .. });
    }

    #[test]
    fn test_custom_payload_without_encoder() {
        let descriptor = BindingDescriptor::builder("upload", Method::PUT, "/blob")
            .payload("blob")
            .build()
            .unwrap();
        let err = Binder::new("https://api.example.com", "1")
            .bind(&descriptor, &Args::new().with("blob", ArgValue::custom(42u8)))
            .unwrap_err();
        assert_matches!(err, BindingError::InvalidArgument { name, .. } if name == "blob");
    }

    #[test]
    fn test_list_in_path_is_rejected() {
        let descriptor = BindingDescriptor::builder("getServer", Method::GET, "/servers/{id}")
            .path("id")
            .build()
            .unwrap();
        let err = Binder::new("https://api.example.com", "1")
            .bind(&descriptor, &Args::new().with("id", vec!["1", "2"]))
            .unwrap_err();
        assert_matches!(err, BindingError::InvalidArgument { .. });
    }

    #[test]
    fn test_repeated_query_lists() {
        let descriptor = BindingDescriptor::builder("list", Method::GET, "/servers")
            .query_repeated("status", "status")
            .build()
            .unwrap();
        let request = Binder::new("https://api.example.com", "1")
            .bind(&descriptor, &Args::new().with("status", vec!["ACTIVE", "BUILD"]))
            .unwrap();
        assert_eq!(request.uri().query(), Some("status=ACTIVE&status=BUILD"));
    }
}
