//! OpenStack Nova (compute API 1.1)
//!
//! JSON in both directions; the tenant token travels in `X-Auth-Token`.

use crate::binder::{Args, Attachment, BindingDescriptor, PayloadBinder, PayloadLimits};
use crate::context::{Operation, OperationTable, OptionalExt, Provider, ProviderContext};
use crate::error::{AuthError, BindingError, ErrorKind, Result};
use crate::filter::{Clock, FilterChain, TokenFilter};
use crate::mapper::{ErrorMapper, Fault, FaultParser};
use crate::parser::{EmptyParser, JsonParser};
use crate::request::Payload;
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// `POST /servers`, args: `name`, `imageRef`, `flavorRef`, `options`.
pub const CREATE_SERVER: &str = "createServer";
/// `GET /servers/{id}`.
pub const GET_SERVER: &str = "getServer";
/// `GET /servers/detail`.
pub const LIST_SERVERS: &str = "listServers";
/// `DELETE /servers/{id}`.
pub const DELETE_SERVER: &str = "deleteServer";

/// Nova provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nova;

impl Nova {
    /// Provider id.
    pub const ID: &'static str = "nova";

    /// Personality files: at most 5, each under 10 KiB with a path under 255
    /// bytes. Metadata: at most 5 entries, keys and values under 255 bytes.
    pub const LIMITS: PayloadLimits = PayloadLimits {
        max_files: 5,
        max_file_bytes: 10 * 1024 - 1,
        max_path_bytes: 254,
        max_metadata_entries: 5,
        max_metadata_key_bytes: 254,
        max_metadata_value_bytes: 254,
    };
}

impl Provider for Nova {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn endpoint(&self) -> &str {
        "http://localhost:8774/v1.1"
    }

    fn api_version(&self) -> &str {
        "1.1"
    }

    fn limits(&self) -> PayloadLimits {
        Self::LIMITS
    }

    fn operations(&self) -> Result<OperationTable> {
        let create = BindingDescriptor::builder(CREATE_SERVER, Method::POST, "/servers")
            .required_payload_field("name", "name")
            .required_payload_field("imageRef", "imageRef")
            .required_payload_field("flavorRef", "flavorRef")
            .payload("options")
            .payload_wrapper("server")
            .const_header("Accept", "application/json")
            .build()?;
        let get = BindingDescriptor::builder(GET_SERVER, Method::GET, "/servers/{id}")
            .path("id")
            .const_header("Accept", "application/json")
            .build()?;
        let list = BindingDescriptor::builder(LIST_SERVERS, Method::GET, "/servers/detail")
            .const_header("Accept", "application/json")
            .build()?;
        let delete = BindingDescriptor::builder(DELETE_SERVER, Method::DELETE, "/servers/{id}")
            .path("id")
            .build()?;

        Ok(OperationTable::new()
            .with(Operation::new(create, JsonParser::<Server>::at("/server")))?
            .with(Operation::new(get, JsonParser::<Server>::at("/server")))?
            .with(Operation::new(list, JsonParser::<Vec<Server>>::at("/servers")))?
            .with(Operation::new(delete, EmptyParser))?)
    }

    fn filters(&self, _clock: Arc<dyn Clock>) -> std::result::Result<FilterChain, AuthError> {
        FilterChain::new(vec![Arc::new(TokenFilter::raw("X-Auth-Token"))], Some(TokenFilter::ID))
    }

    fn error_mapper(&self) -> ErrorMapper {
        ErrorMapper::new()
            .code("itemNotFound", ErrorKind::NotFound)
            .code("unauthorized", ErrorKind::Unauthorized)
            .code("forbidden", ErrorKind::Unauthorized)
            .code("overLimit", ErrorKind::RateLimited)
            .code("conflictingRequest", ErrorKind::Conflict)
            .code("buildInProgress", ErrorKind::Conflict)
            .with_fault_parser(Arc::new(NovaFaultParser))
    }
}

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Running
    Active,
    /// Being created
    Build,
    /// Being rebuilt from an image
    Rebuild,
    /// Suspended
    Suspended,
    /// Being resized
    Resize,
    /// Resize awaiting confirmation
    VerifyResize,
    /// Soft reboot in progress
    Reboot,
    /// Hard reboot in progress
    HardReboot,
    /// Deleted
    Deleted,
    /// Failed
    Error,
    /// Any status this client does not know
    #[default]
    #[serde(other)]
    Unrecognized,
}

/// A reference to an image or flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Resource id
    pub id: String,
}

/// A compute server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Server id
    pub id: String,
    /// Display name
    pub name: String,
    /// Lifecycle state
    #[serde(default)]
    pub status: ServerStatus,
    /// Build progress in percent
    #[serde(default)]
    pub progress: Option<u32>,
    /// Image the server was built from
    #[serde(default)]
    pub image: Option<Reference>,
    /// Flavor the server runs as
    #[serde(default)]
    pub flavor: Option<Reference>,
    /// User metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Public IPv4 address
    #[serde(default, rename = "accessIPv4")]
    pub access_ipv4: Option<String>,
    /// Generated root password, only present on creation
    #[serde(default)]
    pub admin_pass: Option<String>,
    /// Key pair name
    #[serde(default, rename = "key_name")]
    pub key_name: Option<String>,
}

/// Optional settings for `createServer`.
///
/// Bound as the payload root: the required `name`, `imageRef` and `flavorRef`
/// fields and these options are wrapped together in `{"server": {...}}`.
#[derive(Clone, Default)]
pub struct CreateServerOptions {
    files: Vec<Attachment>,
    metadata: BTreeMap<String, String>,
    security_groups: BTreeSet<String>,
    key_name: Option<String>,
    admin_pass: Option<String>,
}

impl CreateServerOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a file into the server's filesystem.
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<bytes::Bytes>) -> Self {
        self.files.push(Attachment::new(path, contents));
        self
    }

    /// Replace the server metadata.
    pub fn with_metadata<K, V>(mut self, metadata: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = metadata.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Link a key pair.
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    /// Set the root password instead of letting the service generate one.
    pub fn with_admin_pass(mut self, admin_pass: impl Into<String>) -> Self {
        self.admin_pass = Some(admin_pass.into());
        self
    }

    /// Run the server in these security groups.
    pub fn security_group_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.security_groups = names.into_iter().map(Into::into).collect();
        self
    }

    /// Security group names.
    pub fn security_groups(&self) -> &BTreeSet<String> {
        &self.security_groups
    }
}

impl fmt::Debug for CreateServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateServerOptions")
            .field("files", &self.files.iter().map(|a| a.path.as_str()).collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .field("security_groups", &self.security_groups)
            .field("key_name", &self.key_name)
            .field("admin_pass", &self.admin_pass.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl PayloadBinder for CreateServerOptions {
    fn bind_payload(
        &self,
        fields: &BTreeMap<String, serde_json::Value>,
        limits: &PayloadLimits,
    ) -> std::result::Result<Payload, BindingError> {
        limits.check_attachments(&self.files)?;
        limits.check_metadata(&self.metadata)?;
        if self.security_groups.iter().any(|name| name.trim().is_empty()) {
            return Err(BindingError::InvalidArgument {
                name: "security_groups".to_string(),
                expected: "non-empty security group names",
            });
        }

        let mut server: serde_json::Map<String, serde_json::Value> =
            fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for required in ["name", "imageRef", "flavorRef"] {
            if !server.contains_key(required) {
                return Err(BindingError::MissingArgument(required.to_string()));
            }
        }

        if !self.metadata.is_empty() {
            server.insert("metadata".into(), serde_json::json!(self.metadata));
        }
        if !self.files.is_empty() {
            let files = self.files.iter().map(Attachment::to_json).collect();
            server.insert("personality".into(), serde_json::Value::Array(files));
        }
        if let Some(key_name) = &self.key_name {
            server.insert("key_name".into(), key_name.clone().into());
        }
        if !self.security_groups.is_empty() {
            let groups = self
                .security_groups
                .iter()
                .map(|name| serde_json::json!({ "name": name }))
                .collect();
            server.insert("security_groups".into(), serde_json::Value::Array(groups));
        }
        if let Some(admin_pass) = &self.admin_pass {
            server.insert("adminPass".into(), admin_pass.clone().into());
        }

        let mut root = serde_json::Map::new();
        root.insert("server".into(), serde_json::Value::Object(server));
        Payload::json(&serde_json::Value::Object(root))
    }
}

/// `{"itemNotFound": {"message": "...", "code": 404}}`
#[derive(Debug, Clone, Copy, Default)]
pub struct NovaFaultParser;

impl FaultParser for NovaFaultParser {
    fn parse_fault(&self, body: &[u8]) -> Option<Fault> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        let (code, detail) = value.as_object()?.iter().find(|(_, v)| v.is_object())?;
        Some(Fault {
            code: code.clone(),
            message: detail
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            request_id: None,
        })
    }
}

/// Fetch a server; `None` when it does not exist.
pub async fn get_server(context: &ProviderContext, id: &str) -> Result<Option<Server>> {
    context
        .call::<Server>(GET_SERVER, &Args::new().with("id", id))
        .await
        .or_absent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{ArgValue, Binder};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn bind(args: &Args) -> std::result::Result<crate::request::Request, BindingError> {
        let operations = Nova.operations().unwrap();
        let binder = Binder::new(Nova.endpoint(), Nova.api_version()).with_limits(Nova::LIMITS);
        binder.bind(operations.get(CREATE_SERVER).unwrap().descriptor(), args)
    }

    fn base() -> Args {
        Args::new()
            .with("name", "web")
            .with("imageRef", "img-1")
            .with("flavorRef", "2")
    }

    fn body(request: &crate::request::Request) -> serde_json::Value {
        serde_json::from_slice(request.payload().unwrap().bytes()).unwrap()
    }

    #[test]
    fn test_create_server_without_options() {
        let request = bind(&base()).unwrap();
        assert_eq!(request.uri().as_str(), "http://localhost:8774/v1.1/servers");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(
            body(&request),
            serde_json::json!({"server": {"name": "web", "imageRef": "img-1", "flavorRef": "2"}})
        );
    }

    #[test]
    fn test_create_server_with_options() {
        let options = CreateServerOptions::new()
            .with_file("/etc/motd", &b"hello"[..])
            .with_metadata([("role", "web")])
            .with_key_name("ops")
            .security_group_names(["default", "web"])
            .with_admin_pass("hunter2");
        let request = bind(&base().with("options", ArgValue::options(options))).unwrap();

        assert_eq!(
            body(&request),
            serde_json::json!({"server": {
                "name": "web",
                "imageRef": "img-1",
                "flavorRef": "2",
                "metadata": {"role": "web"},
                "personality": [{"path": "/etc/motd", "contents": "aGVsbG8="}],
                "key_name": "ops",
                "security_groups": [{"name": "default"}, {"name": "web"}],
                "adminPass": "hunter2",
            }})
        );
    }

    #[test]
    fn test_six_files_exceed_cap() {
        let options = (0..6).fold(CreateServerOptions::new(), |o, i| o.with_file(format!("/f{i}"), &b"x"[..]));
        let err = bind(&base().with("options", ArgValue::options(options))).unwrap_err();
        assert_eq!(
            err,
            BindingError::TooManyEntries {
                kind: "file",
                count: 6,
                limit: 5
            }
        );
    }

    #[test]
    fn test_metadata_key_of_255_bytes_fails() {
        let options = CreateServerOptions::new().with_metadata([("k".repeat(255), "v")]);
        let err = bind(&base().with("options", ArgValue::options(options))).unwrap_err();
        assert_matches!(err, BindingError::PayloadTooLarge { size: 255, limit: 254, .. });

        let options = CreateServerOptions::new().with_metadata([("k".repeat(254), "v")]);
        assert!(bind(&base().with("options", ArgValue::options(options))).is_ok());
    }

    #[test]
    fn test_file_of_10_kib_fails() {
        let options = CreateServerOptions::new().with_file("/big", vec![0u8; 10 * 1024]);
        let err = bind(&base().with("options", ArgValue::options(options))).unwrap_err();
        assert_matches!(err, BindingError::PayloadTooLarge { .. });
    }

    #[test]
    fn test_empty_security_group_rejected() {
        let options = CreateServerOptions::new().security_group_names([""]);
        let err = bind(&base().with("options", ArgValue::options(options))).unwrap_err();
        assert_matches!(err, BindingError::InvalidArgument { .. });
    }

    #[test]
    fn test_missing_flavor() {
        let err = bind(&Args::new().with("name", "web").with("imageRef", "img-1")).unwrap_err();
        assert_eq!(err, BindingError::MissingArgument("flavorRef".into()));
    }

    #[test]
    fn test_options_debug_redacts_admin_pass() {
        let options = CreateServerOptions::new().with_admin_pass("hunter2");
        assert!(!format!("{options:?}").contains("hunter2"));
    }

    #[test]
    fn test_server_decoding() {
        let doc = br#"{"server": {"id": "52415800-8b69-11e0-9b19-734f565bc83b", "name": "web",
            "status": "BUILD", "progress": 60, "image": {"id": "img-1"}, "flavor": {"id": "2"},
            "metadata": {"role": "web"}, "accessIPv4": "67.23.10.138", "hostId": "abc"}}"#;
        let server = JsonParser::<Server>::at("/server").decode(doc).unwrap();
        assert_eq!(server.status, ServerStatus::Build);
        assert_eq!(server.progress, Some(60));
        assert_eq!(server.flavor, Some(Reference { id: "2".into() }));
        assert_eq!(server.access_ipv4.as_deref(), Some("67.23.10.138"));

        let doc = br#"{"server": {"id": "1", "name": "x", "status": "SHELVED"}}"#;
        let server = JsonParser::<Server>::at("/server").decode(doc).unwrap();
        assert_eq!(server.status, ServerStatus::Unrecognized);
    }

    #[test]
    fn test_fault_parser_and_codes() {
        let body = br#"{"itemNotFound": {"message": "Server not found", "code": 404}}"#;
        let fault = NovaFaultParser.parse_fault(body).unwrap();
        assert_eq!(fault.code, "itemNotFound");
        assert_eq!(fault.message, "Server not found");

        let err = Nova.error_mapper().classify_body(404, body);
        assert_eq!(err.kind, ErrorKind::NotFound);

        let limited = Nova
            .error_mapper()
            .classify_body(413, br#"{"overLimit": {"message": "slow down", "code": 413}}"#);
        assert_eq!(limited.kind, ErrorKind::RateLimited);
        assert!(limited.retry_hint);

        assert!(NovaFaultParser.parse_fault(b"<html>").is_none());
    }
}
