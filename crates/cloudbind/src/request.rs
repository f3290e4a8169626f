//! Immutable request model
//!
//! A [`Request`] is produced by the binder and then threaded through the
//! filter chain. Nothing mutates a request in place: every "change" consumes
//! the value and returns a new one, so a request handed to a filter can never
//! be observed half-decorated by anyone else.

use crate::error::BindingError;
use crate::binder::encode::url_encode;
use bytes::Bytes;
use cloudbind_transport::WireRequest;
use http::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Ordered multi-valued header list with case-insensitive lookup.
///
/// Insertion order is preserved because it is the order sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Set a header, replacing every existing value for the same name.
    ///
    /// The new value takes the position of the first value it replaces, so
    /// re-applying a filter does not reorder the wire headers.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => {
                self.entries[idx] = (name.clone(), value);
                let mut seen = 0usize;
                self.entries.retain(|(k, _)| {
                    if k.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove every value for a name. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// First value for a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for a name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterate over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Request body together with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Bytes,
    content_type: String,
}

impl Payload {
    /// Create a payload from raw bytes.
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Serialize a JSON document.
    pub fn json(value: &serde_json::Value) -> Result<Self, BindingError> {
        let bytes = serde_json::to_vec(value).map_err(|e| BindingError::Encoding(e.to_string()))?;
        Ok(Self::new(bytes, "application/json"))
    }

    /// Encode name/value pairs as `application/x-www-form-urlencoded`.
    ///
    /// Pairs keep their order; names and values use the same RFC 3986
    /// encoding as query strings.
    pub fn form<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let body = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", url_encode(k, &[]), url_encode(v, &[])))
            .collect::<Vec<_>>()
            .join("&");
        Self::new(body, "application/x-www-form-urlencoded")
    }

    /// Body bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Declared content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex SHA-256 of the body.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// A bound request: method, absolute URI, ordered headers and an optional
/// payload, plus the identities of the filters already applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    uri: Url,
    headers: Headers,
    payload: Option<Payload>,
    filters: Vec<&'static str>,
}

impl Request {
    /// Create a request with no headers and no payload.
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: Headers::new(),
            payload: None,
            filters: Vec::new(),
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute URI including the query string.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Header list.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Payload, if any.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Identities of the filters applied so far, in application order.
    pub fn filters(&self) -> &[&'static str] {
        &self.filters
    }

    /// Check if a filter has already been applied.
    pub fn has_filter(&self, id: &str) -> bool {
        self.filters.iter().any(|f| *f == id)
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set a header, replacing existing values.
    pub fn with_replaced_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Drop every value of a header.
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Attach a payload and declare its content type.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.headers.set("Content-Type", payload.content_type().to_string());
        self.payload = Some(payload);
        self
    }

    /// Decoded query pairs in wire order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Append a query parameter.
    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        let mut pairs = self.query_pairs();
        pairs.push((name.to_string(), value.to_string()));
        set_query(&mut self.uri, &pairs);
        self
    }

    /// Set a query parameter, replacing existing values in place.
    pub fn with_replaced_query_param(mut self, name: &str, value: &str) -> Self {
        let mut pairs = self.query_pairs();
        match pairs.iter().position(|(k, _)| k == name) {
            Some(idx) => {
                pairs[idx].1 = value.to_string();
                let mut seen = 0usize;
                pairs.retain(|(k, _)| {
                    if k == name {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => pairs.push((name.to_string(), value.to_string())),
        }
        set_query(&mut self.uri, &pairs);
        self
    }

    /// Drop every value of a query parameter.
    pub fn without_query_param(mut self, name: &str) -> Self {
        let mut pairs = self.query_pairs();
        pairs.retain(|(k, _)| k != name);
        set_query(&mut self.uri, &pairs);
        self
    }

    /// Record that a filter has been applied. Recording twice is a no-op.
    pub fn mark_filter(mut self, id: &'static str) -> Self {
        if !self.has_filter(id) {
            self.filters.push(id);
        }
        self
    }

    /// Path plus query pairs sorted by encoded name then value, the form
    /// request signers canonicalise over.
    pub fn path_and_sorted_query(&self, exclude: Option<&str>) -> String {
        let mut pairs: Vec<(String, String)> = self
            .query_pairs()
            .into_iter()
            .filter(|(k, _)| Some(k.as_str()) != exclude)
            .map(|(k, v)| (url_encode(&k, &[]), url_encode(&v, &[])))
            .collect();
        pairs.sort();

        let path = match self.uri.path() {
            "" => "/",
            p => p,
        };
        if pairs.is_empty() {
            return path.to_string();
        }
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{query}")
    }

    /// Convert into the transport's wire form.
    pub fn to_wire(&self) -> WireRequest {
        let mut wire = WireRequest::new(self.method.clone(), self.uri.clone());
        for (name, value) in self.headers.iter() {
            wire = wire.with_header(name, value);
        }
        if let Some(payload) = &self.payload {
            wire = wire.with_body(payload.bytes().clone());
        }
        wire
    }
}

/// Rewrite the query string from decoded pairs using RFC 3986 encoding.
pub(crate) fn set_query(uri: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        uri.set_query(None);
        return;
    }
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", url_encode(k, &[]), url_encode(v, &[])))
        .collect::<Vec<_>>()
        .join("&");
    uri.set_query(Some(&query));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> Request {
        Request::new(
            Method::GET,
            Url::parse("https://ec2.us-east-1.amazonaws.com/?Action=DescribeImages").unwrap(),
        )
    }

    #[test]
    fn test_headers_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.append("Accept", "application/xml");
        headers.append("X-Trace", "a");
        headers.append("x-trace", "b");
        headers.append("Host", "example.com");

        headers.set("X-TRACE", "c");

        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("Accept", "application/xml"),
                ("X-TRACE", "c"),
                ("Host", "example.com")
            ]
        );
    }

    #[test]
    fn test_headers_multi_value() {
        let mut headers = Headers::new();
        headers.append("Via", "1.1 a");
        headers.append("via", "1.1 b");
        assert_eq!(headers.get_all("VIA").collect::<Vec<_>>(), vec!["1.1 a", "1.1 b"]);
        assert!(headers.remove("Via"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_query_param_replacement() {
        let req = request()
            .with_query_param("Signature", "old")
            .with_query_param("ImageId.1", "ami-1")
            .with_replaced_query_param("Signature", "new");

        assert_eq!(
            req.uri().query(),
            Some("Action=DescribeImages&Signature=new&ImageId.1=ami-1")
        );
    }

    #[test]
    fn test_path_and_sorted_query() {
        let req = request()
            .with_query_param("Version", "2011-05-15")
            .with_query_param("ImageId.1", "ami 1")
            .with_query_param("Signature", "xyz");

        assert_eq!(
            req.path_and_sorted_query(Some("Signature")),
            "/?Action=DescribeImages&ImageId.1=ami%201&Version=2011-05-15"
        );
    }

    #[test]
    fn test_payload_sets_content_type() {
        let req = request().with_payload(Payload::new("{}", "application/json"));
        assert_eq!(req.header("content-type"), Some("application/json"));

        let wire = req.to_wire();
        assert_eq!(wire.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(wire.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_mark_filter_is_idempotent() {
        let req = request().mark_filter("timestamp").mark_filter("timestamp");
        assert_eq!(req.filters(), &["timestamp"]);
        assert!(req.has_filter("timestamp"));
    }

    #[test]
    fn test_form_payload_encoding() {
        let payload = Payload::form([("Action", "RunInstances"), ("UserData", "a b*c")]);
        assert_eq!(&payload.bytes()[..], b"Action=RunInstances&UserData=a%20b%2Ac");
        assert_eq!(payload.content_type(), "application/x-www-form-urlencoded");
    }
}
