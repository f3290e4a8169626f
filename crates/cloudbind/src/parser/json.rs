//! JSON response decoding with serde

use super::{DomainValue, ResponseParser};
use crate::error::{ParseError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use cloudbind_transport::BodyStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

/// Decodes a JSON body into `T`, optionally from a nested member.
///
/// ```ignore
/// // {"server": {...}} -> Server
/// let parser = JsonParser::<Server>::at("/server");
/// ```
pub struct JsonParser<T> {
    pointer: Option<&'static str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    /// Decode the whole document.
    pub fn new() -> Self {
        Self {
            pointer: None,
            _marker: PhantomData,
        }
    }

    /// Decode the member at a JSON pointer such as `/servers`.
    pub fn at(pointer: &'static str) -> Self {
        Self {
            pointer: Some(pointer),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonParser<T> {
    fn clone(&self) -> Self {
        Self {
            pointer: self.pointer,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonParser")
            .field("type", &type_name::<T>())
            .field("pointer", &self.pointer)
            .finish()
    }
}

impl<T: DeserializeOwned> JsonParser<T> {
    /// Decode an in-memory document.
    pub fn decode(&self, document: &[u8]) -> std::result::Result<T, ParseError> {
        let malformed = |e: serde_json::Error| ParseError::Malformed(e.to_string());
        match self.pointer {
            None => serde_json::from_slice(document).map_err(malformed),
            Some(pointer) => {
                let mut root: serde_json::Value = serde_json::from_slice(document).map_err(malformed)?;
                let member = root
                    .pointer_mut(pointer)
                    .map(serde_json::Value::take)
                    .ok_or_else(|| ParseError::InvalidValue {
                        field: pointer.to_string(),
                        reason: "member is missing".to_string(),
                    })?;
                serde_json::from_value(member).map_err(|e| ParseError::InvalidValue {
                    field: pointer.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl<T> ResponseParser for JsonParser<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn parse(&self, mut body: BodyStream) -> Result<DomainValue> {
        let mut document = BytesMut::new();
        while let Some(chunk) = body.next().await {
            document.extend_from_slice(&chunk?);
        }
        Ok(DomainValue::new(self.decode(&document)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Flavor {
        id: u32,
        name: String,
    }

    #[test]
    fn test_decode_nested_member() {
        let parser = JsonParser::<Vec<Flavor>>::at("/flavors");
        let flavors = parser
            .decode(br#"{"flavors": [{"id": 1, "name": "m1.tiny"}, {"id": 2, "name": "m1.small"}]}"#)
            .unwrap();
        assert_eq!(flavors[1], Flavor { id: 2, name: "m1.small".into() });
    }

    #[test]
    fn test_missing_member() {
        let parser = JsonParser::<Flavor>::at("/flavor");
        assert_matches!(
            parser.decode(br#"{"server": {}}"#),
            Err(ParseError::InvalidValue { field, .. }) if field == "/flavor"
        );
    }

    #[test]
    fn test_malformed_json() {
        let parser = JsonParser::<Flavor>::new();
        assert_matches!(parser.decode(b"{\"id\": 1,"), Err(ParseError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_parse_body_stream() {
        let body: BodyStream = Box::pin(futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(br#"{"id": 3, "#)),
            Ok(bytes::Bytes::from_static(br#""name": "m1.medium"}"#)),
        ]));
        let value = JsonParser::<Flavor>::new().parse(body).await.unwrap();
        assert_eq!(value.downcast::<Flavor>().unwrap().id, 3);
    }
}
