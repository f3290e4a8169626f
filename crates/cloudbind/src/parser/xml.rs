//! XML tokenizer feeding a [`ParseSession`]
//!
//! Element and attribute names are reduced to their local part, so
//! `ovf:Network` and `Network` dispatch the same way.

use super::{Attributes, BuilderFactory, DomainValue, ParseSession, ResponseParser};
use crate::error::{ParseError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use cloudbind_transport::BodyStream;
use futures::StreamExt;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

fn utf8(bytes: &[u8]) -> std::result::Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ParseError::Encoding(e.to_string()))
}

fn attributes(element: &BytesStart<'_>) -> std::result::Result<Attributes, ParseError> {
    let mut out = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::Malformed(e.to_string()))?;
        let name = utf8(attr.key.local_name().as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        out.push((name, value.into_owned()));
    }
    Ok(out.into_iter().collect())
}

fn map_error(err: quick_xml::Error) -> ParseError {
    match err {
        quick_xml::Error::EndEventMismatch { expected, found } => ParseError::StructureMismatch {
            expected: (!expected.is_empty()).then_some(expected),
            found,
        },
        quick_xml::Error::UnexpectedEof(_) => ParseError::UnexpectedEof { open: 1 },
        quick_xml::Error::NonDecodable(e) => ParseError::Encoding(format!("{e:?}")),
        other => ParseError::Malformed(other.to_string()),
    }
}

/// Tokenize a complete document into a session.
pub fn feed(document: &[u8], session: &mut ParseSession) -> std::result::Result<(), ParseError> {
    let mut reader = Reader::from_reader(document);
    // No reader-level trimming: the session trims each element's joined text
    // and CDATA run once.
    // The session also tracks open elements itself and reports mismatches.
    reader.check_end_names(false);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(map_error)? {
            Event::Start(element) => {
                let name = utf8(element.local_name().as_ref())?;
                session.start_element(&name, &attributes(&element)?)?;
            }
            Event::Empty(element) => {
                let name = utf8(element.local_name().as_ref())?;
                session.start_element(&name, &attributes(&element)?)?;
                session.end_element(&name)?;
            }
            Event::End(element) => {
                let name = utf8(element.local_name().as_ref())?;
                session.end_element(&name)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(map_error)?;
                session.text(&text)?;
            }
            Event::CData(data) => {
                session.text(&utf8(&data.into_inner())?)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Parse an in-memory XML document with a fresh root builder.
pub fn parse_xml(document: &[u8], factory: &dyn BuilderFactory) -> std::result::Result<DomainValue, ParseError> {
    let mut session = ParseSession::new(factory.root());
    feed(document, &mut session)?;
    session.finish()
}

/// [`ResponseParser`] for XML bodies.
///
/// Chunks are buffered as they arrive and tokenized once the body ends.
/// Dropping the future stops reading and discards everything buffered.
#[derive(Clone)]
pub struct XmlParser {
    factory: Arc<dyn BuilderFactory>,
    root: &'static str,
}

impl XmlParser {
    /// Parser using `factory` for root builders.
    pub fn new(root: &'static str, factory: impl BuilderFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            root,
        }
    }

    /// Parser whose root builder is `B::default()`.
    pub fn of<B: super::ElementBuilder + Default + 'static>(root: &'static str) -> Self {
        Self::new(root, super::DefaultFactory::<B>::new())
    }

    /// Document element this parser expects, used in log records.
    pub fn root(&self) -> &'static str {
        self.root
    }
}

impl fmt::Debug for XmlParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlParser").field("root", &self.root).finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseParser for XmlParser {
    async fn parse(&self, mut body: BodyStream) -> Result<DomainValue> {
        let mut document = BytesMut::new();
        while let Some(chunk) = body.next().await {
            document.extend_from_slice(&chunk?);
        }
        trace!(root = self.root, bytes = document.len(), "Parsing XML body");
        Ok(parse_xml(&document, self.factory.as_ref())?)
    }
}
