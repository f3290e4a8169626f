//! Streaming response parser
//!
//! A [`ParseSession`] is a push state machine fed with structural events
//! (element start with attributes, text, element end). It keeps an explicit
//! stack of uniquely-owned [`ElementBuilder`]s:
//!
//! - **start**: if the top builder owns a nested section with this name, a
//!   child builder is pushed and receives the element's attributes; otherwise
//!   the attributes go to the top builder.
//! - **text**: appended to the top frame's pending text.
//! - **end**: if it closes the element the top builder was opened for, the
//!   builder is finalised, attached to its parent by element name, reset, and
//!   kept by the parent for the next sibling of the same name. Any other
//!   close is forwarded to the top builder together with the pending text.
//!
//! The stack is never empty and holds exactly the root builder once the
//! document is complete.

pub mod json;
pub mod slot;
pub mod xml;

pub use json::JsonParser;
pub use slot::{Cardinality, Slot};
pub use xml::{XmlParser, parse_xml};

use crate::error::{ParseError, Result};
use async_trait::async_trait;
use cloudbind_transport::BodyStream;
use futures::StreamExt;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A decoded value whose concrete type is known to the operation that
/// produced it.
pub struct DomainValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl DomainValue {
    /// Wrap a value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check the wrapped type.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Recover the concrete value, or get `self` back on a type mismatch.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_name }),
        }
    }

    /// Recover the concrete value of a child attached under `field`.
    pub fn into_field<T: Any>(self, field: &str) -> std::result::Result<T, ParseError> {
        self.downcast::<T>().map_err(|other| ParseError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected {}, got {}", type_name::<T>(), other.type_name()),
        })
    }
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainValue").field("type", &self.type_name).finish()
    }
}

/// Attributes of one element, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// No attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Value of an attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Iterate over attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resettable accumulator for one element and its content.
///
/// Unknown names should simply be ignored; every method except
/// [`finish`](ElementBuilder::finish) and [`reset`](ElementBuilder::reset) has
/// a no-op default.
pub trait ElementBuilder: Send {
    /// Builder for a nested section, or `None` if `name` is not one.
    ///
    /// Once a builder has been handed out for `name`, later elements of the
    /// same name under the same parent reuse it without asking again, so a
    /// name must mean the same section wherever it appears in this element.
    fn child_builder(&self, _name: &str) -> Option<Box<dyn ElementBuilder>> {
        None
    }

    /// An element opened; for a freshly pushed builder this is its own element.
    fn start_element(&mut self, _name: &str, _attributes: &Attributes) {}

    /// An element closed with its trimmed text.
    fn end_element(&mut self, _name: &str, _text: &str) -> std::result::Result<(), ParseError> {
        Ok(())
    }

    /// A nested section finished with `value`.
    fn attach(&mut self, _name: &str, _value: DomainValue) -> std::result::Result<(), ParseError> {
        Ok(())
    }

    /// Produce the value built so far.
    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError>;

    /// Return to a blank state.
    fn reset(&mut self);
}

/// Creates root builders; must be callable from concurrent sessions.
pub trait BuilderFactory: Send + Sync {
    /// A fresh root builder.
    fn root(&self) -> Box<dyn ElementBuilder>;
}

impl<F> BuilderFactory for F
where
    F: Fn() -> Box<dyn ElementBuilder> + Send + Sync,
{
    fn root(&self) -> Box<dyn ElementBuilder> {
        self()
    }
}

/// Factory for builders that start from `Default`.
pub struct DefaultFactory<B>(PhantomData<fn() -> B>);

impl<B> DefaultFactory<B> {
    /// Create the factory.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B> Default for DefaultFactory<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ElementBuilder + Default + 'static> BuilderFactory for DefaultFactory<B> {
    fn root(&self) -> Box<dyn ElementBuilder> {
        Box::new(B::default())
    }
}

struct Frame {
    builder: Box<dyn ElementBuilder>,
    name: String,
    depth: usize,
    text: String,
    spare: HashMap<String, Box<dyn ElementBuilder>>,
}

impl Frame {
    fn new(builder: Box<dyn ElementBuilder>, name: &str, depth: usize) -> Self {
        Self {
            builder,
            name: name.to_string(),
            depth,
            text: String::new(),
            spare: HashMap::new(),
        }
    }
}

/// Parse state for one document.
pub struct ParseSession {
    frames: Vec<Frame>,
    open: Vec<String>,
}

impl ParseSession {
    /// Start a session with a root builder.
    pub fn new(root: Box<dyn ElementBuilder>) -> Self {
        Self {
            frames: vec![Frame::new(root, "", 0)],
            open: Vec::new(),
        }
    }

    /// Number of builders on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&mut self) -> std::result::Result<&mut Frame, ParseError> {
        self.frames
            .last_mut()
            .ok_or_else(|| ParseError::Malformed("parse stack is empty".to_string()))
    }

    /// Handle an element start.
    pub fn start_element(&mut self, name: &str, attributes: &Attributes) -> std::result::Result<(), ParseError> {
        self.open.push(name.to_string());
        let depth = self.open.len();

        let top = self.top()?;
        // Character data ahead of a nested element is layout, not content.
        top.text.clear();
        let child = match top.spare.remove(name) {
            Some(reused) => Some(reused),
            None => top.builder.child_builder(name),
        };

        match child {
            Some(mut builder) => {
                builder.start_element(name, attributes);
                self.frames.push(Frame::new(builder, name, depth));
            }
            None => top.builder.start_element(name, attributes),
        }
        Ok(())
    }

    /// Handle character data.
    pub fn text(&mut self, text: &str) -> std::result::Result<(), ParseError> {
        self.top()?.text.push_str(text);
        Ok(())
    }

    /// Handle an element end.
    ///
    /// # Errors
    ///
    /// `StructureMismatch` when `name` is not the innermost open element.
    pub fn end_element(&mut self, name: &str) -> std::result::Result<(), ParseError> {
        if self.open.last().map(String::as_str) != Some(name) {
            return Err(ParseError::StructureMismatch {
                expected: self.open.last().cloned(),
                found: name.to_string(),
            });
        }
        let depth = self.open.len();
        self.open.pop();

        let closes_top = self.frames.len() > 1 && self.top()?.depth == depth;
        if !closes_top {
            let top = self.top()?;
            let text = std::mem::take(&mut top.text);
            return top.builder.end_element(name, text.trim());
        }

        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| ParseError::Malformed("parse stack is empty".to_string()))?;
        let text = std::mem::take(&mut frame.text);
        frame.builder.end_element(name, text.trim())?;
        let value = frame.builder.finish()?;
        frame.builder.reset();

        let parent = self.top()?;
        parent.text.clear();
        parent.builder.attach(&frame.name, value)?;
        parent.spare.insert(frame.name, frame.builder);
        Ok(())
    }

    /// Finish the document and return the root value.
    ///
    /// # Errors
    ///
    /// `UnexpectedEof` when elements are still open.
    pub fn finish(mut self) -> std::result::Result<DomainValue, ParseError> {
        if !self.open.is_empty() || self.frames.len() != 1 {
            return Err(ParseError::UnexpectedEof { open: self.open.len() });
        }
        self.top()?.builder.finish()
    }
}

impl fmt::Debug for ParseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseSession")
            .field("open", &self.open)
            .field("builders", &self.frames.iter().map(|fr| fr.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

/// Decodes a success response body for one operation.
#[async_trait]
pub trait ResponseParser: Send + Sync + fmt::Debug {
    /// Consume the body and produce the operation's value.
    ///
    /// Body read failures surface as transport failures, decode failures as
    /// [`ParseError`]s.
    async fn parse(&self, body: BodyStream) -> Result<DomainValue>;
}

/// Drains the body and yields `()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyParser;

#[async_trait]
impl ResponseParser for EmptyParser {
    async fn parse(&self, mut body: BodyStream) -> Result<DomainValue> {
        while let Some(chunk) = body.next().await {
            chunk?;
        }
        Ok(DomainValue::new(()))
    }
}
