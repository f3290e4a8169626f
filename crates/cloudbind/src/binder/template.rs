//! URI templates with `{name}` placeholders

use crate::error::BindingError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed URI template such as `/servers/{id}/metadata`.
///
/// Templates are parsed once when descriptors are built; expansion only
/// substitutes already-encoded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Fails on unbalanced braces or empty placeholder names.
    pub fn parse(raw: &str) -> Result<Self, BindingError> {
        let invalid = |reason: &str| BindingError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(invalid("nested '{'")),
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(invalid("unterminated placeholder"));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                '}' => return Err(invalid("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Template text as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance (repeats included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Check if the template names a placeholder.
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders().any(|p| p == name)
    }

    /// Substitute already-encoded values.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` for the first placeholder without a value.
    pub fn expand(&self, values: &BTreeMap<String, String>) -> Result<String, BindingError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| BindingError::MissingArgument(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Join an endpoint template and a path template into one template.
    pub fn join(endpoint: &str, path: &str) -> Result<Self, BindingError> {
        let endpoint = endpoint.trim_end_matches('/');
        let joined = if path.is_empty() {
            format!("{endpoint}/")
        } else if path.starts_with('/') {
            format!("{endpoint}{path}")
        } else {
            format!("{endpoint}/{path}")
        };
        Self::parse(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_and_expand() {
        let template = UriTemplate::parse("/servers/{id}/metadata/{key}").unwrap();
        assert_eq!(template.placeholders().collect::<Vec<_>>(), vec!["id", "key"]);

        let values = BTreeMap::from([
            ("id".to_string(), "1234".to_string()),
            ("key".to_string(), "env".to_string()),
        ]);
        assert_eq!(template.expand(&values).unwrap(), "/servers/1234/metadata/env");
    }

    #[test]
    fn test_missing_value() {
        let template = UriTemplate::parse("/servers/{id}").unwrap();
        assert_matches!(
            template.expand(&BTreeMap::new()),
            Err(BindingError::MissingArgument(name)) if name == "id"
        );
    }

    #[test]
    fn test_invalid_templates() {
        for raw in ["/a/{id", "/a/id}", "/a/{}", "/a/{{id}}"] {
            assert_matches!(
                UriTemplate::parse(raw),
                Err(BindingError::InvalidTemplate { .. }),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_join_endpoint_and_path() {
        let template = UriTemplate::join("https://ec2.{region}.amazonaws.com/", "/").unwrap();
        assert_eq!(template.as_str(), "https://ec2.{region}.amazonaws.com/");
        assert!(template.has_placeholder("region"));

        let template = UriTemplate::join("http://localhost:8774/v1.1", "servers/{id}").unwrap();
        assert_eq!(template.as_str(), "http://localhost:8774/v1.1/servers/{id}");
    }
}
