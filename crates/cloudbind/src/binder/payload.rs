//! Payload objects, provider payload limits and the payload extension traits

use crate::error::BindingError;
use crate::request::Payload;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Provider-declared caps on payload content.
///
/// Byte limits are inclusive maxima. A provider that requires keys "under 255
/// bytes" declares `254`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Maximum number of file attachments
    pub max_files: usize,
    /// Maximum size of one attachment's contents
    pub max_file_bytes: usize,
    /// Maximum length of an attachment path
    pub max_path_bytes: usize,
    /// Maximum number of metadata entries
    pub max_metadata_entries: usize,
    /// Maximum length of a metadata key
    pub max_metadata_key_bytes: usize,
    /// Maximum length of a metadata value
    pub max_metadata_value_bytes: usize,
}

impl PayloadLimits {
    /// No caps at all.
    pub const UNLIMITED: PayloadLimits = PayloadLimits {
        max_files: usize::MAX,
        max_file_bytes: usize::MAX,
        max_path_bytes: usize::MAX,
        max_metadata_entries: usize::MAX,
        max_metadata_key_bytes: usize::MAX,
        max_metadata_value_bytes: usize::MAX,
    };

    /// Check a set of attachments against the file caps.
    ///
    /// # Errors
    ///
    /// `TooManyEntries` when there are too many files, `PayloadTooLarge` for
    /// the first oversized path or body.
    pub fn check_attachments(&self, files: &[Attachment]) -> Result<(), BindingError> {
        if files.len() > self.max_files {
            return Err(BindingError::TooManyEntries {
                kind: "file",
                count: files.len(),
                limit: self.max_files,
            });
        }
        for file in files {
            if file.path.len() > self.max_path_bytes {
                return Err(BindingError::PayloadTooLarge {
                    name: format!("path of file '{}'", file.path),
                    size: file.path.len(),
                    limit: self.max_path_bytes,
                });
            }
            if file.contents.len() > self.max_file_bytes {
                return Err(BindingError::PayloadTooLarge {
                    name: format!("file '{}'", file.path),
                    size: file.contents.len(),
                    limit: self.max_file_bytes,
                });
            }
        }
        Ok(())
    }

    /// Check metadata against the entry and key/value caps.
    pub fn check_metadata(&self, metadata: &BTreeMap<String, String>) -> Result<(), BindingError> {
        if metadata.len() > self.max_metadata_entries {
            return Err(BindingError::TooManyEntries {
                kind: "metadata",
                count: metadata.len(),
                limit: self.max_metadata_entries,
            });
        }
        for (key, value) in metadata {
            if key.len() > self.max_metadata_key_bytes {
                return Err(BindingError::PayloadTooLarge {
                    name: "metadata key".to_string(),
                    size: key.len(),
                    limit: self.max_metadata_key_bytes,
                });
            }
            if value.len() > self.max_metadata_value_bytes {
                return Err(BindingError::PayloadTooLarge {
                    name: format!("metadata value for '{key}'"),
                    size: value.len(),
                    limit: self.max_metadata_value_bytes,
                });
            }
        }
        Ok(())
    }
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

/// A file injected into the payload, e.g. server personality files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Destination path
    pub path: String,
    /// Raw contents
    pub contents: Bytes,
}

impl Attachment {
    /// Create an attachment.
    pub fn new(path: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// JSON form: `{"path": ..., "contents": <base64>}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "contents": STANDARD.encode(&self.contents),
        })
    }
}

/// An options object that contributes its own fields to the payload root.
///
/// `fields` are the values bound to payload fields of the same operation, in
/// name order. Implementations validate against `limits` before encoding.
pub trait PayloadBinder: Send + Sync + fmt::Debug {
    /// Build the payload.
    fn bind_payload(
        &self,
        fields: &BTreeMap<String, serde_json::Value>,
        limits: &PayloadLimits,
    ) -> Result<Payload, BindingError>;
}

/// Provider hook for payload values the binder does not know how to encode.
pub trait PayloadEncoder: Send + Sync + fmt::Debug {
    /// Encode a custom payload value.
    ///
    /// Return `None` when the value is not one this encoder understands.
    fn encode(
        &self,
        value: &(dyn Any + Send + Sync),
        limits: &PayloadLimits,
    ) -> Option<Result<Payload, BindingError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn limits() -> PayloadLimits {
        PayloadLimits {
            max_files: 5,
            max_file_bytes: 10 * 1024 - 1,
            max_path_bytes: 254,
            max_metadata_entries: 5,
            max_metadata_key_bytes: 254,
            max_metadata_value_bytes: 254,
        }
    }

    #[test]
    fn test_attachment_count_cap() {
        let files: Vec<_> = (0..6)
            .map(|i| Attachment::new(format!("/etc/file{i}"), "x"))
            .collect();
        assert_matches!(
            limits().check_attachments(&files),
            Err(BindingError::TooManyEntries { kind: "file", count: 6, limit: 5 })
        );
        assert!(limits().check_attachments(&files[..5]).is_ok());
    }

    #[test]
    fn test_attachment_size_cap() {
        let files = vec![Attachment::new("/etc/motd", vec![b'a'; 10 * 1024])];
        assert_matches!(
            limits().check_attachments(&files),
            Err(BindingError::PayloadTooLarge { size: 10240, limit: 10239, .. })
        );
    }

    #[test]
    fn test_metadata_caps() {
        let long_key = BTreeMap::from([("k".repeat(255), "v".to_string())]);
        assert_matches!(
            limits().check_metadata(&long_key),
            Err(BindingError::PayloadTooLarge { size: 255, .. })
        );

        let many: BTreeMap<_, _> = (0..6).map(|i| (format!("k{i}"), "v".to_string())).collect();
        assert_matches!(
            limits().check_metadata(&many),
            Err(BindingError::TooManyEntries { kind: "metadata", .. })
        );
    }

    #[test]
    fn test_attachment_json_is_base64() {
        let json = Attachment::new("/etc/motd", "hello").to_json();
        assert_eq!(json["path"], "/etc/motd");
        assert_eq!(json["contents"], "aGVsbG8=");
    }

    #[test]
    fn test_unlimited_accepts_everything() {
        let files: Vec<_> = (0..50).map(|i| Attachment::new(format!("/f{i}"), "x")).collect();
        assert!(PayloadLimits::UNLIMITED.check_attachments(&files).is_ok());
    }
}
