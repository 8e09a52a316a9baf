//! Structured configuration documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// JSON configuration tree passed into and returned from a render.
///
/// Object member order is preserved so that rendering the same input twice
/// produces byte-identical output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Value);

impl ConfigDocument {
    /// Wraps an existing JSON value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Decodes a document from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`] when the bytes are not valid JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|err| Error::InvalidDocument {
                reason: err.to_string(),
            })
    }

    /// Returns the underlying JSON tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the document, returning the JSON tree.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Looks up the node at an RFC 6901 JSON pointer.
    #[must_use]
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Replaces the scalar string node at `pointer` with `replacement`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the pointer does not address an
    /// existing string node.
    pub fn replace_string(&mut self, pointer: &str, replacement: String) -> Result<()> {
        match self.0.pointer_mut(pointer) {
            Some(node @ Value::String(_)) => {
                *node = Value::String(replacement);
                Ok(())
            }
            Some(_) => Err(Error::InvalidPath {
                path: pointer.into(),
                reason: "path does not address a string node",
            }),
            None => Err(Error::InvalidPath {
                path: pointer.into(),
                reason: "path does not exist in document",
            }),
        }
    }

    /// Serializes the document in compact form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` into memory cannot fail.
        serde_json::to_vec(&self.0).unwrap_or_default()
    }
}

impl From<Value> for ConfigDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<ConfigDocument> for Value {
    fn from(value: ConfigDocument) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preserves_member_order() {
        let doc = ConfigDocument::from_slice(br#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#).unwrap();
        assert_eq!(doc.to_bytes(), br#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#);
    }

    #[test]
    fn replace_string_targets_one_node() {
        let mut doc = ConfigDocument::from_value(json!({"a": {"b": "x"}, "n": 1}));
        doc.replace_string("/a/b", "y".into()).unwrap();
        assert_eq!(doc.as_value(), &json!({"a": {"b": "y"}, "n": 1}));

        assert!(doc.replace_string("/n", "z".into()).is_err());
        assert!(doc.replace_string("/missing", "z".into()).is_err());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            ConfigDocument::from_slice(b"{not json"),
            Err(Error::InvalidDocument { .. })
        ));
    }
}
