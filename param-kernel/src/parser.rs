//! Reference token discovery.

use param_primitives::{ConfigDocument, ReferenceToken, SecretUri, push_pointer_segment};
use serde_json::Value;

use crate::error::{RenderError, RenderResult};

/// Marker that introduces a secret reference inside a string value.
pub const DEFAULT_PREFIX: &str = "__REF__";

/// Finds `PREFIX(secret://...)` tokens in a document.
///
/// A string node is a reference when its trimmed value starts with the prefix.
/// The whole node is replaced during rendering, so strings that mention the
/// prefix after other text are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceParser {
    prefix: String,
}

impl ReferenceParser {
    /// Creates a parser for the default `__REF__` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }

    /// Creates a parser for a custom prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] when the prefix is empty, contains
    /// whitespace, or contains a parenthesis.
    pub fn with_prefix(prefix: impl Into<String>) -> RenderResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RenderError::InvalidConfig("reference prefix must not be empty"));
        }
        if prefix
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')')
        {
            return Err(RenderError::InvalidConfig(
                "reference prefix must not contain whitespace or parentheses",
            ));
        }
        Ok(Self { prefix })
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns every reference token in document order.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::MalformedReference`] for the first string node that
    /// starts with the prefix but does not hold a valid reference.
    pub fn parse(&self, document: &ConfigDocument) -> RenderResult<Vec<ReferenceToken>> {
        let mut tokens = Vec::new();
        self.walk(document.as_value(), String::new(), &mut tokens)?;
        Ok(tokens)
    }

    fn walk(
        &self,
        value: &Value,
        pointer: String,
        tokens: &mut Vec<ReferenceToken>,
    ) -> RenderResult<()> {
        match value {
            Value::String(raw) => {
                if let Some(uri) = self.match_reference(&pointer, raw)? {
                    tokens.push(ReferenceToken::new(pointer, uri));
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let child = push_pointer_segment(&pointer, &index.to_string());
                    self.walk(item, child, tokens)?;
                }
            }
            Value::Object(fields) => {
                for (key, item) in fields {
                    let child = push_pointer_segment(&pointer, key);
                    self.walk(item, child, tokens)?;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    fn match_reference(&self, path: &str, raw: &str) -> RenderResult<Option<SecretUri>> {
        let Some(rest) = raw.trim().strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };
        let malformed = |reason: String| RenderError::MalformedReference {
            path: path.to_owned(),
            reason,
        };

        let inner = rest
            .strip_prefix('(')
            .and_then(|body| body.strip_suffix(')'))
            .ok_or_else(|| malformed(format!("expected `{}(secret://...)`", self.prefix)))?
            .trim();

        let target = match inner.strip_prefix('"') {
            Some(quoted) => quoted
                .strip_suffix('"')
                .ok_or_else(|| malformed("unbalanced quote around reference".into()))?,
            None => inner,
        };

        SecretUri::parse(target)
            .map(Some)
            .map_err(|err| malformed(err.to_string()))
    }
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self::new()
    }
}
