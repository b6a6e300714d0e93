//! Identity labels.
//!
//! A label is one attribute of a network identity, written on the command
//! line and in repository state as `SOURCE:KEY[=VALUE]`:
//!
//! - `k8s:role=frontend` - source `k8s`, key `role`, value `frontend`
//! - `k8s:role` - source `k8s`, key `role`, no value
//!
//! A label without a value matches any label with the same source and key.
//!
//! ```rust
//! use policy_tree::Label;
//!
//! let label = Label::parse("k8s:role=frontend").unwrap();
//! assert_eq!(label.source(), "k8s");
//! assert_eq!(label.value(), Some("frontend"));
//! assert!(Label::parse("k8s:role").unwrap().matches(&label));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{Level, instrument};

use crate::error::LabelError;

/// A parsed `SOURCE:KEY[=VALUE]` label. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label {
    source: String,
    key: String,
    value: Option<String>,
}

impl Label {
    /// Creates a label with no value.
    pub fn new(source: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
            value: None,
        }
    }

    /// Returns this label with `value` attached. An empty value means no value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.value = (!value.is_empty()).then_some(value);
        self
    }

    /// Parses a `SOURCE:KEY[=VALUE]` token.
    ///
    /// Everything before the first `:` is the source; everything after the
    /// first `=` following it is the value.
    #[instrument(level = Level::TRACE)]
    pub fn parse(token: &str) -> Result<Self, LabelError> {
        let (source, rest) = token
            .split_once(':')
            .ok_or_else(|| LabelError::MissingSeparator(token.to_string()))?;
        if source.is_empty() {
            return Err(LabelError::EmptySource(token.to_string()));
        }

        let (key, value) = match rest.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (rest, None),
        };
        if key.is_empty() {
            return Err(LabelError::EmptyKey(token.to_string()));
        }

        let label = Label::new(source, key);
        Ok(match value {
            Some(value) => label.with_value(value),
            None => label,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns true if `other` carries this label.
    ///
    /// Source and key must be equal. A label without a value matches any
    /// value; otherwise the values must be equal too.
    pub fn matches(&self, other: &Label) -> bool {
        self.source == other.source
            && self.key == other.key
            && (self.value.is_none() || self.value == other.value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.key)?;
        if let Some(value) = &self.value {
            write!(f, "={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = LabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Label::parse(&value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}
