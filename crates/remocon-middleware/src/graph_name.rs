//! [`GraphName`] – a validated ROS graph name.
//!
//! Graph names are `/`-separated tokens.  Every token starts with a letter
//! and continues with letters, digits or underscores.  A leading `/` makes a
//! name *global*, a leading `~` makes it *private*, anything else is
//! *relative*.  A trailing `/` is dropped so that `"/concert/"` and
//! `"/concert"` compare equal.

use std::fmt;
use std::str::FromStr;

use remocon_types::RemoconError;
use serde::{Deserialize, Serialize};

/// A validated, canonical ROS graph name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphName(String);

impl GraphName {
    /// Parse and canonicalise `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoconError::InvalidGraphName`] for empty names, empty
    /// tokens (`"/a//b"`) or tokens with illegal characters.
    pub fn new(name: impl AsRef<str>) -> Result<Self, RemoconError> {
        canonicalize(name.as_ref()).map(Self)
    }

    /// The global root namespace, `"/"`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_global(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn is_private(&self) -> bool {
        self.0.starts_with('~')
    }

    pub fn is_relative(&self) -> bool {
        !self.is_global() && !self.is_private()
    }

    /// Return the global form of a relative name (`"a/b"` → `"/a/b"`).
    /// Global names are returned unchanged.
    ///
    /// # Errors
    ///
    /// Private names have no global form without a node to anchor them.
    pub fn to_global(&self) -> Result<Self, RemoconError> {
        if self.is_private() {
            return Err(RemoconError::InvalidGraphName(format!(
                "private name {} cannot be made global",
                self.0
            )));
        }
        if self.is_global() {
            return Ok(self.clone());
        }
        Ok(Self(format!("/{}", self.0)))
    }

    /// Append `other` to this name.
    ///
    /// A global `other` replaces `self` entirely.  A private `other` is joined
    /// without its `~` marker.
    pub fn join(&self, other: &GraphName) -> GraphName {
        if other.is_global() {
            return other.clone();
        }
        let tail = other.0.trim_start_matches('~');
        if self.is_root() {
            Self(format!("/{tail}"))
        } else {
            Self(format!("{}/{tail}", self.0))
        }
    }

    /// The enclosing namespace, or `None` for the root and single-token
    /// relative names.
    pub fn parent(&self) -> Option<GraphName> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// The last token of the name (`"/concert/start_app"` → `"start_app"`).
    pub fn basename(&self) -> &str {
        let trimmed = self.0.trim_start_matches('~');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }
}

fn canonicalize(raw: &str) -> Result<String, RemoconError> {
    if raw.is_empty() {
        return Err(RemoconError::InvalidGraphName(
            "graph names must not be empty".to_string(),
        ));
    }
    if raw == "/" {
        return Ok(raw.to_string());
    }

    let (prefix, body) = if let Some(rest) = raw.strip_prefix('/') {
        ("/", rest)
    } else if let Some(rest) = raw.strip_prefix('~') {
        ("~", rest)
    } else {
        ("", raw)
    };
    let body = body.strip_suffix('/').unwrap_or(body);

    for token in body.split('/') {
        if !is_valid_token(token) {
            return Err(RemoconError::InvalidGraphName(format!(
                "'{raw}' contains an invalid token '{token}'"
            )));
        }
    }
    Ok(format!("{prefix}{body}"))
}

fn is_valid_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GraphName {
    type Err = RemoconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GraphName {
    type Error = RemoconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GraphName> for String {
    fn from(name: GraphName) -> Self {
        name.0
    }
}

impl AsRef<str> for GraphName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
