//! Validated identifiers for user namespaces and stored filenames
//!
//! Both types are checked once at construction, so storage code can join them
//! onto filesystem paths without re-validating.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const MAX_NAMESPACE_LEN: usize = 128;
const MAX_FILENAME_BYTES: usize = 255;

/// Identifier of one user's isolated storage root and index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserNamespace(String);

impl UserNamespace {
    /// Parse a user identifier
    ///
    /// Accepts 1-128 characters from `[A-Za-z0-9_.@-]` that do not start with '.'.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref().trim();

        if raw.is_empty() {
            return Err(Error::InvalidNamespace("user identifier is empty".to_string()));
        }
        if raw.chars().count() > MAX_NAMESPACE_LEN {
            return Err(Error::InvalidNamespace(format!(
                "user identifier longer than {} characters",
                MAX_NAMESPACE_LEN
            )));
        }
        if raw.starts_with('.') {
            return Err(Error::InvalidNamespace(format!("'{}' starts with '.'", raw)));
        }
        if let Some(bad) = raw
            .chars()
            .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@')))
        {
            return Err(Error::InvalidNamespace(format!(
                "'{}' contains disallowed character {:?}",
                raw, bad
            )));
        }

        Ok(Self(raw.to_string()))
    }

    /// The identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserNamespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<UserNamespace> for String {
    fn from(ns: UserNamespace) -> Self {
        ns.0
    }
}

/// Name of a file stored directly inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoredFileName(String);

impl StoredFileName {
    /// Parse an uploaded filename
    ///
    /// Dot-names are reserved for the index and staging files.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref().trim();

        if raw.is_empty() {
            return Err(Error::InvalidFileName("filename cannot be empty".to_string()));
        }
        if raw.len() > MAX_FILENAME_BYTES {
            return Err(Error::InvalidFileName(format!(
                "filename longer than {} bytes",
                MAX_FILENAME_BYTES
            )));
        }
        if raw.contains(|c: char| c == '/' || c == '\\' || c == '\0') {
            return Err(Error::InvalidFileName(format!(
                "'{}' contains a path separator or NUL",
                raw.replace('\0', "\\0")
            )));
        }
        if raw.starts_with('.') {
            return Err(Error::InvalidFileName(format!("'{}' starts with '.'", raw)));
        }
        if raw.chars().any(char::is_control) {
            return Err(Error::InvalidFileName(format!("'{}' contains control characters", raw.escape_debug())));
        }

        Ok(Self(raw.to_string()))
    }

    /// The filename as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase extension without the dot, empty when absent
    pub fn extension(&self) -> String {
        match self.0.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        }
    }
}

impl fmt::Display for StoredFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StoredFileName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<StoredFileName> for String {
    fn from(name: StoredFileName) -> Self {
        name.0
    }
}
