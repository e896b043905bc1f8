//! Identifiers - logical locations of content units

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slash-delimited path naming an item or layout, e.g. `/blog/first-post.md`.
///
/// Construction ensures a leading `/` and collapses repeated separators.
/// Equality, ordering and hashing are structural over the normalised text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let mut normalized = String::with_capacity(raw.as_ref().len() + 1);
        normalized.push('/');
        for segment in raw.as_ref().split('/').filter(|s| !s.is_empty()) {
            if !normalized.ends_with('/') {
                normalized.push('/');
            }
            normalized.push_str(segment);
        }
        if raw.as_ref().ends_with('/') && !normalized.ends_with('/') {
            normalized.push('/');
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension of the last path segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let last = self.0.rsplit('/').next()?;
        match last.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&last[idx + 1..]),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
