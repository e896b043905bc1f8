//! Patterns - glob or regex predicates over identifiers
//!
//! Glob semantics are those of a path glob with a literal separator:
//! `*` and `?` never cross `/`, `**` as a whole component spans any number of
//! components, `[...]` and `{a,b}` behave as usual. Regexes are unanchored.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier::Identifier;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid glob pattern {pattern:?}: {error}")]
    InvalidGlob {
        pattern: String,
        #[source]
        error: globset::Error,
    },

    #[error("Invalid regex pattern {pattern:?}: {error}")]
    InvalidRegex {
        pattern: String,
        #[source]
        error: regex::Error,
    },
}

/// Uncompiled pattern text, as written in a rules file.
///
/// A bare string is a glob; `{"regex": "..."}` is a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSource {
    Glob(String),
    Regex { regex: String },
}

impl PatternSource {
    pub fn regex(source: impl Into<String>) -> Self {
        Self::Regex { regex: source.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob(s) => s,
            Self::Regex { regex } => regex,
        }
    }
}

impl From<&str> for PatternSource {
    fn from(s: &str) -> Self {
        Self::Glob(s.to_string())
    }
}

impl From<String> for PatternSource {
    fn from(s: String) -> Self {
        Self::Glob(s)
    }
}

impl From<&PatternSource> for PatternSource {
    fn from(s: &PatternSource) -> Self {
        s.clone()
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(GlobMatcher),
    Regex(Regex),
}

/// A compiled pattern. Only the predicate matters; patterns are never compared.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: PatternSource,
    matcher: Matcher,
}

impl Pattern {
    pub fn compile(source: impl Into<PatternSource>) -> Result<Self, PatternError> {
        let source = source.into();
        let matcher = match &source {
            PatternSource::Glob(glob) => {
                let compiled = GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map_err(|error| PatternError::InvalidGlob {
                        pattern: glob.clone(),
                        error,
                    })?;
                Matcher::Glob(compiled.compile_matcher())
            }
            PatternSource::Regex { regex } => {
                let compiled = Regex::new(regex).map_err(|error| PatternError::InvalidRegex {
                    pattern: regex.clone(),
                    error,
                })?;
                Matcher::Regex(compiled)
            }
        };
        Ok(Self { source, matcher })
    }

    pub fn matches(&self, identifier: &Identifier) -> bool {
        match &self.matcher {
            Matcher::Glob(glob) => glob.is_match(identifier.as_str()),
            Matcher::Regex(regex) => regex.is_match(identifier.as_str()),
        }
    }

    pub fn source(&self) -> &PatternSource {
        &self.source
    }
}
