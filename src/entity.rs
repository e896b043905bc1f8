//! Content entities - items and layouts
//!
//! An entity is mutable while the site is being loaded and preprocessed, then
//! frozen before any rule runs. Its checksum is memoised in a `OnceLock`, so
//! concurrent compilation workers converge on one computed value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use thiserror::Error;

#[cfg(any(test, feature = "test-hooks"))]
use std::sync::atomic::{AtomicU32, Ordering};

use crate::hashing::{compute_content_checksum, sort_value};
use crate::identifier::Identifier;

/// Attribute excluded from checksums: it records where the entity was loaded
/// from, not what it contains.
pub const FILE_ATTRIBUTE: &str = "file";

pub type Attributes = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Cannot modify {field} of frozen {kind} {identifier}")]
    ImmutableMutation {
        kind: EntityKind,
        identifier: Identifier,
        field: &'static str,
    },

    #[error("Attributes of {0} must be a JSON object")]
    AttributesNotObject(Identifier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Layout,
    Item,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layout => f.write_str("layout"),
            Self::Item => f.write_str("item"),
        }
    }
}

/// An item or layout. Equality and hashing use `(kind, identifier)` only.
#[derive(Debug)]
pub struct ContentEntity {
    kind: EntityKind,
    identifier: Identifier,
    raw_content: String,
    attributes: Attributes,
    frozen: bool,
    checksum: OnceLock<String>,
    #[cfg(any(test, feature = "test-hooks"))]
    checksum_computations: AtomicU32,
}

impl ContentEntity {
    pub fn item(
        raw_content: impl Into<String>,
        attributes: Attributes,
        identifier: impl Into<Identifier>,
    ) -> Self {
        Self::new(EntityKind::Item, raw_content, attributes, identifier)
    }

    pub fn layout(
        raw_content: impl Into<String>,
        attributes: Attributes,
        identifier: impl Into<Identifier>,
    ) -> Self {
        Self::new(EntityKind::Layout, raw_content, attributes, identifier)
    }

    pub fn new(
        kind: EntityKind,
        raw_content: impl Into<String>,
        attributes: Attributes,
        identifier: impl Into<Identifier>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            raw_content: raw_content.into(),
            attributes: canonicalize(attributes),
            frozen: false,
            checksum: OnceLock::new(),
            #[cfg(any(test, feature = "test-hooks"))]
            checksum_computations: AtomicU32::new(0),
        }
    }

    /// Build from loader output where attributes arrive as an arbitrary JSON value.
    pub fn from_value(
        kind: EntityKind,
        raw_content: impl Into<String>,
        attributes: Value,
        identifier: impl Into<Identifier>,
    ) -> Result<Self, ContentError> {
        let identifier = identifier.into();
        match attributes {
            Value::Object(map) => Ok(Self::new(kind, raw_content, map, identifier)),
            Value::Null => Ok(Self::new(kind, raw_content, Map::new(), identifier)),
            _ => Err(ContentError::AttributesNotObject(identifier)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Binary items are copied, never fed to text filters.
    pub fn is_binary(&self) -> bool {
        self.attribute("binary").and_then(Value::as_bool).unwrap_or(false)
    }

    /// The `extension` attribute if set, otherwise the identifier's extension.
    pub fn extension(&self) -> Option<&str> {
        self.attribute("extension")
            .and_then(Value::as_str)
            .or_else(|| self.identifier.extension())
    }

    pub fn identity_key(&self) -> (EntityKind, &Identifier) {
        (self.kind, &self.identifier)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn set_raw_content(&mut self, raw_content: impl Into<String>) -> Result<(), ContentError> {
        self.ensure_mutable("raw_content")?;
        self.raw_content = raw_content.into();
        self.invalidate_checksum();
        Ok(())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) -> Result<(), ContentError> {
        self.ensure_mutable("attributes")?;
        self.attributes.insert(key.into(), sort_value(&value));
        self.invalidate_checksum();
        Ok(())
    }

    pub fn remove_attribute(&mut self, key: &str) -> Result<Option<Value>, ContentError> {
        self.ensure_mutable("attributes")?;
        let removed = self.attributes.remove(key);
        self.invalidate_checksum();
        Ok(removed)
    }

    pub fn set_identifier(&mut self, identifier: impl Into<Identifier>) -> Result<(), ContentError> {
        self.ensure_mutable("identifier")?;
        self.identifier = identifier.into();
        Ok(())
    }

    /// Content address of this entity, computed once and cached.
    ///
    /// Concurrent first callers block on the `OnceLock` until the single
    /// computation publishes its value.
    pub fn checksum(&self) -> &str {
        self.checksum.get_or_init(|| self.compute_checksum())
    }

    /// Number of times the checksum was actually computed.
    #[cfg(any(test, feature = "test-hooks"))]
    pub fn checksum_computations(&self) -> u32 {
        self.checksum_computations.load(Ordering::SeqCst)
    }

    fn compute_checksum(&self) -> String {
        #[cfg(any(test, feature = "test-hooks"))]
        self.checksum_computations.fetch_add(1, Ordering::SeqCst);

        let hashed: Map<String, Value> = self
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != FILE_ATTRIBUTE)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        compute_content_checksum(&self.raw_content, &hashed)
    }

    fn invalidate_checksum(&mut self) {
        self.checksum = OnceLock::new();
    }

    fn ensure_mutable(&self, field: &'static str) -> Result<(), ContentError> {
        if self.frozen {
            return Err(ContentError::ImmutableMutation {
                kind: self.kind,
                identifier: self.identifier.clone(),
                field,
            });
        }
        Ok(())
    }
}

impl PartialEq for ContentEntity {
    fn eq(&self, other: &Self) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl Eq for ContentEntity {}

impl Hash for ContentEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_key().hash(state);
    }
}

fn canonicalize(attributes: Attributes) -> Attributes {
    let mut sorted: Vec<_> = attributes.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted.into_iter().map(|(k, v)| (k, sort_value(&v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Barrier;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_equality_ignores_content() {
        let a = ContentEntity::item("one", Attributes::new(), "/a");
        let b = ContentEntity::item("two", attrs(json!({"x": 1})), "/a");
        let c = ContentEntity::item("one", Attributes::new(), "/c");
        let layout = ContentEntity::layout("one", Attributes::new(), "/a");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, layout);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_checksum_memoized() {
        let mut item = ContentEntity::item("body", attrs(json!({"title": "T"})), "/a");
        item.freeze();
        let first = item.checksum().to_string();
        let second = item.checksum().to_string();
        assert_eq!(first, second);
        assert_eq!(item.checksum_computations(), 1);
    }

    #[test]
    fn test_mutation_before_freeze_invalidates() {
        let mut item = ContentEntity::item("before", Attributes::new(), "/a");
        let before = item.checksum().to_string();
        item.set_raw_content("after").unwrap();
        let after = item.checksum().to_string();
        assert_ne!(before, after);
        assert_eq!(item.checksum_computations(), 2);
    }

    #[test]
    fn test_file_attribute_excluded() {
        let a = ContentEntity::item("x", attrs(json!({"file": "/tmp/a", "k": 1})), "/a");
        let b = ContentEntity::item("x", attrs(json!({"file": "/srv/b", "k": 1})), "/a");
        let c = ContentEntity::item("x", attrs(json!({"k": 1})), "/a");
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_nested_attribute_order_is_irrelevant() {
        let a = ContentEntity::item("x", attrs(json!({"meta": {"b": 1, "a": 2}})), "/a");
        let b = ContentEntity::item("x", attrs(json!({"meta": {"a": 2, "b": 1}})), "/a");
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_freeze_rejects_mutation() {
        let mut layout = ContentEntity::layout("<%= yield %>", Attributes::new(), "/default/");
        layout.freeze();
        layout.freeze();
        assert!(layout.is_frozen());

        let err = layout.set_raw_content("changed").unwrap_err();
        assert!(matches!(
            err,
            ContentError::ImmutableMutation { field: "raw_content", .. }
        ));
        assert!(layout.set_attribute("k", json!(1)).is_err());
        assert!(layout.remove_attribute("k").is_err());
        assert!(layout.set_identifier("/other/").is_err());
        assert_eq!(layout.raw_content(), "<%= yield %>");
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        assert!(ContentEntity::from_value(EntityKind::Item, "", json!(3), "/a").is_err());
        let item = ContentEntity::from_value(EntityKind::Item, "", Value::Null, "/a").unwrap();
        assert!(item.attributes().is_empty());
    }

    #[test]
    fn test_concurrent_first_access_computes_once() {
        let body = "x".repeat(200_000);
        for n in 0..50 {
            let mut item = ContentEntity::item(body.as_str(), attrs(json!({"n": n})), "/shared");
            item.freeze();
            let barrier = Barrier::new(8);
            let results: Vec<String> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            item.checksum().to_string()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(results.windows(2).all(|w| w[0] == w[1]));
            assert_eq!(item.checksum_computations(), 1);
        }
    }
}
