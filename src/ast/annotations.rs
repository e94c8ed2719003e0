//! Schema annotations
//!
//! Annotations are open key/value metadata. JSON entries survive
//! serialization; opaque entries (closures, serializer factories) only live
//! in memory and are dropped when a schema is lowered to a Representation.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const IDENTIFIER: &str = "identifier";
pub const MESSAGE: &str = "message";
pub const MESSAGE_MISSING_KEY: &str = "messageMissingKey";
pub const MESSAGE_UNEXPECTED_KEY: &str = "messageUnexpectedKey";
pub const EXPECTED: &str = "expected";
pub const BRANDS: &str = "brands";
pub const DEFAULT: &str = "default";
pub const EXAMPLES: &str = "examples";
/// Opaque: a `serializer::DefaultJsonSerializer` for declarations
pub const DEFAULT_JSON_SERIALIZER: &str = "defaultJsonSerializer";
/// JSON: `{"_tag": "<name>"}` naming the constructor that rebuilds a declaration
pub const TYPE_CONSTRUCTOR: &str = "typeConstructor";
/// JSON: `{"runtime": "...", "type": "...", "import": "..."}` for code generation
pub const GENERATION: &str = "generation";

/// A single annotation value
#[derive(Clone)]
pub enum Annotation {
    Json(serde_json::Value),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Json(json) => write!(f, "{}", json),
            Annotation::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

/// Ordered annotation map
#[derive(Clone, Default)]
pub struct Annotations(IndexMap<String, Annotation>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Builder-style insert of a JSON entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), Annotation::Json(value.into()));
    }

    pub fn insert_opaque<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Annotation::Opaque(Arc::new(value)));
    }

    pub fn get(&self, key: &str) -> Option<&Annotation> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_json(&self, key: &str) -> Option<&serde_json::Value> {
        match self.0.get(key)? {
            Annotation::Json(json) => Some(json),
            Annotation::Opaque(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_json(key)?.as_str()
    }

    pub fn get_opaque<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        match self.0.get(key)? {
            Annotation::Opaque(value) => value.downcast_ref::<T>(),
            Annotation::Json(_) => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Annotation> {
        self.0.shift_remove(key)
    }

    /// Merge `other` over `self`; `other` wins on key conflicts
    pub fn merge(&self, other: &Annotations) -> Annotations {
        let mut merged = self.0.clone();
        for (key, value) in other.0.iter() {
            merged.insert(key.clone(), value.clone());
        }
        Annotations(merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Annotation)> {
        self.0.iter()
    }

    /// The JSON-representable entries, opaque entries skipped
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .filter_map(|(key, value)| match value {
                Annotation::Json(json) => Some((key.clone(), json.clone())),
                Annotation::Opaque(_) => None,
            })
            .collect()
    }

    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        Annotations(
            map.iter()
                .map(|(key, value)| (key.clone(), Annotation::Json(value.clone())))
                .collect(),
        )
    }

    /// Whether any entry would be lost by `to_json_map`
    pub fn has_opaque(&self) -> bool {
        self.0.values().any(|v| matches!(v, Annotation::Opaque(_)))
    }
}

impl fmt::Debug for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Annotations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Annotations(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Annotation::Json(v.into())))
                .collect(),
        )
    }
}

impl Serialize for Annotations {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Annotations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = serde_json::Map::deserialize(deserializer)?;
        Ok(Annotations::from_json_map(&map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_prefers_right() {
        let a = Annotations::new().with(TITLE, "a").with(DESCRIPTION, "first");
        let b = Annotations::new().with(TITLE, "b");
        let merged = a.merge(&b);
        assert_eq!(merged.get_str(TITLE), Some("b"));
        assert_eq!(merged.get_str(DESCRIPTION), Some("first"));
    }

    #[test]
    fn test_opaque_entries_do_not_serialize() {
        let mut annotations = Annotations::new().with(TITLE, "t");
        annotations.insert_opaque("callback", 42u32);
        assert!(annotations.has_opaque());
        assert_eq!(annotations.get_opaque::<u32>("callback"), Some(&42));
        assert_eq!(serde_json::to_value(&annotations).unwrap(), json!({"title": "t"}));
    }
}
