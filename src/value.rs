//! Runtime values
//!
//! The engine parses dynamically-typed values. [`Value`] is that universe:
//! JSON values plus `undefined`, bigints, symbols and dates. Containers are
//! `Arc`-shared so copy-on-write updates (parser output, optic `replace`)
//! only allocate along the touched path and siblings stay pointer-equal.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Symbol
// =============================================================================

/// A symbol value.
///
/// Registered symbols are interned by key (`Symbol::for_key("a") == Symbol::for_key("a")`),
/// unique symbols compare by identity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Registered(Arc<str>),
    Unique {
        id: u64,
        description: Option<Arc<str>>,
    },
}

impl Symbol {
    /// Get (or create) the registered symbol for `key`
    pub fn for_key(key: impl AsRef<str>) -> Self {
        Symbol::Registered(Arc::from(key.as_ref()))
    }

    /// Create a fresh unique symbol
    pub fn new(description: Option<&str>) -> Self {
        Symbol::Unique {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(Arc::from),
        }
    }

    /// The registry key, if this symbol is registered
    pub fn key_for(&self) -> Option<&str> {
        match self {
            Symbol::Registered(key) => Some(key),
            Symbol::Unique { .. } => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Symbol::Registered(key) => Some(key),
            Symbol::Unique { description, .. } => description.as_deref(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

// =============================================================================
// Property Key
// =============================================================================

/// A property key: object keys and path segments.
///
/// `Index` addresses array positions; objects only ever hold `String` and
/// `Symbol` keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    String(String),
    Index(usize),
    Symbol(Symbol),
}

impl PropertyKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            _ => None,
        }
    }

    /// The key as a value, as seen by an index signature's parameter parser
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Index(i) => Value::Number(*i as f64),
            PropertyKey::Symbol(s) => Value::Symbol(s.clone()),
        }
    }

    /// Convert a decoded key value back into an object key.
    ///
    /// Numbers become their string form, as host objects do.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PropertyKey::String(s.clone())),
            Value::Symbol(s) => Some(PropertyKey::Symbol(s.clone())),
            Value::Number(n) => Some(PropertyKey::String(format_number(*n))),
            _ => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(i: usize) -> Self {
        PropertyKey::Index(i)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(s: Symbol) -> Self {
        PropertyKey::Symbol(s)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", quote(s)),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for PropertyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PropertyKey::String(s) => serializer.serialize_str(s),
            PropertyKey::Index(i) => serializer.serialize_u64(*i as u64),
            PropertyKey::Symbol(sym) => {
                let json = match sym.key_for() {
                    Some(key) => serde_json::json!({ "symbol": key, "registered": true }),
                    None => serde_json::json!({ "symbol": sym.description(), "registered": false }),
                };
                json.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for PropertyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        match json {
            serde_json::Value::String(s) => Ok(PropertyKey::String(s)),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|i| PropertyKey::Index(i as usize))
                .ok_or_else(|| serde::de::Error::custom("index keys must be non-negative integers")),
            serde_json::Value::Object(map) => {
                let description = map.get("symbol").and_then(|s| s.as_str());
                let registered = map.get("registered").and_then(|r| r.as_bool()).unwrap_or(false);
                match (registered, description) {
                    (true, Some(key)) => Ok(PropertyKey::Symbol(Symbol::for_key(key))),
                    (_, description) => Ok(PropertyKey::Symbol(Symbol::new(description))),
                }
            }
            other => Err(serde::de::Error::custom(format!("invalid property key: {}", other))),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// An object: own properties in insertion order
pub type Record = IndexMap<PropertyKey, Value>;

/// A dynamically-typed runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(Symbol),
    Array(Arc<Vec<Value>>),
    Object(Arc<Record>),
    Date(DateTime<Utc>),
    /// A value hidden from formatted output (see `Issue::redact`)
    Redacted(Arc<Value>),
}

/// Host-level type tag of a value, used for union candidate filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Null,
    Undefined,
    Boolean,
    Number,
    BigInt,
    String,
    Symbol,
    Array,
    Object,
}

impl TypeTag {
    pub const ALL: [TypeTag; 9] = [
        TypeTag::Null,
        TypeTag::Undefined,
        TypeTag::Boolean,
        TypeTag::Number,
        TypeTag::BigInt,
        TypeTag::String,
        TypeTag::Symbol,
        TypeTag::Array,
        TypeTag::Object,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Undefined => "undefined",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::BigInt => "bigint",
            TypeTag::String => "string",
            TypeTag::Symbol => "symbol",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    /// Build an object from key/value pairs, preserving order
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn empty_object() -> Self {
        Value::Object(Arc::new(Record::new()))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Undefined => TypeTag::Undefined,
            Value::Null => TypeTag::Null,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Number(_) => TypeTag::Number,
            Value::BigInt(_) => TypeTag::BigInt,
            Value::String(_) => TypeTag::String,
            Value::Symbol(_) => TypeTag::Symbol,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) | Value::Date(_) | Value::Redacted(_) => TypeTag::Object,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i128> {
        match self {
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Own property lookup on objects (arrays answer `Index` keys)
    pub fn get(&self, key: &PropertyKey) -> Option<&Value> {
        match (self, key) {
            (Value::Object(record), _) => record.get(key),
            (Value::Array(items), PropertyKey::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// Number of elements (arrays), characters (strings) or properties (objects)
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Object(record) => Some(record.len()),
            _ => None,
        }
    }

    /// Whether both values share the same container allocation
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    pub fn redacted(self) -> Self {
        match self {
            Value::Redacted(_) => self,
            other => Value::Redacted(Arc::new(other)),
        }
    }

    /// Lift a JSON value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter().map(|(k, v)| (PropertyKey::String(k.clone()), Value::from_json(v))),
            ),
        }
    }

    /// Project to JSON the way `JSON.stringify` would.
    ///
    /// Returns `None` for values with no JSON form (bigints anywhere, or a
    /// top-level undefined/symbol). Nested undefined/symbol values become
    /// `null` in arrays and are skipped in objects.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Undefined | Value::Symbol(_) | Value::BigInt(_) | Value::Redacted(_) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(number_to_json(*n)),
            Value::String(s) => Some(serde_json::Value::String(s.clone())),
            Value::Date(d) => Some(serde_json::Value::String(
                d.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item {
                        Value::Undefined | Value::Symbol(_) => out.push(serde_json::Value::Null),
                        other => out.push(other.to_json()?),
                    }
                }
                Some(serde_json::Value::Array(out))
            }
            Value::Object(record) => {
                let mut map = serde_json::Map::new();
                for (key, value) in record.iter() {
                    let PropertyKey::String(key) = key else { continue };
                    if matches!(value, Value::Undefined | Value::Symbol(_)) {
                        continue;
                    }
                    map.insert(key.clone(), value.to_json()?);
                }
                Some(serde_json::Value::Object(map))
            }
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Format a number the way the host prints it (`1`, `1.5`, `NaN`, `Infinity`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

pub(crate) fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::BigInt(n) => write!(f, "{}n", n),
            Value::String(s) => write!(f, "{}", quote(s)),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Redacted(_) => write!(f, "<redacted>"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(record) => {
                write!(f, "{{")?;
                for (i, (key, value)) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match key {
                        PropertyKey::Symbol(s) => write!(f, "[{}]:{}", s, value)?,
                        other => write!(f, "{}:{}", other, value)?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registered_symbols_compare_by_key() {
        assert_eq!(Symbol::for_key("a"), Symbol::for_key("a"));
        assert_ne!(Symbol::new(Some("a")), Symbol::new(Some("a")));
        assert_eq!(Symbol::for_key("a").key_for(), Some("a"));
        assert_eq!(Symbol::new(Some("a")).key_for(), None);
    }

    #[test]
    fn test_json_round_trip_keeps_order() {
        let json = json!({"b": 1, "a": [true, null, "x"]});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), Some(json));
    }

    #[test]
    fn test_to_json_skips_undefined_properties() {
        let value = Value::object([("a", Value::Undefined), ("b", Value::from(1))]);
        assert_eq!(value.to_json(), Some(json!({"b": 1})));
        assert_eq!(Value::BigInt(1).to_json(), None);
    }

    #[test]
    fn test_display() {
        let value = Value::object([
            ("a", Value::from("x")),
            ("b", Value::array(vec![Value::from(1), Value::BigInt(2)])),
        ]);
        assert_eq!(value.to_string(), r#"{"a":"x","b":[1,2n]}"#);
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::Null.type_tag(), TypeTag::Null);
        assert_eq!(Value::array(vec![]).type_tag(), TypeTag::Array);
        assert_eq!(Value::Date(Utc::now()).type_tag(), TypeTag::Object);
    }
}
