//! Getters: one-directional value mappers over `Option<Value>`
//!
//! `None` means "key absent". A getter may fail with an [`Issue`] and may
//! suspend. [`Getter::Passthrough`] is a distinguished identity that
//! composition recognizes and drops, so chains of passthroughs never build
//! wrapper closures.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::sync::Arc;

use crate::effect::SchemaResult;
use crate::issue::Issue;
use crate::parser::ParseOptions;
use crate::tree;
use crate::value::{format_number, Value};

pub type GetterFn =
    Arc<dyn Fn(Option<Value>, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync>;

#[derive(Clone)]
pub enum Getter {
    Passthrough,
    Run(GetterFn),
}

impl Getter {
    pub fn passthrough() -> Self {
        Getter::Passthrough
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Getter::Passthrough)
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Value>, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync + 'static,
    {
        Getter::Run(Arc::new(f))
    }

    pub fn run(&self, input: Option<Value>, options: &ParseOptions) -> SchemaResult<Option<Value>> {
        match self {
            Getter::Passthrough => SchemaResult::succeed(input),
            Getter::Run(f) => f(input, options),
        }
    }

    /// `self` then `other`
    pub fn compose(&self, other: &Getter) -> Getter {
        match (self, other) {
            (Getter::Passthrough, _) => other.clone(),
            (_, Getter::Passthrough) => self.clone(),
            (Getter::Run(first), Getter::Run(second)) => {
                let first = first.clone();
                let second = second.clone();
                Getter::new(move |input, options| {
                    let second = second.clone();
                    let options = *options;
                    first(input, &options).and_then(move |out| second(out, &options))
                })
            }
        }
    }

    /// Always produce `value`
    pub fn succeed(value: Value) -> Self {
        Getter::new(move |_, _| SchemaResult::succeed(Some(value.clone())))
    }

    pub fn fail<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Issue + Send + Sync + 'static,
    {
        Getter::new(move |input, _| SchemaResult::fail(f(input)))
    }

    /// Always absent
    pub fn omit() -> Self {
        Getter::new(|_, _| SchemaResult::succeed(None))
    }

    /// Handle the absent case; present values pass through
    pub fn on_none<F>(f: F) -> Self
    where
        F: Fn(&ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync + 'static,
    {
        Getter::new(move |input, options| match input {
            None => f(options),
            some => SchemaResult::succeed(some),
        })
    }

    /// Handle the present case; absence passes through
    pub fn on_some<F>(f: F) -> Self
    where
        F: Fn(Value, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync + 'static,
    {
        Getter::new(move |input, options| match input {
            Some(value) => f(value, options),
            None => SchemaResult::succeed(None),
        })
    }

    /// Fail with `MissingKey` when absent
    pub fn required() -> Self {
        Getter::on_none(|_| SchemaResult::fail(Issue::MissingKey { annotations: None }))
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Getter::on_some(move |value, _| SchemaResult::succeed(Some(f(value))))
    }

    pub fn transform_or_fail<F>(f: F) -> Self
    where
        F: Fn(Value, &ParseOptions) -> Result<Value, Issue> + Send + Sync + 'static,
    {
        Getter::on_some(move |value, options| SchemaResult::from_result(f(value, options).map(Some)))
    }

    pub fn transform_optional<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        Getter::new(move |input, _| SchemaResult::succeed(f(input)))
    }

    /// Substitute `value` for an absent or `undefined` input
    pub fn with_default(value: Value) -> Self {
        Getter::transform_optional(move |input| match input {
            None | Some(Value::Undefined) => Some(value.clone()),
            some => some,
        })
    }

    // -------------------------------------------------------------------------
    // Coercions
    // -------------------------------------------------------------------------

    pub fn string() -> Self {
        Getter::transform_or_fail(|value, _| {
            coerce_string(&value).ok_or_else(|| {
                Issue::invalid_value(Some(value.clone()), "cannot convert value to a string")
            })
        })
    }

    pub fn number() -> Self {
        Getter::transform(|value| Value::Number(coerce_number(&value)))
    }

    pub fn boolean() -> Self {
        Getter::transform(|value| Value::Boolean(truthy(&value)))
    }

    pub fn bigint() -> Self {
        Getter::transform_or_fail(|value, _| {
            coerce_bigint(&value).map(Value::BigInt).ok_or_else(|| {
                Issue::invalid_value(Some(value.clone()), format!("cannot convert {} to a BigInt", value))
            })
        })
    }

    pub fn date() -> Self {
        Getter::transform_or_fail(|value, _| {
            coerce_date(&value).map(Value::Date).ok_or_else(|| {
                Issue::invalid_value(Some(value.clone()), format!("cannot convert {} to a Date", value))
            })
        })
    }

    // -------------------------------------------------------------------------
    // Strings
    // -------------------------------------------------------------------------

    pub fn trim() -> Self {
        map_str(|s| s.trim().to_string())
    }

    pub fn to_lower_case() -> Self {
        map_str(str::to_lowercase)
    }

    pub fn to_upper_case() -> Self {
        map_str(str::to_uppercase)
    }

    pub fn capitalize() -> Self {
        map_str(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
    }

    // -------------------------------------------------------------------------
    // Binary-to-text
    // -------------------------------------------------------------------------

    pub fn encode_base64() -> Self {
        map_str(|s| STANDARD.encode(s.as_bytes()))
    }

    pub fn decode_base64() -> Self {
        decode_str(|s| STANDARD.decode(s).map_err(|e| e.to_string()))
    }

    pub fn encode_base64_url() -> Self {
        map_str(|s| URL_SAFE_NO_PAD.encode(s.as_bytes()))
    }

    pub fn decode_base64_url() -> Self {
        decode_str(|s| {
            URL_SAFE_NO_PAD
                .decode(s.trim_end_matches('='))
                .map_err(|e| e.to_string())
        })
    }

    pub fn encode_hex() -> Self {
        map_str(|s| s.bytes().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn decode_hex() -> Self {
        decode_str(decode_hex)
    }

    // -------------------------------------------------------------------------
    // JSON
    // -------------------------------------------------------------------------

    /// `JSON.parse`; syntax errors become `InvalidValue`
    pub fn parse_json() -> Self {
        Getter::transform_or_fail(|value, _| match &value {
            Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|json| Value::from_json(&json))
                .map_err(|e| Issue::invalid_value(Some(value.clone()), e.to_string())),
            _ => Err(Issue::invalid_value(Some(value.clone()), "expected a JSON string")),
        })
    }

    /// `JSON.stringify`; values with no JSON form become `InvalidValue`
    pub fn stringify_json() -> Self {
        Getter::transform_or_fail(|value, _| {
            value
                .to_json()
                .and_then(|json| serde_json::to_string(&json).ok())
                .map(Value::String)
                .ok_or_else(|| {
                    Issue::invalid_value(Some(value.clone()), "value cannot be serialized to JSON")
                })
        })
    }

    // -------------------------------------------------------------------------
    // Bracket-path trees
    // -------------------------------------------------------------------------

    /// `[[path, value], ...]` entries into a nested record
    pub fn make_tree_record() -> Self {
        Getter::transform_or_fail(|value, _| {
            let entries = tree::entries_from_value(&value).ok_or_else(|| {
                Issue::invalid_value(Some(value.clone()), "expected an array of [key, value] entries")
            })?;
            Ok(tree::make_tree_record(&entries))
        })
    }

    /// A nested record into `[[path, value], ...]` entries
    pub fn collect_bracket_path_entries() -> Self {
        Getter::transform(|value| tree::entries_to_value(&tree::collect_bracket_path_entries(&value)))
    }
}

fn map_str<F>(f: F) -> Getter
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    Getter::transform_or_fail(move |value, _| match &value {
        Value::String(s) => Ok(Value::String(f(s))),
        _ => Err(Issue::invalid_value(Some(value.clone()), "expected a string")),
    })
}

fn decode_str<F>(f: F) -> Getter
where
    F: Fn(&str) -> Result<Vec<u8>, String> + Send + Sync + 'static,
{
    Getter::transform_or_fail(move |value, _| {
        let Value::String(s) = &value else {
            return Err(Issue::invalid_value(Some(value.clone()), "expected a string"));
        };
        let bytes = f(s).map_err(|message| Issue::invalid_value(Some(value.clone()), message))?;
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| Issue::invalid_value(Some(value.clone()), e.to_string()))
    })
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("hex string must have an even length".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex digit at position {}", i))
        })
        .collect()
}

/// `String(x)`; symbols have no implicit string form
pub(crate) fn coerce_string(value: &Value) -> Option<Value> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
        Value::Array(items) => {
            let parts: Option<Vec<String>> = items
                .iter()
                .map(|item| match item {
                    Value::Null | Value::Undefined => Some(String::new()),
                    other => coerce_string(other).and_then(|v| v.as_str().map(str::to_string)),
                })
                .collect();
            parts?.join(",")
        }
        Value::Object(_) | Value::Redacted(_) => "[object Object]".to_string(),
        Value::Symbol(_) => return None,
    };
    Some(Value::String(s))
}

/// `Number(x)`
pub(crate) fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                match t {
                    "Infinity" | "+Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    _ if t.starts_with("0x") || t.starts_with("0X") => {
                        i64::from_str_radix(&t[2..], 16).map_or(f64::NAN, |n| n as f64)
                    }
                    // Rust accepts "inf"/"nan" spellings the host rejects
                    _ if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
                    _ => t.parse().unwrap_or(f64::NAN),
                }
            }
        }
        Value::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        Value::BigInt(n) => *n as f64,
        Value::Date(d) => d.timestamp_millis() as f64,
        _ => f64::NAN,
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::BigInt(n) => *n != 0,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// `BigInt(x)`
pub(crate) fn coerce_bigint(value: &Value) -> Option<i128> {
    match value {
        Value::BigInt(n) => Some(*n),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i128),
        Value::Boolean(b) => Some(*b as i128),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                Some(0)
            } else {
                t.parse().ok()
            }
        }
        _ => None,
    }
}

/// `new Date(x)` restricted to valid instants
pub(crate) fn coerce_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Number(n) if n.is_finite() => Utc.timestamp_millis_opt(*n as i64).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|d| Utc.from_utc_datetime(&d))
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(getter: &Getter, value: Value) -> Result<Option<Value>, Issue> {
        getter.run(Some(value), &ParseOptions::default()).force()
    }

    #[test]
    fn test_compose_skips_passthrough() {
        let trim = Getter::trim();
        assert!(Getter::passthrough().compose(&Getter::passthrough()).is_passthrough());
        assert!(!Getter::passthrough().compose(&trim).is_passthrough());
        let both = trim.compose(&Getter::to_upper_case());
        assert_eq!(run(&both, Value::from(" ab ")).unwrap(), Some(Value::from("AB")));
    }

    #[test]
    fn test_on_none_and_defaults() {
        let getter = Getter::with_default(Value::from(1));
        let out = getter.run(None, &ParseOptions::default()).force().unwrap();
        assert_eq!(out, Some(Value::from(1)));
        let required = Getter::required();
        assert!(required.run(None, &ParseOptions::default()).force().is_err());
    }

    #[test]
    fn test_coercions() {
        assert_eq!(coerce_number(&Value::from(" 12 ")), 12.0);
        assert!(coerce_number(&Value::from("abc")).is_nan());
        assert!(coerce_number(&Value::from("inf")).is_nan());
        assert_eq!(coerce_number(&Value::from("")), 0.0);
        assert_eq!(coerce_bigint(&Value::from("42")), Some(42));
        assert_eq!(coerce_bigint(&Value::from(1.5)), None);
        assert_eq!(coerce_string(&Value::from(1.5)), Some(Value::from("1.5")));
    }

    #[test]
    fn test_base64_and_hex() {
        assert_eq!(run(&Getter::encode_base64(), Value::from("hi")).unwrap(), Some(Value::from("aGk=")));
        assert_eq!(run(&Getter::decode_base64(), Value::from("aGk=")).unwrap(), Some(Value::from("hi")));
        assert_eq!(run(&Getter::encode_hex(), Value::from("hi")).unwrap(), Some(Value::from("6869")));
        assert_eq!(run(&Getter::decode_hex(), Value::from("6869")).unwrap(), Some(Value::from("hi")));
        assert!(run(&Getter::decode_hex(), Value::from("zz")).is_err());
        assert!(run(&Getter::decode_base64(), Value::from("*")).is_err());
    }

    #[test]
    fn test_json_parse_failure_is_invalid_value() {
        let issue = run(&Getter::parse_json(), Value::from("{")).unwrap_err();
        assert_eq!(issue.tag(), "InvalidValue");
        let ok = run(&Getter::parse_json(), Value::from(r#"{"a":1}"#)).unwrap().unwrap();
        assert_eq!(ok.to_json(), Some(serde_json::json!({"a": 1})));
    }
}
