//! Bidirectional transformations and encoding links
//!
//! A [`Transformation`] pairs a decode getter with an encode getter and is
//! flipped by swapping them. A [`Middleware`] wraps the whole parse result of
//! its source node instead of a single value (used to recover from failures).
//! A [`Link`] attaches either one to the node it transforms from.

use chrono::SecondsFormat;
use std::fmt;
use std::sync::Arc;

use crate::ast::Ast;
use crate::effect::SchemaResult;
use crate::getter::Getter;
use crate::issue::Issue;
use crate::parser::ParseOptions;
use crate::value::{Symbol, Value};

#[derive(Clone)]
pub struct Transformation {
    pub decode: Getter,
    pub encode: Getter,
}

impl Transformation {
    pub fn new(decode: Getter, encode: Getter) -> Self {
        Self { decode, encode }
    }

    pub fn passthrough() -> Self {
        Self::new(Getter::passthrough(), Getter::passthrough())
    }

    pub fn is_passthrough(&self) -> bool {
        self.decode.is_passthrough() && self.encode.is_passthrough()
    }

    pub fn flip(&self) -> Self {
        Self::new(self.encode.clone(), self.decode.clone())
    }

    /// `self` then `other`, in the decode direction
    pub fn compose(&self, other: &Transformation) -> Self {
        Self::new(self.decode.compose(&other.decode), other.encode.compose(&self.encode))
    }

    /// Infallible mapping in both directions
    pub fn transform<D, E>(decode: D, encode: E) -> Self
    where
        D: Fn(Value) -> Value + Send + Sync + 'static,
        E: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::new(Getter::transform(decode), Getter::transform(encode))
    }

    pub fn transform_or_fail<D, E>(decode: D, encode: E) -> Self
    where
        D: Fn(Value, &ParseOptions) -> Result<Value, Issue> + Send + Sync + 'static,
        E: Fn(Value, &ParseOptions) -> Result<Value, Issue> + Send + Sync + 'static,
    {
        Self::new(Getter::transform_or_fail(decode), Getter::transform_or_fail(encode))
    }
}

pub type MiddlewareFn = Arc<
    dyn Fn(SchemaResult<Option<Value>>, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync,
>;

#[derive(Clone)]
pub struct Middleware {
    pub decode: MiddlewareFn,
    pub encode: MiddlewareFn,
}

impl Middleware {
    pub fn new(decode: MiddlewareFn, encode: MiddlewareFn) -> Self {
        Self { decode, encode }
    }

    pub fn flip(&self) -> Self {
        Self::new(self.encode.clone(), self.decode.clone())
    }
}

#[derive(Clone)]
pub enum LinkTransformation {
    Transformation(Transformation),
    Middleware(Middleware),
}

impl LinkTransformation {
    pub fn flip(&self) -> Self {
        match self {
            LinkTransformation::Transformation(t) => LinkTransformation::Transformation(t.flip()),
            LinkTransformation::Middleware(m) => LinkTransformation::Middleware(m.flip()),
        }
    }
}

impl From<Transformation> for LinkTransformation {
    fn from(t: Transformation) -> Self {
        LinkTransformation::Transformation(t)
    }
}

impl From<Middleware> for LinkTransformation {
    fn from(m: Middleware) -> Self {
        LinkTransformation::Middleware(m)
    }
}

/// One step of an encoding chain: `to` is the node being transformed from
#[derive(Clone)]
pub struct Link {
    pub to: Ast,
    pub transformation: LinkTransformation,
}

impl Link {
    pub fn new(to: Ast, transformation: impl Into<LinkTransformation>) -> Self {
        Self {
            to,
            transformation: transformation.into(),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.transformation {
            LinkTransformation::Transformation(_) => "Transformation",
            LinkTransformation::Middleware(_) => "Middleware",
        };
        write!(f, "Link({} <- {})", kind, self.to)
    }
}

// =============================================================================
// Built-in transformations
// =============================================================================

pub fn number_from_string() -> Transformation {
    Transformation::new(Getter::number(), Getter::string())
}

pub fn bigint_from_string() -> Transformation {
    Transformation::new(Getter::bigint(), Getter::string())
}

/// Registered symbols only: encoding an unregistered symbol is `Forbidden`
pub fn symbol_from_string() -> Transformation {
    Transformation::new(
        Getter::transform_or_fail(|value, _| match &value {
            Value::String(key) => Ok(Value::Symbol(Symbol::for_key(key))),
            _ => Err(Issue::invalid_value(Some(value.clone()), "expected a string")),
        }),
        Getter::transform_or_fail(|value, _| match &value {
            Value::Symbol(symbol) => match symbol.key_for() {
                Some(key) => Ok(Value::String(key.to_string())),
                None => Err(Issue::forbidden(
                    Some(value.clone()),
                    format!("cannot serialize to string, {} is not registered", symbol),
                )),
            },
            _ => Err(Issue::invalid_value(Some(value.clone()), "expected a symbol")),
        }),
    )
}

pub fn date_from_string() -> Transformation {
    Transformation::new(
        Getter::date(),
        Getter::transform_or_fail(|value, _| match &value {
            Value::Date(d) => Ok(Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))),
            _ => Err(Issue::invalid_value(Some(value.clone()), "expected a Date")),
        }),
    )
}

pub fn trim() -> Transformation {
    Transformation::new(Getter::trim(), Getter::passthrough())
}

pub fn to_lower_case() -> Transformation {
    Transformation::new(Getter::to_lower_case(), Getter::passthrough())
}

pub fn to_upper_case() -> Transformation {
    Transformation::new(Getter::to_upper_case(), Getter::passthrough())
}

/// Decodes base64 text into the string it encodes
pub fn string_from_base64() -> Transformation {
    Transformation::new(Getter::decode_base64(), Getter::encode_base64())
}

pub fn string_from_base64_url() -> Transformation {
    Transformation::new(Getter::decode_base64_url(), Getter::encode_base64_url())
}

pub fn string_from_hex() -> Transformation {
    Transformation::new(Getter::decode_hex(), Getter::encode_hex())
}

/// Decodes a JSON string into the value it holds
pub fn from_json_string() -> Transformation {
    Transformation::new(Getter::parse_json(), Getter::stringify_json())
}

/// Bracket-path entries into a nested record
pub fn tree_record() -> Transformation {
    Transformation::new(Getter::make_tree_record(), Getter::collect_bracket_path_entries())
}

/// Absent or `undefined` input decodes to `value`
pub fn with_decoding_default(value: Value) -> Transformation {
    Transformation::new(Getter::with_default(value), Getter::passthrough())
}

/// Absent or `undefined` input encodes to `value`
pub fn with_encoding_default(value: Value) -> Transformation {
    Transformation::new(Getter::passthrough(), Getter::with_default(value))
}

/// An optional encoded key decoding to a required one; encoding drops
/// values equal to `default`
pub fn optional_to_required(default: Value) -> Transformation {
    let dropped = default.clone();
    Transformation::new(
        Getter::with_default(default),
        Getter::transform_optional(move |input| input.filter(|v| v != &dropped)),
    )
}

/// Substitute `fallback` when decoding the source fails
pub fn catch_decoding(fallback: Value) -> Middleware {
    Middleware::new(
        Arc::new(move |result, _| {
            let fallback = fallback.clone();
            result.or_else(move |_| SchemaResult::succeed(Some(fallback)))
        }),
        Arc::new(|result, _| result),
    )
}

/// Coerce any value to a string when decoding
pub fn string_from_unknown() -> Transformation {
    Transformation::new(Getter::string(), Getter::passthrough())
}
