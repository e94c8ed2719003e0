//! Validation checks
//!
//! A check runs after a node's structural parse succeeded. Built-in checks
//! carry a [`CheckMeta`] describing them as data, which is what lets them
//! survive the trip through Representation, JSON Schema and generated code.
//! Checks built from bare closures work at runtime but have no meta.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::annotations::{self, Annotations};
use super::Ast;
use crate::issue::Issue;
use crate::parser::ParseOptions;
use crate::value::{format_number, Value};

/// Filter body: `None` means the value passed
pub type FilterFn = Arc<dyn Fn(&Value, &Ast, &ParseOptions) -> Option<Issue> + Send + Sync>;

/// A check attached to a schema node
#[derive(Clone)]
pub enum Check {
    Filter(Filter),
    FilterGroup(FilterGroup),
}

#[derive(Clone)]
pub struct Filter {
    pub run: FilterFn,
    pub annotations: Annotations,
    /// Stop running the remaining checks when this one fails
    pub abort: bool,
    pub meta: Option<CheckMeta>,
}

/// Several filters reported under one set of annotations
#[derive(Clone)]
pub struct FilterGroup {
    pub checks: Vec<Filter>,
    pub annotations: Annotations,
}

impl Filter {
    pub fn new(run: FilterFn, annotations: Annotations) -> Self {
        Self {
            run,
            annotations,
            abort: false,
            meta: None,
        }
    }

    /// Build a filter from a predicate; failures become `InvalidValue`
    pub fn predicate<F>(predicate: F, annotations: Annotations) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(
            Arc::new(move |value, _, _| {
                if predicate(value) {
                    None
                } else {
                    Some(Issue::InvalidValue {
                        actual: Some(value.clone()),
                        annotations: None,
                    })
                }
            }),
            annotations,
        )
    }

    pub fn from_meta(meta: CheckMeta) -> Self {
        let run: FilterFn = match meta.compile() {
            Ok(test) => Arc::new(move |value, _, _| {
                if test(value) {
                    None
                } else {
                    Some(Issue::InvalidValue {
                        actual: Some(value.clone()),
                        annotations: None,
                    })
                }
            }),
            Err(message) => Arc::new(move |value, _, _| {
                Some(Issue::invalid_value(Some(value.clone()), message.clone()))
            }),
        };
        Self {
            run,
            annotations: Annotations::new(),
            abort: false,
            meta: Some(meta),
        }
    }

    pub fn abort(mut self) -> Self {
        self.abort = true;
        self
    }

    pub fn annotate(mut self, annotations: &Annotations) -> Self {
        self.annotations = self.annotations.merge(annotations);
        self
    }

    /// Human description used in "Expected {description}, got {actual}"
    pub fn description(&self) -> String {
        if let Some(text) = self
            .annotations
            .get_str(annotations::EXPECTED)
            .or_else(|| self.annotations.get_str(annotations::DESCRIPTION))
        {
            return text.to_string();
        }
        match &self.meta {
            Some(meta) => meta.description(),
            None => "<filter>".to_string(),
        }
    }

    /// Short label used when formatting a schema (`string & minLength(3)`)
    pub fn label(&self) -> String {
        if let Some(title) = self.annotations.get_str(annotations::TITLE) {
            return title.to_string();
        }
        match &self.meta {
            Some(meta) => meta.label(),
            None => "<filter>".to_string(),
        }
    }
}

impl Check {
    pub fn from_meta(meta: CheckMeta) -> Self {
        Check::Filter(Filter::from_meta(meta))
    }

    pub fn group(checks: Vec<Filter>, annotations: Annotations) -> Self {
        Check::FilterGroup(FilterGroup {
            checks,
            annotations,
        })
    }

    pub fn annotations(&self) -> &Annotations {
        match self {
            Check::Filter(filter) => &filter.annotations,
            Check::FilterGroup(group) => &group.annotations,
        }
    }

    pub fn annotate(&self, annotations: &Annotations) -> Check {
        match self {
            Check::Filter(filter) => Check::Filter(filter.clone().annotate(annotations)),
            Check::FilterGroup(group) => Check::FilterGroup(FilterGroup {
                checks: group.checks.clone(),
                annotations: group.annotations.merge(annotations),
            }),
        }
    }

    /// Stop running later checks when this one fails
    pub fn abort(&self) -> Check {
        match self {
            Check::Filter(filter) => Check::Filter(filter.clone().abort()),
            Check::FilterGroup(group) => Check::FilterGroup(FilterGroup {
                checks: group.checks.iter().cloned().map(Filter::abort).collect(),
                annotations: group.annotations.clone(),
            }),
        }
    }

    /// Every filter, groups flattened
    pub fn filters(&self) -> Vec<&Filter> {
        match self {
            Check::Filter(filter) => vec![filter],
            Check::FilterGroup(group) => group.checks.iter().collect(),
        }
    }

    /// Whether every filter carries a meta
    pub fn is_representable(&self) -> bool {
        self.filters().iter().all(|f| f.meta.is_some())
    }

    pub fn label(&self) -> String {
        match self {
            Check::Filter(filter) => filter.label(),
            Check::FilterGroup(group) => group
                .annotations
                .get_str(annotations::TITLE)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    group
                        .checks
                        .iter()
                        .map(Filter::label)
                        .collect::<Vec<_>>()
                        .join(" & ")
                }),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({})", self.label())
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Filter(filter) => filter.fmt(f),
            Check::FilterGroup(group) => f.debug_list().entries(group.checks.iter()).finish(),
        }
    }
}

// =============================================================================
// Check Meta
// =============================================================================

/// Data description of a built-in check.
///
/// Length checks apply to strings (characters) and arrays (elements);
/// size checks apply to arrays and objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag")]
pub enum CheckMeta {
    // strings and arrays
    #[serde(rename = "isMinLength", rename_all = "camelCase")]
    MinLength { min_length: usize },
    #[serde(rename = "isMaxLength", rename_all = "camelCase")]
    MaxLength { max_length: usize },
    #[serde(rename = "isLength")]
    Length { length: usize },

    // strings
    #[serde(rename = "isPattern")]
    Pattern { regex: String },
    #[serde(rename = "isTrimmed")]
    Trimmed,
    #[serde(rename = "isLowercased")]
    Lowercased,
    #[serde(rename = "isUppercased")]
    Uppercased,
    #[serde(rename = "isStartsWith", rename_all = "camelCase")]
    StartsWith { starts_with: String },
    #[serde(rename = "isEndsWith", rename_all = "camelCase")]
    EndsWith { ends_with: String },
    #[serde(rename = "isIncludes")]
    Includes { includes: String },

    // numbers
    #[serde(rename = "isInt")]
    Int,
    #[serde(rename = "isFinite")]
    Finite,
    #[serde(rename = "isGreaterThan", rename_all = "camelCase")]
    GreaterThan { exclusive_minimum: f64 },
    #[serde(rename = "isGreaterThanOrEqualTo")]
    GreaterThanOrEqualTo { minimum: f64 },
    #[serde(rename = "isLessThan", rename_all = "camelCase")]
    LessThan { exclusive_maximum: f64 },
    #[serde(rename = "isLessThanOrEqualTo")]
    LessThanOrEqualTo { maximum: f64 },
    #[serde(rename = "isBetween")]
    Between { minimum: f64, maximum: f64 },
    #[serde(rename = "isMultipleOf")]
    MultipleOf { divisor: f64 },

    // bigints, bounds kept as decimal strings
    #[serde(rename = "isGreaterThanOrEqualToBigInt")]
    GreaterThanOrEqualToBigInt { minimum: String },
    #[serde(rename = "isLessThanOrEqualToBigInt")]
    LessThanOrEqualToBigInt { maximum: String },

    // arrays
    #[serde(rename = "isUnique")]
    Unique,

    // objects
    #[serde(rename = "isMinProperties", rename_all = "camelCase")]
    MinProperties { min_properties: usize },
    #[serde(rename = "isMaxProperties", rename_all = "camelCase")]
    MaxProperties { max_properties: usize },
    #[serde(rename = "isPropertiesLength")]
    PropertiesLength { length: usize },

    // dates
    #[serde(rename = "isValidDate")]
    ValidDate,
    #[serde(rename = "isGreaterThanDate")]
    GreaterThanDate { date: DateTime<Utc> },
    #[serde(rename = "isLessThanDate")]
    LessThanDate { date: DateTime<Utc> },

    // sizes
    #[serde(rename = "isMinSize", rename_all = "camelCase")]
    MinSize { min_size: usize },
    #[serde(rename = "isMaxSize", rename_all = "camelCase")]
    MaxSize { max_size: usize },
    #[serde(rename = "isSize")]
    Size { size: usize },
}

type Test = Box<dyn Fn(&Value) -> bool + Send + Sync>;

impl CheckMeta {
    /// The serialized tag, e.g. `isMinLength`
    pub fn tag(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("_tag").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default()
    }

    /// Unit checks carry no payload; repeating one adds nothing
    pub fn is_unit(&self) -> bool {
        matches!(
            self,
            CheckMeta::Trimmed
                | CheckMeta::Lowercased
                | CheckMeta::Uppercased
                | CheckMeta::Int
                | CheckMeta::Finite
                | CheckMeta::Unique
                | CheckMeta::ValidDate
        )
    }

    fn compile(&self) -> std::result::Result<Test, String> {
        let test: Test = match self.clone() {
            CheckMeta::MinLength { min_length } => Box::new(move |v| length(v).map_or(false, |n| n >= min_length)),
            CheckMeta::MaxLength { max_length } => Box::new(move |v| length(v).map_or(false, |n| n <= max_length)),
            CheckMeta::Length { length: expected } => Box::new(move |v| length(v) == Some(expected)),
            CheckMeta::Pattern { regex } => {
                let re = Regex::new(&regex)
                    .map_err(|e| format!("invalid regular expression {}: {}", regex, e))?;
                Box::new(move |v| v.as_str().map_or(false, |s| re.is_match(s)))
            }
            CheckMeta::Trimmed => Box::new(|v| v.as_str().map_or(false, |s| s.trim() == s)),
            CheckMeta::Lowercased => Box::new(|v| v.as_str().map_or(false, |s| s.to_lowercase() == s)),
            CheckMeta::Uppercased => Box::new(|v| v.as_str().map_or(false, |s| s.to_uppercase() == s)),
            CheckMeta::StartsWith { starts_with } => {
                Box::new(move |v| v.as_str().map_or(false, |s| s.starts_with(starts_with.as_str())))
            }
            CheckMeta::EndsWith { ends_with } => {
                Box::new(move |v| v.as_str().map_or(false, |s| s.ends_with(ends_with.as_str())))
            }
            CheckMeta::Includes { includes } => {
                Box::new(move |v| v.as_str().map_or(false, |s| s.contains(includes.as_str())))
            }
            CheckMeta::Int => Box::new(|v| v.as_f64().map_or(false, |n| n.is_finite() && n.fract() == 0.0)),
            CheckMeta::Finite => Box::new(|v| v.as_f64().map_or(false, f64::is_finite)),
            CheckMeta::GreaterThan { exclusive_minimum } => {
                Box::new(move |v| v.as_f64().map_or(false, |n| n > exclusive_minimum))
            }
            CheckMeta::GreaterThanOrEqualTo { minimum } => {
                Box::new(move |v| v.as_f64().map_or(false, |n| n >= minimum))
            }
            CheckMeta::LessThan { exclusive_maximum } => {
                Box::new(move |v| v.as_f64().map_or(false, |n| n < exclusive_maximum))
            }
            CheckMeta::LessThanOrEqualTo { maximum } => {
                Box::new(move |v| v.as_f64().map_or(false, |n| n <= maximum))
            }
            CheckMeta::Between { minimum, maximum } => {
                Box::new(move |v| v.as_f64().map_or(false, |n| n >= minimum && n <= maximum))
            }
            CheckMeta::MultipleOf { divisor } => Box::new(move |v| {
                v.as_f64().map_or(false, |n| divisor != 0.0 && (n / divisor).fract() == 0.0)
            }),
            CheckMeta::GreaterThanOrEqualToBigInt { minimum } => {
                let min: i128 = minimum
                    .parse()
                    .map_err(|_| format!("invalid bigint bound {}", minimum))?;
                Box::new(move |v| v.as_bigint().map_or(false, |n| n >= min))
            }
            CheckMeta::LessThanOrEqualToBigInt { maximum } => {
                let max: i128 = maximum
                    .parse()
                    .map_err(|_| format!("invalid bigint bound {}", maximum))?;
                Box::new(move |v| v.as_bigint().map_or(false, |n| n <= max))
            }
            CheckMeta::Unique => Box::new(|v| {
                v.as_array().map_or(false, |items| {
                    items
                        .iter()
                        .enumerate()
                        .all(|(i, a)| items[..i].iter().all(|b| a != b))
                })
            }),
            CheckMeta::MinProperties { min_properties } => {
                Box::new(move |v| v.as_object().map_or(false, |r| r.len() >= min_properties))
            }
            CheckMeta::MaxProperties { max_properties } => {
                Box::new(move |v| v.as_object().map_or(false, |r| r.len() <= max_properties))
            }
            CheckMeta::PropertiesLength { length } => {
                Box::new(move |v| v.as_object().map_or(false, |r| r.len() == length))
            }
            // a Value::Date always holds a valid instant
            CheckMeta::ValidDate => Box::new(|v| v.as_date().is_some()),
            CheckMeta::GreaterThanDate { date } => Box::new(move |v| v.as_date().map_or(false, |d| *d > date)),
            CheckMeta::LessThanDate { date } => Box::new(move |v| v.as_date().map_or(false, |d| *d < date)),
            CheckMeta::MinSize { min_size } => Box::new(move |v| size(v).map_or(false, |n| n >= min_size)),
            CheckMeta::MaxSize { max_size } => Box::new(move |v| size(v).map_or(false, |n| n <= max_size)),
            CheckMeta::Size { size: expected } => Box::new(move |v| size(v) == Some(expected)),
        };
        Ok(test)
    }

    pub fn description(&self) -> String {
        match self {
            CheckMeta::MinLength { min_length } => format!("a value with a length of at least {}", min_length),
            CheckMeta::MaxLength { max_length } => format!("a value with a length of at most {}", max_length),
            CheckMeta::Length { length } => format!("a value with a length of {}", length),
            CheckMeta::Pattern { regex } => format!("a string matching the regex {}", regex),
            CheckMeta::Trimmed => "a string with no leading or trailing whitespace".to_string(),
            CheckMeta::Lowercased => "a string with all characters in lowercase".to_string(),
            CheckMeta::Uppercased => "a string with all characters in uppercase".to_string(),
            CheckMeta::StartsWith { starts_with } => format!("a string starting with {:?}", starts_with),
            CheckMeta::EndsWith { ends_with } => format!("a string ending with {:?}", ends_with),
            CheckMeta::Includes { includes } => format!("a string including {:?}", includes),
            CheckMeta::Int => "an integer".to_string(),
            CheckMeta::Finite => "a finite number".to_string(),
            CheckMeta::GreaterThan { exclusive_minimum } => {
                format!("a value greater than {}", format_number(*exclusive_minimum))
            }
            CheckMeta::GreaterThanOrEqualTo { minimum } => {
                format!("a value greater than or equal to {}", format_number(*minimum))
            }
            CheckMeta::LessThan { exclusive_maximum } => {
                format!("a value less than {}", format_number(*exclusive_maximum))
            }
            CheckMeta::LessThanOrEqualTo { maximum } => {
                format!("a value less than or equal to {}", format_number(*maximum))
            }
            CheckMeta::Between { minimum, maximum } => format!(
                "a value between {} and {}",
                format_number(*minimum),
                format_number(*maximum)
            ),
            CheckMeta::MultipleOf { divisor } => format!("a value that is a multiple of {}", format_number(*divisor)),
            CheckMeta::GreaterThanOrEqualToBigInt { minimum } => {
                format!("a value greater than or equal to {}n", minimum)
            }
            CheckMeta::LessThanOrEqualToBigInt { maximum } => {
                format!("a value less than or equal to {}n", maximum)
            }
            CheckMeta::Unique => "an array with unique items".to_string(),
            CheckMeta::MinProperties { min_properties } => {
                format!("an object with at least {} properties", min_properties)
            }
            CheckMeta::MaxProperties { max_properties } => {
                format!("an object with at most {} properties", max_properties)
            }
            CheckMeta::PropertiesLength { length } => format!("an object with exactly {} properties", length),
            CheckMeta::ValidDate => "a valid date".to_string(),
            CheckMeta::GreaterThanDate { date } => format!("a date after {}", date.to_rfc3339()),
            CheckMeta::LessThanDate { date } => format!("a date before {}", date.to_rfc3339()),
            CheckMeta::MinSize { min_size } => format!("a value with a size of at least {}", min_size),
            CheckMeta::MaxSize { max_size } => format!("a value with a size of at most {}", max_size),
            CheckMeta::Size { size } => format!("a value with a size of {}", size),
        }
    }

    pub fn label(&self) -> String {
        match self {
            CheckMeta::MinLength { min_length } => format!("minLength({})", min_length),
            CheckMeta::MaxLength { max_length } => format!("maxLength({})", max_length),
            CheckMeta::Length { length } => format!("length({})", length),
            CheckMeta::Pattern { regex } => format!("pattern({})", regex),
            CheckMeta::Trimmed => "trimmed".to_string(),
            CheckMeta::Lowercased => "lowercased".to_string(),
            CheckMeta::Uppercased => "uppercased".to_string(),
            CheckMeta::StartsWith { starts_with } => format!("startsWith({:?})", starts_with),
            CheckMeta::EndsWith { ends_with } => format!("endsWith({:?})", ends_with),
            CheckMeta::Includes { includes } => format!("includes({:?})", includes),
            CheckMeta::Int => "int".to_string(),
            CheckMeta::Finite => "finite".to_string(),
            CheckMeta::GreaterThan { exclusive_minimum } => format!("greaterThan({})", format_number(*exclusive_minimum)),
            CheckMeta::GreaterThanOrEqualTo { minimum } => {
                format!("greaterThanOrEqualTo({})", format_number(*minimum))
            }
            CheckMeta::LessThan { exclusive_maximum } => format!("lessThan({})", format_number(*exclusive_maximum)),
            CheckMeta::LessThanOrEqualTo { maximum } => format!("lessThanOrEqualTo({})", format_number(*maximum)),
            CheckMeta::Between { minimum, maximum } => {
                format!("between({}, {})", format_number(*minimum), format_number(*maximum))
            }
            CheckMeta::MultipleOf { divisor } => format!("multipleOf({})", format_number(*divisor)),
            CheckMeta::GreaterThanOrEqualToBigInt { minimum } => format!("greaterThanOrEqualTo({}n)", minimum),
            CheckMeta::LessThanOrEqualToBigInt { maximum } => format!("lessThanOrEqualTo({}n)", maximum),
            CheckMeta::Unique => "unique".to_string(),
            CheckMeta::MinProperties { min_properties } => format!("minProperties({})", min_properties),
            CheckMeta::MaxProperties { max_properties } => format!("maxProperties({})", max_properties),
            CheckMeta::PropertiesLength { length } => format!("propertiesLength({})", length),
            CheckMeta::ValidDate => "validDate".to_string(),
            CheckMeta::GreaterThanDate { date } => format!("greaterThanDate({})", date.to_rfc3339()),
            CheckMeta::LessThanDate { date } => format!("lessThanDate({})", date.to_rfc3339()),
            CheckMeta::MinSize { min_size } => format!("minSize({})", min_size),
            CheckMeta::MaxSize { max_size } => format!("maxSize({})", max_size),
            CheckMeta::Size { size } => format!("size({})", size),
        }
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(_) | Value::Array(_) => value.length(),
        _ => None,
    }
}

fn size(value: &Value) -> Option<usize> {
    match value {
        Value::Array(_) | Value::Object(_) => value.length(),
        _ => None,
    }
}

// =============================================================================
// Constructors
// =============================================================================

pub fn is_min_length(min_length: usize) -> Check {
    Check::from_meta(CheckMeta::MinLength { min_length })
}

pub fn is_max_length(max_length: usize) -> Check {
    Check::from_meta(CheckMeta::MaxLength { max_length })
}

pub fn is_length(length: usize) -> Check {
    Check::from_meta(CheckMeta::Length { length })
}

/// An invalid regular expression yields a check that always fails with
/// `InvalidValue` naming the compile error.
pub fn is_pattern(regex: impl Into<String>) -> Check {
    Check::from_meta(CheckMeta::Pattern { regex: regex.into() })
}

pub fn is_trimmed() -> Check {
    Check::from_meta(CheckMeta::Trimmed)
}

pub fn is_lowercased() -> Check {
    Check::from_meta(CheckMeta::Lowercased)
}

pub fn is_uppercased() -> Check {
    Check::from_meta(CheckMeta::Uppercased)
}

pub fn is_starts_with(prefix: impl Into<String>) -> Check {
    Check::from_meta(CheckMeta::StartsWith { starts_with: prefix.into() })
}

pub fn is_ends_with(suffix: impl Into<String>) -> Check {
    Check::from_meta(CheckMeta::EndsWith { ends_with: suffix.into() })
}

pub fn is_includes(needle: impl Into<String>) -> Check {
    Check::from_meta(CheckMeta::Includes { includes: needle.into() })
}

pub fn is_int() -> Check {
    Check::from_meta(CheckMeta::Int)
}

pub fn is_finite() -> Check {
    Check::from_meta(CheckMeta::Finite)
}

pub fn is_greater_than(exclusive_minimum: f64) -> Check {
    Check::from_meta(CheckMeta::GreaterThan { exclusive_minimum })
}

pub fn is_greater_than_or_equal_to(minimum: f64) -> Check {
    Check::from_meta(CheckMeta::GreaterThanOrEqualTo { minimum })
}

pub fn is_less_than(exclusive_maximum: f64) -> Check {
    Check::from_meta(CheckMeta::LessThan { exclusive_maximum })
}

pub fn is_less_than_or_equal_to(maximum: f64) -> Check {
    Check::from_meta(CheckMeta::LessThanOrEqualTo { maximum })
}

pub fn is_between(minimum: f64, maximum: f64) -> Check {
    Check::from_meta(CheckMeta::Between { minimum, maximum })
}

pub fn is_multiple_of(divisor: f64) -> Check {
    Check::from_meta(CheckMeta::MultipleOf { divisor })
}

pub fn is_greater_than_or_equal_to_bigint(minimum: i128) -> Check {
    Check::from_meta(CheckMeta::GreaterThanOrEqualToBigInt {
        minimum: minimum.to_string(),
    })
}

pub fn is_less_than_or_equal_to_bigint(maximum: i128) -> Check {
    Check::from_meta(CheckMeta::LessThanOrEqualToBigInt {
        maximum: maximum.to_string(),
    })
}

pub fn is_unique() -> Check {
    Check::from_meta(CheckMeta::Unique)
}

pub fn is_min_properties(min_properties: usize) -> Check {
    Check::from_meta(CheckMeta::MinProperties { min_properties })
}

pub fn is_max_properties(max_properties: usize) -> Check {
    Check::from_meta(CheckMeta::MaxProperties { max_properties })
}

pub fn is_properties_length(length: usize) -> Check {
    Check::from_meta(CheckMeta::PropertiesLength { length })
}

pub fn is_valid_date() -> Check {
    Check::from_meta(CheckMeta::ValidDate)
}

pub fn is_greater_than_date(date: DateTime<Utc>) -> Check {
    Check::from_meta(CheckMeta::GreaterThanDate { date })
}

pub fn is_less_than_date(date: DateTime<Utc>) -> Check {
    Check::from_meta(CheckMeta::LessThanDate { date })
}

pub fn is_min_size(min_size: usize) -> Check {
    Check::from_meta(CheckMeta::MinSize { min_size })
}

pub fn is_max_size(max_size: usize) -> Check {
    Check::from_meta(CheckMeta::MaxSize { max_size })
}

pub fn is_size(size: usize) -> Check {
    Check::from_meta(CheckMeta::Size { size })
}

/// A custom, non-representable check
/// Group built checks under one set of annotations; nested groups are flattened
pub fn group(checks: Vec<Check>, annotations: Annotations) -> Check {
    let filters = checks
        .into_iter()
        .flat_map(|check| match check {
            Check::Filter(filter) => vec![filter],
            Check::FilterGroup(group) => group.checks,
        })
        .collect();
    Check::group(filters, annotations)
}

pub fn make_filter<F>(predicate: F, annotations: Annotations) -> Check
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Check::Filter(Filter::predicate(predicate, annotations))
}
