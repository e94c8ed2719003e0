//! Validation issues
//!
//! Issues are plain data. Leaves describe a single failure; wrappers attach
//! a path segment (`Pointer`), a failed check (`Filter`), a failed
//! transformation step (`Encoding`) or a set of sibling failures
//! (`Composite`, `AnyOf`). Rendering is a separate fold, see [`formatter`].

pub mod formatter;

use thiserror::Error;

use crate::ast::annotations::{self, Annotations};
use crate::ast::{Ast, Filter};
use crate::value::{PropertyKey, Value};

pub use formatter::{Formatter, LeafIssue, StandardFailure, StandardIssue};

#[derive(Debug, Clone)]
pub enum Issue {
    /// The input has the wrong runtime type for `ast`
    InvalidType { ast: Ast, actual: Option<Value> },
    /// A check or transformation rejected a well-typed value
    InvalidValue {
        actual: Option<Value>,
        annotations: Option<Annotations>,
    },
    MissingKey { annotations: Option<Annotations> },
    UnexpectedKey { ast: Ast, actual: Option<Value> },
    Forbidden {
        actual: Option<Value>,
        annotations: Option<Annotations>,
    },
    /// More than one member of a `oneOf` union matched
    OneOf {
        ast: Ast,
        actual: Value,
        successes: Vec<Ast>,
    },
    Filter {
        actual: Value,
        filter: Filter,
        issue: Box<Issue>,
    },
    Encoding {
        ast: Ast,
        actual: Option<Value>,
        issue: Box<Issue>,
    },
    Pointer {
        path: Vec<PropertyKey>,
        issue: Box<Issue>,
    },
    Composite {
        ast: Ast,
        actual: Option<Value>,
        issues: Vec<Issue>,
    },
    /// No union member matched
    AnyOf {
        ast: Ast,
        actual: Value,
        issues: Vec<Issue>,
    },
}

impl Issue {
    pub fn tag(&self) -> &'static str {
        match self {
            Issue::InvalidType { .. } => "InvalidType",
            Issue::InvalidValue { .. } => "InvalidValue",
            Issue::MissingKey { .. } => "MissingKey",
            Issue::UnexpectedKey { .. } => "UnexpectedKey",
            Issue::Forbidden { .. } => "Forbidden",
            Issue::OneOf { .. } => "OneOf",
            Issue::Filter { .. } => "Filter",
            Issue::Encoding { .. } => "Encoding",
            Issue::Pointer { .. } => "Pointer",
            Issue::Composite { .. } => "Composite",
            Issue::AnyOf { .. } => "AnyOf",
        }
    }

    pub fn invalid_type(ast: &Ast, actual: Option<Value>) -> Self {
        Issue::InvalidType {
            ast: ast.clone(),
            actual,
        }
    }

    pub fn invalid_value(actual: Option<Value>, message: impl Into<String>) -> Self {
        Issue::InvalidValue {
            actual,
            annotations: Some(Annotations::new().with(annotations::MESSAGE, message.into())),
        }
    }

    pub fn forbidden(actual: Option<Value>, message: impl Into<String>) -> Self {
        Issue::Forbidden {
            actual,
            annotations: Some(Annotations::new().with(annotations::MESSAGE, message.into())),
        }
    }

    /// Prefix `issue` with `path`; nested pointers are merged
    pub fn pointer(path: Vec<PropertyKey>, issue: Issue) -> Self {
        if path.is_empty() {
            return issue;
        }
        match issue {
            Issue::Pointer { path: inner, issue } => Issue::Pointer {
                path: path.into_iter().chain(inner).collect(),
                issue,
            },
            other => Issue::Pointer {
                path,
                issue: Box::new(other),
            },
        }
    }

    /// The actual value carried by this issue, if any
    pub fn actual(&self) -> Option<&Value> {
        match self {
            Issue::InvalidType { actual, .. }
            | Issue::InvalidValue { actual, .. }
            | Issue::UnexpectedKey { actual, .. }
            | Issue::Forbidden { actual, .. }
            | Issue::Encoding { actual, .. }
            | Issue::Composite { actual, .. } => actual.as_ref(),
            Issue::OneOf { actual, .. } | Issue::Filter { actual, .. } | Issue::AnyOf { actual, .. } => {
                Some(actual)
            }
            Issue::MissingKey { .. } | Issue::Pointer { .. } => None,
        }
    }

    /// A copy with every actual value hidden
    pub fn redact(&self) -> Issue {
        let hide = |actual: &Option<Value>| actual.clone().map(Value::redacted);
        match self {
            Issue::InvalidType { ast, actual } => Issue::InvalidType {
                ast: ast.clone(),
                actual: hide(actual),
            },
            Issue::InvalidValue { actual, annotations } => Issue::InvalidValue {
                actual: hide(actual),
                annotations: annotations.clone(),
            },
            Issue::MissingKey { annotations } => Issue::MissingKey {
                annotations: annotations.clone(),
            },
            Issue::UnexpectedKey { ast, actual } => Issue::UnexpectedKey {
                ast: ast.clone(),
                actual: hide(actual),
            },
            Issue::Forbidden { actual, annotations } => Issue::Forbidden {
                actual: hide(actual),
                annotations: annotations.clone(),
            },
            Issue::OneOf {
                ast,
                actual,
                successes,
            } => Issue::OneOf {
                ast: ast.clone(),
                actual: actual.clone().redacted(),
                successes: successes.clone(),
            },
            Issue::Filter {
                actual,
                filter,
                issue,
            } => Issue::Filter {
                actual: actual.clone().redacted(),
                filter: filter.clone(),
                issue: Box::new(issue.redact()),
            },
            Issue::Encoding { ast, actual, issue } => Issue::Encoding {
                ast: ast.clone(),
                actual: hide(actual),
                issue: Box::new(issue.redact()),
            },
            Issue::Pointer { path, issue } => Issue::Pointer {
                path: path.clone(),
                issue: Box::new(issue.redact()),
            },
            Issue::Composite { ast, actual, issues } => Issue::Composite {
                ast: ast.clone(),
                actual: hide(actual),
                issues: issues.iter().map(Issue::redact).collect(),
            },
            Issue::AnyOf { ast, actual, issues } => Issue::AnyOf {
                ast: ast.clone(),
                actual: actual.clone().redacted(),
                issues: issues.iter().map(Issue::redact).collect(),
            },
        }
    }
}

/// A failed synchronous parse, rendered with the default formatter
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ParseError {
    pub issue: Issue,
    message: String,
}

impl ParseError {
    pub fn new(issue: Issue) -> Self {
        let message = Formatter::default().format(&issue);
        Self { issue, message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Issue> for ParseError {
    fn from(issue: Issue) -> Self {
        ParseError::new(issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;

    #[test]
    fn test_pointer_merges_paths() {
        let inner = Issue::pointer(vec![PropertyKey::from("b")], Issue::MissingKey { annotations: None });
        let outer = Issue::pointer(vec![PropertyKey::from("a")], inner);
        match outer {
            Issue::Pointer { path, issue } => {
                assert_eq!(path, vec![PropertyKey::from("a"), PropertyKey::from("b")]);
                assert_eq!(issue.tag(), "MissingKey");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redact_hides_actuals() {
        let issue = Issue::pointer(
            vec![PropertyKey::from("password")],
            Issue::invalid_type(&ast::number(), Some(Value::from("hunter2"))),
        );
        let text = Formatter::default().format(&issue.redact());
        assert!(!text.contains("hunter2"));
        assert!(text.contains("<redacted>"));
    }
}
