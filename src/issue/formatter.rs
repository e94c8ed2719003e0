//! Issue rendering
//!
//! Formatting is a fold over the issue tree that produces leaves: a path from
//! the root of the input plus a message. The leaves are then joined into a
//! string, or collected into the standard failure shape.
//!
//! Message resolution at each leaf: an explicit `message` (or
//! `messageMissingKey` / `messageUnexpectedKey`) annotation, then the
//! formatter hook, then the built-in text for the issue tag.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Issue;
use crate::ast::annotations::{self, Annotations};
use crate::ast::format::format;
use crate::ast::Ast;
use crate::value::{PropertyKey, Value};

/// Overrides the built-in message for a leaf; `None` falls through
pub type MessageHook = Arc<dyn Fn(&Issue) -> Option<String> + Send + Sync>;

/// A single rendered failure
#[derive(Debug, Clone, PartialEq)]
pub struct LeafIssue {
    pub path: Vec<PropertyKey>,
    pub message: String,
}

/// `{ message, path }`, one per leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardIssue {
    pub message: String,
    pub path: Vec<PropertyKey>,
}

/// `{ issues: [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardFailure {
    pub issues: Vec<StandardIssue>,
}

#[derive(Clone, Default)]
pub struct Formatter {
    hook: Option<MessageHook>,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook<F>(hook: F) -> Self
    where
        F: Fn(&Issue) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    /// Every leaf of `issue` with its full path
    pub fn leaves(&self, issue: &Issue) -> Vec<LeafIssue> {
        let mut out = Vec::new();
        self.collect(issue, &mut Vec::new(), &mut out);
        out
    }

    /// Newline-joined messages, each followed by its path when it has one
    pub fn format(&self, issue: &Issue) -> String {
        self.leaves(issue)
            .iter()
            .map(|leaf| {
                if leaf.path.is_empty() {
                    leaf.message.clone()
                } else {
                    format!("{}\n  at {}", leaf.message, format_path(&leaf.path))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn standard(&self, issue: &Issue) -> StandardFailure {
        StandardFailure {
            issues: self
                .leaves(issue)
                .into_iter()
                .map(|leaf| StandardIssue {
                    message: leaf.message,
                    path: leaf.path,
                })
                .collect(),
        }
    }

    fn collect(&self, issue: &Issue, path: &mut Vec<PropertyKey>, out: &mut Vec<LeafIssue>) {
        match issue {
            Issue::Pointer { path: segment, issue } => {
                let depth = path.len();
                path.extend(segment.iter().cloned());
                self.collect(issue, path, out);
                path.truncate(depth);
            }
            Issue::Composite { issues, .. } => {
                for issue in issues {
                    self.collect(issue, path, out);
                }
            }
            Issue::AnyOf { ast, actual, issues } => {
                if let Some(message) = explicit(&ast.annotations, annotations::MESSAGE) {
                    return self.push(path, message, out);
                }
                if issues.is_empty() {
                    let message = self
                        .hooked(issue)
                        .unwrap_or_else(|| expected_got(&expected(ast), Some(actual)));
                    return self.push(path, message, out);
                }
                for issue in issues {
                    self.collect(issue, path, out);
                }
            }
            Issue::Encoding { ast, issue: inner, .. } => {
                match explicit(&ast.annotations, annotations::MESSAGE) {
                    Some(message) => self.push(path, message, out),
                    None => self.collect(inner, path, out),
                }
            }
            Issue::Filter {
                actual,
                filter,
                issue: inner,
            } => {
                if let Some(message) = explicit(&filter.annotations, annotations::MESSAGE) {
                    return self.push(path, message, out);
                }
                match inner.as_ref() {
                    Issue::InvalidValue { annotations, .. }
                        if annotations
                            .as_ref()
                            .and_then(|a| explicit(a, annotations::MESSAGE))
                            .is_none() =>
                    {
                        let message = self
                            .hooked(issue)
                            .unwrap_or_else(|| expected_got(&filter.description(), Some(actual)));
                        self.push(path, message, out)
                    }
                    _ => self.collect(inner, path, out),
                }
            }
            leaf => {
                let message = leaf_annotation(leaf)
                    .or_else(|| self.hooked(leaf))
                    .unwrap_or_else(|| default_message(leaf));
                self.push(path, message, out)
            }
        }
    }

    fn hooked(&self, issue: &Issue) -> Option<String> {
        self.hook.as_ref().and_then(|hook| hook(issue))
    }

    fn push(&self, path: &[PropertyKey], message: String, out: &mut Vec<LeafIssue>) {
        out.push(LeafIssue {
            path: path.to_vec(),
            message,
        });
    }
}

fn explicit(annotations: &Annotations, key: &str) -> Option<String> {
    annotations.get_str(key).map(str::to_string)
}

fn leaf_annotation(issue: &Issue) -> Option<String> {
    match issue {
        Issue::InvalidType { ast, .. } | Issue::OneOf { ast, .. } => {
            explicit(&ast.annotations, annotations::MESSAGE)
        }
        Issue::UnexpectedKey { ast, .. } => explicit(&ast.annotations, annotations::MESSAGE_UNEXPECTED_KEY),
        Issue::MissingKey { annotations } => annotations
            .as_ref()
            .and_then(|a| explicit(a, annotations::MESSAGE_MISSING_KEY)),
        Issue::InvalidValue { annotations, .. } | Issue::Forbidden { annotations, .. } => annotations
            .as_ref()
            .and_then(|a| explicit(a, annotations::MESSAGE)),
        _ => None,
    }
}

fn expected(ast: &Ast) -> String {
    ast.annotations
        .get_str(annotations::EXPECTED)
        .map(str::to_string)
        .unwrap_or_else(|| format(ast).to_string())
}

fn show(actual: Option<&Value>) -> String {
    match actual {
        Some(value) => value.to_string(),
        None => "no value provided".to_string(),
    }
}

fn expected_got(expected: &str, actual: Option<&Value>) -> String {
    format!("Expected {}, got {}", expected, show(actual))
}

/// Built-in text, keyed by tag
pub fn default_message(issue: &Issue) -> String {
    match issue {
        Issue::InvalidType { ast, actual } => expected_got(&expected(ast), actual.as_ref()),
        Issue::InvalidValue { actual, .. } => format!("Invalid data {}", show(actual.as_ref())),
        Issue::MissingKey { .. } => "Missing key".to_string(),
        Issue::UnexpectedKey { actual, .. } => {
            format!("Unexpected key with value {}", show(actual.as_ref()))
        }
        Issue::Forbidden { .. } => "Forbidden operation".to_string(),
        Issue::OneOf { actual, .. } => {
            format!("Expected exactly one member to match the input {}", actual)
        }
        other => other.tag().to_string(),
    }
}

/// `["a"][0]`
pub fn format_path(path: &[PropertyKey]) -> String {
    path.iter().map(|key| format!("[{}]", key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;
    use crate::ast::check;

    #[test]
    fn test_invalid_type_message() {
        let issue = Issue::invalid_type(&ast::string(), Some(Value::from(1)));
        assert_eq!(Formatter::new().format(&issue), "Expected string, got 1");
        let missing = Issue::invalid_type(&ast::string(), None);
        assert_eq!(Formatter::new().format(&missing), "Expected string, got no value provided");
    }

    #[test]
    fn test_paths_accumulate() {
        let issue = Issue::pointer(
            vec![PropertyKey::from("a"), PropertyKey::Index(0)],
            Issue::MissingKey { annotations: None },
        );
        assert_eq!(Formatter::new().format(&issue), "Missing key\n  at [\"a\"][0]");
    }

    #[test]
    fn test_annotation_beats_hook() {
        let s = ast::string().annotate(Annotations::new().with(annotations::MESSAGE, "need text"));
        let issue = Issue::invalid_type(&s, Some(Value::Null));
        let formatter = Formatter::with_hook(|_| Some("hooked".to_string()));
        assert_eq!(formatter.format(&issue), "need text");
        let plain = Issue::invalid_type(&ast::string(), Some(Value::Null));
        assert_eq!(formatter.format(&plain), "hooked");
    }

    #[test]
    fn test_filter_uses_check_description() {
        let min = check::is_min_length(3);
        let filter = min.filters()[0].clone();
        let issue = Issue::Filter {
            actual: Value::from("ab"),
            filter,
            issue: Box::new(Issue::InvalidValue {
                actual: Some(Value::from("ab")),
                annotations: None,
            }),
        };
        let message = Formatter::new().format(&issue);
        assert!(message.starts_with("Expected "), "{}", message);
        assert!(message.ends_with("got \"ab\""), "{}", message);
    }

    #[test]
    fn test_standard_shape() {
        let issue = Issue::Composite {
            ast: ast::unknown(),
            actual: None,
            issues: vec![
                Issue::pointer(vec![PropertyKey::from("a")], Issue::MissingKey { annotations: None }),
                Issue::pointer(vec![PropertyKey::from("b")], Issue::MissingKey { annotations: None }),
            ],
        };
        let standard = Formatter::new().standard(&issue);
        assert_eq!(standard.issues.len(), 2);
        assert_eq!(standard.issues[1].path, vec![PropertyKey::from("b")]);
    }
}
