//! Tuple and type-literal parsers
//!
//! Both build one step per position or key and run them through
//! [`sequence`], so `First` mode stops at the first failing child and `All`
//! mode reports every failure in a `Composite`. Child issues are wrapped in
//! a `Pointer` to the key they came from.

use std::collections::HashSet;
use std::sync::Arc;

use super::{go, ErrorsMode, ExcessPropertyPolicy, KindParser, ParseOptions, Parser};
use crate::ast::{encoded_ast, Ast, Combiner, Tuple, TypeLiteral};
use crate::effect::{sequence, SchemaResult, Step};
use crate::issue::Issue;
use crate::value::{PropertyKey, Record, Value};

/// Output of one step
enum Entry {
    Skip,
    Set(PropertyKey, Value),
    /// An index-signature entry; duplicates go through the combiner
    Merge(PropertyKey, Value, Option<Combiner>),
}

/// Split step results; `First` keeps the first issue, `All` wraps them all
fn settle(
    ast: &Ast,
    input: Value,
    results: Vec<Result<Entry, Issue>>,
    mode: ErrorsMode,
) -> Result<Vec<Entry>, Issue> {
    let mut entries = Vec::with_capacity(results.len());
    let mut issues = Vec::new();
    for result in results {
        match result {
            Ok(entry) => entries.push(entry),
            Err(issue) => issues.push(issue),
        }
    }
    if issues.is_empty() {
        return Ok(entries);
    }
    match mode {
        ErrorsMode::First => Err(issues.remove(0)),
        ErrorsMode::All => Err(Issue::Composite {
            ast: ast.clone(),
            actual: Some(input),
            issues,
        }),
    }
}

/// Parse one key; an absent result for a required key is `MissingKey`
fn field_step(
    parser: Parser,
    value: Option<Value>,
    key: PropertyKey,
    field: Ast,
    options: ParseOptions,
) -> Step<Entry> {
    Box::new(move || {
        parser(value, &options).then(move |result| {
            SchemaResult::from_result(match result {
                Ok(Some(value)) => Ok(Entry::Set(key, value)),
                Ok(None) if field.is_optional() => Ok(Entry::Skip),
                Ok(None) => Err(Issue::pointer(
                    vec![key],
                    Issue::MissingKey {
                        annotations: Some(field.key_annotations()),
                    },
                )),
                Err(issue) => Err(Issue::pointer(vec![key], issue)),
            })
        })
    })
}

fn unexpected_step(ast: &Ast, key: PropertyKey, value: Value) -> Step<Entry> {
    let ast = ast.clone();
    Box::new(move || {
        SchemaResult::fail(Issue::pointer(
            vec![key],
            Issue::UnexpectedKey {
                ast,
                actual: Some(value),
            },
        ))
    })
}

// =============================================================================
// Tuples
// =============================================================================

/// Fixed elements by index, then the rest head over the middle, then the
/// fixed tail. Without a rest, extra elements are `UnexpectedKey`.
pub(super) fn tuple(ast: &Ast, tuple: &Tuple) -> KindParser {
    let node = ast.downgrade();
    let elements: Arc<Vec<(Ast, Parser)>> =
        Arc::new(tuple.elements.iter().map(|e| (e.clone(), go(e))).collect());
    let rest: Arc<Vec<(Ast, Parser)>> =
        Arc::new(tuple.rest.iter().map(|e| (e.clone(), go(e))).collect());

    Arc::new(move |input, options| {
        let ast = node.upgrade();
        let items = match &input {
            Value::Array(items) => items.clone(),
            _ => return SchemaResult::fail(Issue::invalid_type(&ast, Some(input))),
        };
        let len = items.len();
        let mut steps: Vec<Step<Entry>> = Vec::with_capacity(len.max(elements.len()));

        for (i, (element, parser)) in elements.iter().enumerate() {
            steps.push(field_step(
                parser.clone(),
                items.get(i).cloned(),
                PropertyKey::Index(i),
                element.clone(),
                *options,
            ));
        }

        match rest.split_first() {
            None => {
                for (i, item) in items.iter().enumerate().skip(elements.len()) {
                    steps.push(unexpected_step(&ast, PropertyKey::Index(i), item.clone()));
                }
            }
            Some(((head, head_parser), tail)) => {
                let tail_start = len.saturating_sub(tail.len()).max(elements.len());
                for i in elements.len()..tail_start {
                    steps.push(field_step(
                        head_parser.clone(),
                        Some(items[i].clone()),
                        PropertyKey::Index(i),
                        head.clone(),
                        *options,
                    ));
                }
                for (j, (element, parser)) in tail.iter().enumerate() {
                    let i = tail_start + j;
                    steps.push(field_step(
                        parser.clone(),
                        items.get(i).cloned(),
                        PropertyKey::Index(i),
                        element.clone(),
                        *options,
                    ));
                }
            }
        }

        let ast = ast.clone();
        let mode = options.errors;
        sequence(steps, mode).and_then(move |results| {
            SchemaResult::from_result(settle(&ast, input, results, mode).map(|entries| {
                let values = entries
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Entry::Set(_, value) | Entry::Merge(_, value, _) => Some(value),
                        Entry::Skip => None,
                    })
                    .collect();
                Some(Value::array(values))
            }))
        })
    })
}

// =============================================================================
// Type literals
// =============================================================================

struct Signature {
    /// Accepts the raw (encoded) key
    accepts: Parser,
    key: Parser,
    value: Parser,
    merge: Option<Combiner>,
}

impl Signature {
    fn accepts(&self, key: &PropertyKey) -> bool {
        matches!(
            (self.accepts)(Some(key.to_value()), &ParseOptions::default()).force(),
            Ok(Some(_))
        )
    }

    fn step(&self, key: PropertyKey, value: Value, options: ParseOptions) -> Step<Entry> {
        let key_parser = self.key.clone();
        let value_parser = self.value.clone();
        let merge = self.merge.clone();
        Box::new(move || {
            let raw_key = key.to_value();
            key_parser(Some(raw_key), &options).then(move |decoded| {
                let out_key = match decoded {
                    Ok(Some(k)) => match PropertyKey::from_value(&k) {
                        Some(out_key) => out_key,
                        None => {
                            return SchemaResult::fail(Issue::pointer(
                                vec![key],
                                Issue::invalid_value(Some(k), "not a valid property key"),
                            ))
                        }
                    },
                    Ok(None) => return SchemaResult::succeed(Entry::Skip),
                    Err(issue) => return SchemaResult::fail(Issue::pointer(vec![key], issue)),
                };
                value_parser(Some(value), &options).then(move |result| {
                    SchemaResult::from_result(match result {
                        Ok(Some(value)) => Ok(Entry::Merge(out_key, value, merge)),
                        Ok(None) => Ok(Entry::Skip),
                        Err(issue) => Err(Issue::pointer(vec![key], issue)),
                    })
                })
            })
        })
    }
}

/// Declared properties by own-key lookup, then every remaining key through
/// each index signature whose parameter accepts it
pub(super) fn type_literal(ast: &Ast, literal: &TypeLiteral) -> KindParser {
    let node = ast.downgrade();
    let properties: Arc<Vec<(PropertyKey, Ast, Parser)>> = Arc::new(
        literal
            .property_signatures
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone(), go(&p.ty)))
            .collect(),
    );
    let declared: Arc<HashSet<PropertyKey>> = Arc::new(
        literal
            .property_signatures
            .iter()
            .map(|p| p.name.clone())
            .collect(),
    );
    let signatures: Arc<Vec<Signature>> = Arc::new(
        literal
            .index_signatures
            .iter()
            .map(|s| Signature {
                accepts: go(&encoded_ast(&s.parameter)),
                key: go(&s.parameter),
                value: go(&s.ty),
                merge: s.merge.as_ref().map(|m| m.decode.clone()),
            })
            .collect(),
    );

    Arc::new(move |input, options| {
        let ast = node.upgrade();
        let record = match &input {
            Value::Object(record) => record.clone(),
            _ => return SchemaResult::fail(Issue::invalid_type(&ast, Some(input))),
        };
        let mut steps: Vec<Step<Entry>> = Vec::with_capacity(properties.len() + record.len());

        for (name, ty, parser) in properties.iter() {
            steps.push(field_step(
                parser.clone(),
                record.get(name).cloned(),
                name.clone(),
                ty.clone(),
                *options,
            ));
        }

        for (key, value) in record.iter() {
            if declared.contains(key) {
                continue;
            }
            let mut matched = false;
            for signature in signatures.iter().filter(|s| s.accepts(key)) {
                matched = true;
                steps.push(signature.step(key.clone(), value.clone(), *options));
            }
            if matched {
                continue;
            }
            match options.on_excess_property {
                ExcessPropertyPolicy::Ignore => {}
                ExcessPropertyPolicy::Error => steps.push(unexpected_step(&ast, key.clone(), value.clone())),
                ExcessPropertyPolicy::Preserve => {
                    let entry = Entry::Set(key.clone(), value.clone());
                    steps.push(Box::new(move || SchemaResult::succeed(entry)));
                }
            }
        }

        let ast = ast.clone();
        let mode = options.errors;
        sequence(steps, mode).and_then(move |results| {
            SchemaResult::from_result(
                settle(&ast, input, results, mode).map(|entries| Some(build_record(entries))),
            )
        })
    })
}

fn build_record(entries: Vec<Entry>) -> Value {
    let mut out = Record::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Entry::Skip => {}
            Entry::Set(key, value) => {
                out.insert(key, value);
            }
            Entry::Merge(key, value, merge) => {
                let merged = match (out.get(&key), merge) {
                    (Some(existing), Some(combine)) => combine(existing, value),
                    _ => value,
                };
                out.insert(key, merged);
            }
        }
    }
    Value::Object(Arc::new(out))
}

#[cfg(test)]
mod tests {
    use super::super::{decode_unknown_result, encode_unknown_result};
    use super::*;
    use crate::ast::{self, KeyValueCombiner};
    use crate::transformation;

    fn decode(ast: &Ast, input: Value, options: ParseOptions) -> Result<Value, Issue> {
        decode_unknown_result(ast, input, &options)
    }

    fn strings(items: &[&str]) -> Value {
        Value::array(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_tuple_optional_element() {
        let t = ast::tuple(vec![ast::string(), ast::number().optional_key()]);
        let out = decode(&t, strings(&["x"]), ParseOptions::default()).unwrap();
        assert_eq!(out, strings(&["x"]));
    }

    #[test]
    fn test_tuple_invalid_element_points_at_index() {
        let t = ast::tuple(vec![ast::string(), ast::number().optional_key()]);
        let issue = decode(&t, Value::array(vec![Value::from(1)]), ParseOptions::default()).unwrap_err();
        match issue {
            Issue::Pointer { path, issue } => {
                assert_eq!(path, vec![PropertyKey::Index(0)]);
                assert_eq!(issue.tag(), "InvalidType");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tuple_rejects_excess_elements() {
        let t = ast::tuple(vec![ast::string(), ast::number().optional_key()]);
        let issue = decode(&t, strings(&["x", "y"]), ParseOptions::default()).unwrap_err();
        match issue {
            Issue::Pointer { path, issue } => {
                assert_eq!(path, vec![PropertyKey::Index(1)]);
                assert_eq!(issue.tag(), "InvalidType");
            }
            other => panic!("unexpected {:?}", other),
        }
        let t = ast::tuple(vec![ast::string()]);
        let issue = decode(&t, strings(&["x", "y"]), ParseOptions::default()).unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref issue, .. } if issue.tag() == "UnexpectedKey"));
    }

    #[test]
    fn test_rest_with_tail() {
        let t = ast::tuple_with_rest(vec![ast::string()], vec![ast::number(), ast::boolean()]);
        let input = Value::array(vec![Value::from("a"), Value::from(1), Value::from(2), Value::from(true)]);
        assert_eq!(decode(&t, input.clone(), ParseOptions::default()).unwrap(), input);
        let short = Value::array(vec![Value::from("a")]);
        let issue = decode(&t, short, ParseOptions::default()).unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref issue, .. } if issue.tag() == "MissingKey"));
    }

    #[test]
    fn test_all_mode_collects_composite() {
        let t = ast::array(ast::number());
        let issue = decode(&t, strings(&["a", "b"]), ParseOptions::all_errors()).unwrap_err();
        match issue {
            Issue::Composite { issues, .. } => assert_eq!(issues.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_struct_missing_and_optional() {
        let s = ast::struct_(vec![("a", ast::string()), ("b", ast::number().optional_key())]);
        let ok = decode(&s, Value::object([("a", Value::from("x"))]), ParseOptions::default()).unwrap();
        assert_eq!(ok, Value::object([("a", Value::from("x"))]));
        let issue = decode(&s, Value::empty_object(), ParseOptions::default()).unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref issue, .. } if issue.tag() == "MissingKey"));
    }

    #[test]
    fn test_excess_property_policies() {
        let s = ast::struct_(vec![("a", ast::string())]);
        let input = Value::object([("a", Value::from("x")), ("z", Value::from(1))]);
        let ignored = decode(&s, input.clone(), ParseOptions::default()).unwrap();
        assert_eq!(ignored, Value::object([("a", Value::from("x"))]));
        let preserved = decode(
            &s,
            input.clone(),
            ParseOptions::default().with_excess_property(ExcessPropertyPolicy::Preserve),
        )
        .unwrap();
        assert_eq!(preserved, input);
        let issue = decode(
            &s,
            input,
            ParseOptions::default().with_excess_property(ExcessPropertyPolicy::Error),
        )
        .unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref path, .. } if path == &vec![PropertyKey::from("z")]));
    }

    #[test]
    fn test_index_signature_decodes_keys_and_values() {
        let key = ast::string().decode_to(&ast::string(), transformation::to_upper_case());
        let value = ast::string().decode_to(&ast::number(), transformation::number_from_string());
        let r = ast::record(key, value);
        let out = decode(&r, Value::object([("a", Value::from("1"))]), ParseOptions::default()).unwrap();
        assert_eq!(out, Value::object([("A", Value::from(1))]));
        let back = encode_unknown_result(&r, out, &ParseOptions::default()).unwrap();
        assert_eq!(back, Value::object([("A", Value::from("1"))]));
    }

    #[test]
    fn test_index_signature_merge() {
        let key = ast::string().decode_to(&ast::string(), transformation::to_lower_case());
        let mut signature = ast::index_signature(key, ast::number());
        let sum: Combiner = Arc::new(|a: &Value, b: Value| {
            Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
        });
        signature.merge = Some(KeyValueCombiner {
            decode: sum.clone(),
            encode: sum,
        });
        let r = ast::type_literal(vec![], vec![signature]);
        let input = Value::object([("a", Value::from(1)), ("A", Value::from(2))]);
        let out = decode(&r, input, ParseOptions::default()).unwrap();
        assert_eq!(out, Value::object([("a", Value::from(3))]));
    }

    #[test]
    fn test_declared_keys_skip_index_signatures() {
        let s = ast::type_literal(
            vec![ast::property("kind", ast::string())],
            vec![ast::index_signature(ast::string(), ast::number())],
        );
        let input = Value::object([("kind", Value::from("k")), ("n", Value::from(1))]);
        assert_eq!(decode(&s, input.clone(), ParseOptions::default()).unwrap(), input);
    }
}
