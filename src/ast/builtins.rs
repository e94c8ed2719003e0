//! Built-in declarations: `date()` and `option(value)`
//!
//! Both carry the three annotations the bridges look for:
//! `defaultJsonSerializer` (serializer), `typeConstructor` (rebuilding from a
//! Representation) and `generation` (code generation).

use serde_json::json;
use std::sync::Arc;

use super::annotations::{self, Annotations};
use super::{declaration, literal, struct_, union, Ast, DeclarationParser};
use crate::effect::SchemaResult;
use crate::issue::Issue;
use crate::parser;
use crate::serializer::DefaultJsonSerializer;
use crate::transformation::{self, Link, Transformation};
use crate::value::{PropertyKey, Value};

/// `Value::Date`, serialized to JSON as an ISO-8601 string
pub fn date() -> Ast {
    let run: Arc<dyn Fn(&[Ast]) -> DeclarationParser + Send + Sync> = Arc::new(|_: &[Ast]| -> DeclarationParser {
        Arc::new(|input: &Value, ast: &Ast, _: &parser::ParseOptions| match input {
            Value::Date(_) => SchemaResult::succeed(input.clone()),
            other => SchemaResult::fail(Issue::invalid_type(ast, Some(other.clone()))),
        })
    });
    let mut annotations = Annotations::new()
        .with(annotations::TITLE, "Date")
        .with(annotations::TYPE_CONSTRUCTOR, json!({"_tag": "Date"}))
        .with(
            annotations::GENERATION,
            json!({"runtime": "builtins::date()", "type": "Date"}),
        );
    annotations.insert_opaque(
        annotations::DEFAULT_JSON_SERIALIZER,
        DefaultJsonSerializer::new(|_| Link::new(super::string(), transformation::date_from_string())),
    );
    declaration(Vec::new(), run).annotate(annotations)
}

/// An option value, held as `{_tag: "None"}` or `{_tag: "Some", value}`
pub fn option(value: Ast) -> Ast {
    let run: Arc<dyn Fn(&[Ast]) -> DeclarationParser + Send + Sync> = Arc::new(|type_parameters: &[Ast]| -> DeclarationParser {
        let inner = type_parameters.first().cloned().unwrap_or_else(super::unknown);
        Arc::new(move |input: &Value, ast: &Ast, options: &parser::ParseOptions| {
            let tag = input
                .get(&PropertyKey::from("_tag"))
                .and_then(Value::as_str)
                .map(str::to_string);
            match tag.as_deref() {
                Some("None") => SchemaResult::succeed(Value::object([("_tag", Value::from("None"))])),
                Some("Some") => {
                    let raw = input.get(&PropertyKey::from("value")).cloned();
                    parser::go(&inner)(raw, options).then(|result| match result {
                        Ok(Some(decoded)) => SchemaResult::succeed(Value::object([
                            ("_tag", Value::from("Some")),
                            ("value", decoded),
                        ])),
                        Ok(None) => SchemaResult::fail(Issue::pointer(
                            vec![PropertyKey::from("value")],
                            Issue::MissingKey { annotations: None },
                        )),
                        Err(issue) => {
                            SchemaResult::fail(Issue::pointer(vec![PropertyKey::from("value")], issue))
                        }
                    })
                }
                _ => SchemaResult::fail(Issue::invalid_type(ast, Some(input.clone()))),
            }
        })
    });
    let mut annotations = Annotations::new()
        .with(annotations::TITLE, "Option")
        .with(annotations::TYPE_CONSTRUCTOR, json!({"_tag": "Option"}))
        .with(
            annotations::GENERATION,
            json!({"runtime": "builtins::option($0)", "type": "Option<$0>"}),
        );
    annotations.insert_opaque(
        annotations::DEFAULT_JSON_SERIALIZER,
        DefaultJsonSerializer::new(|type_parameters: &[Ast]| {
            let inner = type_parameters.first().cloned().unwrap_or_else(super::unknown);
            let encoded = union(vec![
                struct_(vec![("_tag", literal("None"))]),
                struct_(vec![("_tag", literal("Some")), ("value", inner)]),
            ]);
            Link::new(encoded, Transformation::passthrough())
        }),
    );
    declaration(vec![value], run).annotate(annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;
    use chrono::TimeZone;

    #[test]
    fn test_date_accepts_only_dates() {
        let d = date();
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert!(parser::is_value(&d, &Value::Date(now)));
        assert!(!parser::is_value(&d, &Value::from("2024-01-02")));
    }

    #[test]
    fn test_option_decodes_inner_value() {
        let schema = option(ast::string().decode_to(&ast::number(), transformation::number_from_string()));
        let input = Value::object([("_tag", Value::from("Some")), ("value", Value::from("12"))]);
        let out = parser::decode_unknown_result(&schema, input, &parser::ParseOptions::default()).unwrap();
        assert_eq!(out.get(&PropertyKey::from("value")), Some(&Value::from(12)));

        // the flipped type parameter encodes back
        let encoded = parser::encode_unknown_result(&schema, out, &parser::ParseOptions::default()).unwrap();
        assert_eq!(encoded.get(&PropertyKey::from("value")), Some(&Value::from("12")));
    }

    #[test]
    fn test_option_reports_inner_path() {
        let schema = option(ast::number());
        let input = Value::object([("_tag", Value::from("Some")), ("value", Value::from("x"))]);
        let issue = parser::decode_unknown_result(&schema, input, &parser::ParseOptions::default()).unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref path, .. } if path == &vec![PropertyKey::from("value")]));
    }
}
