//! Parser Tests
//!
//! End-to-end decoding and encoding through the public parsing surface.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use familiar_schema_engine::ast::{self, Ast};
use familiar_schema_engine::effect::SchemaResult;
use familiar_schema_engine::getter::Getter;
use familiar_schema_engine::issue::{Formatter, Issue};
use familiar_schema_engine::parser::{self, ExcessPropertyPolicy, ParseOptions};
use familiar_schema_engine::transformation::{self, Transformation};
use familiar_schema_engine::Value;
use serde_json::json;

fn decode(ast: &Ast, input: serde_json::Value) -> Result<Value, Issue> {
    parser::decode_unknown_result(ast, Value::from_json(&input), &ParseOptions::default())
}

fn message(issue: &Issue) -> String {
    Formatter::new().format(issue)
}

// =============================================================================
// Codecs
// =============================================================================

fn form() -> Ast {
    let user = ast::struct_(vec![
        ("name", ast::string()),
        (
            "age",
            ast::string().decode_to(&ast::number(), transformation::number_from_string()),
        ),
    ]);
    let decoded = ast::struct_(vec![("user", user), ("tags", ast::array(ast::string()))]);
    let entries = ast::array(ast::tuple(vec![ast::string(), ast::unknown()]));
    entries.decode_to(&decoded, transformation::tree_record())
}

#[test]
fn test_form_entries_decode_into_nested_record() {
    let input = json!([["user[name]", "Ada"], ["user[age]", "36"], ["tags[]", "a"], ["tags[]", "b"]]);
    let out = decode(&form(), input).unwrap();
    assert_eq!(
        out.to_json(),
        Some(json!({"user": {"name": "Ada", "age": 36}, "tags": ["a", "b"]}))
    );
}

#[test]
fn test_form_record_encodes_into_entries() {
    let value = Value::from_json(&json!({"user": {"name": "Ada", "age": 36}, "tags": ["a", "b"]}));
    let out = parser::encode_unknown_result(&form(), value, &ParseOptions::default()).unwrap();
    assert_eq!(
        out.to_json(),
        Some(json!([["user[name]", "Ada"], ["user[age]", "36"], ["tags", "a"], ["tags", "b"]]))
    );
}

#[test]
fn test_form_failure_points_into_the_decoded_record() {
    let input = json!([["user[name]", "Ada"], ["tags[]", 1]]);
    let issue = decode(&form(), input).unwrap_err();
    assert_eq!(message(&issue), "Missing key\n  at [\"user\"][\"age\"]");
}

// =============================================================================
// Structures
// =============================================================================

fn shape() -> Ast {
    ast::union(vec![
        ast::struct_(vec![("_tag", ast::literal("Circle")), ("radius", ast::number())]),
        ast::struct_(vec![("_tag", ast::literal("Square")), ("side", ast::number())]),
    ])
}

#[test]
fn test_discriminated_union() {
    assert!(decode(&shape(), json!({"_tag": "Square", "side": 2})).is_ok());
    let issue = decode(&shape(), json!({"_tag": "Square", "radius": 2})).unwrap_err();
    assert_eq!(message(&issue), "Missing key\n  at [\"side\"]");
}

#[test]
fn test_excess_property_policy_reaches_union_members() {
    let input = Value::from_json(&json!({"_tag": "Circle", "radius": 1, "extra": true}));
    let strict = ParseOptions::default().with_excess_property(ExcessPropertyPolicy::Error);
    let issue = parser::decode_unknown_result(&shape(), input.clone(), &strict).unwrap_err();
    assert_eq!(message(&issue), "Unexpected key with value true\n  at [\"extra\"]");

    let preserve = ParseOptions::default().with_excess_property(ExcessPropertyPolicy::Preserve);
    assert_eq!(parser::decode_unknown_result(&shape(), input.clone(), &preserve).unwrap(), input);
}

#[test]
fn test_tuples_reject_excess_elements() {
    let pair = ast::tuple(vec![ast::string(), ast::number()]);
    assert!(decode(&pair, json!(["a", 1])).is_ok());
    let issue = decode(&pair, json!(["a", 1, 2])).unwrap_err();
    assert_eq!(message(&issue), "Unexpected key with value 2\n  at [2]");
}

// =============================================================================
// Suspended results
// =============================================================================

/// Pending on the first poll, ready on the second
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

fn slow_upper() -> Ast {
    let lookup = Transformation::new(
        Getter::new(|input, _| {
            SchemaResult::suspend(async move {
                YieldOnce(false).await;
                Ok(input.map(|v| Value::from(v.as_str().unwrap_or_default().to_uppercase())))
            })
        }),
        Getter::passthrough(),
    );
    ast::string().decode_to(&ast::string(), lookup)
}

#[test]
fn test_suspended_decode_needs_the_effect_api() {
    let schema = slow_upper();
    let issue = parser::decode_unknown_result(&schema, Value::from("abc"), &ParseOptions::default()).unwrap_err();
    assert!(matches!(issue, Issue::Forbidden { .. }), "{:?}", issue);
    assert_eq!(message(&issue), "cannot be decoded synchronously");

    let out = futures::executor::block_on(parser::decode_unknown_effect(
        &schema,
        Value::from("abc"),
        &ParseOptions::default(),
    ));
    assert_eq!(out.unwrap(), Value::from("ABC"));
}

#[test]
fn test_suspended_members_keep_collecting_in_all_mode() {
    let schema = ast::struct_(vec![("a", slow_upper()), ("b", ast::number()), ("c", ast::number())]);
    let input = Value::from_json(&json!({"a": "x", "b": "1", "c": "2"}));
    let issue = futures::executor::block_on(parser::decode_unknown_effect(
        &schema,
        input,
        &ParseOptions::all_errors(),
    ))
    .unwrap_err();
    let leaves = Formatter::new().leaves(&issue);
    assert_eq!(leaves.len(), 2);
}

#[test]
fn test_standard_validate_shape() {
    let failure = parser::standard_validate(&shape(), Value::from_json(&json!({"_tag": "Triangle"}))).unwrap_err();
    assert_eq!(failure.issues.len(), 1);
    assert!(failure.issues[0].path.is_empty());
    assert!(failure.issues[0].message.starts_with("Expected "), "{}", failure.issues[0].message);
}
