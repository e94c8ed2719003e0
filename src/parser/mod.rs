//! Parser compilation
//!
//! [`go`] turns a schema node into a [`Parser`]: a closure from an optional
//! input (absent key vs present value) to an optional output. Parsers are
//! compiled on demand and memoized by node identity, so recursive schemas
//! compile each node once; `Suspend` nodes compile their target on first use.
//!
//! Decoding runs `go(ast)`, encoding runs `go(flip(ast))`. Validation runs
//! the parser of `type_ast(ast)`, which has no transformations.
//!
//! A compiled parser refers to its own node through a
//! [`WeakAst`](crate::ast::WeakAst), so the memo entry is purged once the
//! schema is dropped. Parsers returned by [`decoder`] and [`encoder`] hold
//! their schema.

mod structure;
mod union;

pub use union::candidate_tags;

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::ast::{flip, type_ast, Ast, AstKind, AstNode, Check, Literal, TemplateLiteral};
use crate::effect::SchemaResult;
use crate::issue::{Formatter, Issue, ParseError, StandardFailure};
use crate::memo::IdentityMemo;
use crate::transformation::{Link, LinkTransformation};
use crate::value::{format_number, Value};

// =============================================================================
// Options
// =============================================================================

/// Whether parsing stops at the first issue or collects all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorsMode {
    #[default]
    First,
    All,
}

/// What a type literal does with keys it does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcessPropertyPolicy {
    #[default]
    Ignore,
    Error,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub errors: ErrorsMode,
    pub on_excess_property: ExcessPropertyPolicy,
}

impl ParseOptions {
    pub fn all_errors() -> Self {
        Self {
            errors: ErrorsMode::All,
            ..Self::default()
        }
    }

    pub fn with_errors(mut self, errors: ErrorsMode) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_excess_property(mut self, policy: ExcessPropertyPolicy) -> Self {
        self.on_excess_property = policy;
        self
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// `None` in and out means "key absent"
pub type Parser =
    Arc<dyn Fn(Option<Value>, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync>;

/// Parser for a present value, before checks run
pub(crate) type KindParser =
    Arc<dyn Fn(Value, &ParseOptions) -> SchemaResult<Option<Value>> + Send + Sync>;

static PARSER_MEMO: Lazy<IdentityMemo<AstNode, Parser>> = Lazy::new(IdentityMemo::new);

/// The memoized parser for `ast`
pub fn go(ast: &Ast) -> Parser {
    PARSER_MEMO.get_or_insert_with(ast.arc(), || compile(ast))
}

fn compile(ast: &Ast) -> Parser {
    if let Some(links) = &ast.encoding {
        return encoding_parser(ast, links);
    }
    trace!(kind = ast.tag(), "compiling parser");
    let parse = kind_parser(ast);
    if ast.checks.is_empty() {
        return Arc::new(move |input, options| match input {
            Some(value) => parse(value, options),
            None => SchemaResult::succeed(None),
        });
    }
    let node = ast.downgrade();
    Arc::new(move |input, options| {
        let Some(value) = input else {
            return SchemaResult::succeed(None);
        };
        let ast = node.upgrade();
        let options = *options;
        parse(value, &options).and_then(move |out| match out {
            Some(value) => SchemaResult::from_result(run_checks(&ast, value, &options).map(Some)),
            None => SchemaResult::succeed(None),
        })
    })
}

fn kind_parser(ast: &Ast) -> KindParser {
    match &ast.kind {
        AstKind::Null => refine(ast, Value::is_null),
        AstKind::Undefined | AstKind::Void => refine(ast, Value::is_undefined),
        AstKind::Never => refine(ast, |_| false),
        AstKind::Unknown | AstKind::Any => Arc::new(|value, _| SchemaResult::succeed(Some(value))),
        AstKind::String => refine(ast, |v| matches!(v, Value::String(_))),
        AstKind::Number => refine(ast, |v| matches!(v, Value::Number(_))),
        AstKind::Boolean => refine(ast, |v| matches!(v, Value::Boolean(_))),
        AstKind::BigInt => refine(ast, |v| matches!(v, Value::BigInt(_))),
        AstKind::Symbol => refine(ast, |v| matches!(v, Value::Symbol(_))),
        AstKind::ObjectKeyword => {
            refine(ast, |v| matches!(v, Value::Object(_) | Value::Array(_) | Value::Date(_)))
        }
        AstKind::Literal(literal) => {
            let literal = literal.clone();
            refine(ast, move |v| literal.matches(v))
        }
        AstKind::UniqueSymbol(symbol) => {
            let symbol = symbol.clone();
            refine(ast, move |v| matches!(v, Value::Symbol(s) if *s == symbol))
        }
        AstKind::Enums(members) => {
            let members: Vec<Literal> = members.iter().map(|(_, l)| l.clone()).collect();
            refine(ast, move |v| members.iter().any(|l| l.matches(v)))
        }
        AstKind::TemplateLiteral(template) => template_parser(ast, template),
        AstKind::Tuple(tuple) => structure::tuple(ast, tuple),
        AstKind::TypeLiteral(literal) => structure::type_literal(ast, literal),
        AstKind::Union(u) => union::union(ast, u),
        AstKind::Declaration(declaration) => {
            let run = (declaration.run)(&declaration.type_parameters);
            let node = ast.downgrade();
            Arc::new(move |value, options| run(&value, &node.upgrade(), options).map(Some))
        }
        AstKind::Suspend(suspend) => {
            let suspend = suspend.clone();
            let cell: Arc<OnceCell<Parser>> = Arc::new(OnceCell::new());
            Arc::new(move |value, options| {
                let parser = cell.get_or_init(|| go(&suspend.resolve()));
                parser(Some(value), options)
            })
        }
    }
}

/// Accept values satisfying `accepts`, otherwise `InvalidType`
fn refine<P>(ast: &Ast, accepts: P) -> KindParser
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let node = ast.downgrade();
    Arc::new(move |value, _| {
        if accepts(&value) {
            SchemaResult::succeed(Some(value))
        } else {
            SchemaResult::fail(Issue::invalid_type(&node.upgrade(), Some(value)))
        }
    })
}

fn run_checks(ast: &Ast, value: Value, options: &ParseOptions) -> Result<Value, Issue> {
    let mut issues = Vec::new();
    'checks: for check in &ast.checks {
        let filters = match check {
            Check::Filter(filter) => vec![filter.clone()],
            Check::FilterGroup(group) => group
                .checks
                .iter()
                .map(|filter| filter.clone().annotate(&group.annotations))
                .collect(),
        };
        for filter in filters {
            if let Some(issue) = (filter.run)(&value, ast, options) {
                let abort = filter.abort;
                issues.push(Issue::Filter {
                    actual: value.clone(),
                    filter,
                    issue: Box::new(issue),
                });
                if abort || options.errors == ErrorsMode::First {
                    break 'checks;
                }
            }
        }
    }
    match issues.len() {
        0 => Ok(value),
        1 => Err(issues.remove(0)),
        _ => Err(Issue::Composite {
            ast: ast.clone(),
            actual: Some(value),
            issues,
        }),
    }
}

// =============================================================================
// Encoding chains
// =============================================================================

struct Stage {
    transformation: LinkTransformation,
    /// The node `next` parses; the bare root is only reachable from here
    to: Ast,
    next: Parser,
}

/// Decode as the innermost source, then walk the links back to the root:
/// transform, then fully decode as the next target.
fn encoding_parser(ast: &Ast, links: &[Link]) -> Parser {
    trace!(kind = ast.tag(), links = links.len(), "compiling encoding chain");
    let n = links.len();
    let source = go(&links[n - 1].to);
    let bare = ast.replace_encoding(None);
    let stages: Arc<Vec<Stage>> = Arc::new(
        (0..n)
            .rev()
            .map(|i| {
                let to = if i == 0 { bare.clone() } else { links[i - 1].to.clone() };
                Stage {
                    transformation: links[i].transformation.clone(),
                    next: go(&to),
                    to,
                }
            })
            .collect(),
    );
    let node = ast.downgrade();
    Arc::new(move |input, options| {
        let ast = node.upgrade();
        let mut result = source(input, options);
        for stage in stages.iter() {
            result = apply_stage(stage, result, &ast, options);
        }
        result
    })
}

fn apply_stage(
    stage: &Stage,
    result: SchemaResult<Option<Value>>,
    ast: &Ast,
    options: &ParseOptions,
) -> SchemaResult<Option<Value>> {
    let next = stage.next.clone();
    let options = *options;
    let transformed = match &stage.transformation {
        LinkTransformation::Transformation(transformation) => {
            let getter = transformation.decode.clone();
            let ast = ast.clone();
            result.and_then(move |value| {
                getter
                    .run(value.clone(), &options)
                    .map_err(move |issue| Issue::Encoding {
                        ast,
                        actual: value,
                        issue: Box::new(issue),
                    })
            })
        }
        LinkTransformation::Middleware(middleware) => (middleware.decode)(result, &options),
    };
    transformed.and_then(move |value| next(value, &options))
}

// =============================================================================
// Template literals
// =============================================================================

const NUMBER_PATTERN: &str = r"[+-]?(?:\d*\.?\d+(?:[Ee][+-]?\d+)?|Infinity)|NaN";

fn template_parser(ast: &Ast, template: &TemplateLiteral) -> KindParser {
    let pattern = format!("^{}$", template_pattern(template));
    let node = ast.downgrade();
    match Regex::new(&pattern) {
        Ok(re) => Arc::new(move |value, _| match &value {
            Value::String(s) if re.is_match(s) => SchemaResult::succeed(Some(value)),
            _ => SchemaResult::fail(Issue::invalid_type(&node.upgrade(), Some(value))),
        }),
        Err(err) => {
            let message = format!("invalid template literal pattern {}: {}", pattern, err);
            Arc::new(move |value, _| {
                SchemaResult::fail(Issue::invalid_value(Some(value), message.clone()))
            })
        }
    }
}

/// Unanchored regex source for a template literal
pub fn template_pattern(template: &TemplateLiteral) -> String {
    let mut out = regex::escape(&template.head);
    for span in &template.spans {
        out.push_str(&span_pattern(&type_ast(&span.ast)));
        out.push_str(&regex::escape(&span.literal));
    }
    out
}

fn span_pattern(ast: &Ast) -> String {
    match &ast.kind {
        AstKind::Number => format!("(?:{})", NUMBER_PATTERN),
        AstKind::BigInt => r"-?\d+".to_string(),
        AstKind::Boolean => "(?:true|false)".to_string(),
        AstKind::Literal(literal) => regex::escape(&literal_text(literal)),
        AstKind::Union(u) => format!(
            "(?:{})",
            u.types.iter().map(span_pattern).collect::<Vec<_>>().join("|")
        ),
        AstKind::TemplateLiteral(inner) => format!("(?:{})", template_pattern(inner)),
        _ => r"[\s\S]*".to_string(),
    }
}

/// A literal as it appears inside a template string
pub fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => s.clone(),
        Literal::Number(n) => format_number(*n),
        Literal::Boolean(b) => b.to_string(),
        Literal::BigInt(n) => n.to_string(),
    }
}

// =============================================================================
// Public API
// =============================================================================

/// A decoding parser that keeps `ast` alive for as long as it is held
pub fn decoder(ast: &Ast) -> Parser {
    holding(ast.clone(), go(ast))
}

pub fn encoder(ast: &Ast) -> Parser {
    let flipped = flip(ast);
    let parser = go(&flipped);
    holding(flipped, parser)
}

fn holding(schema: Ast, parser: Parser) -> Parser {
    Arc::new(move |input, options| {
        let _schema = &schema;
        parser(input, options)
    })
}

/// Run a parser on a present input; an absent output is a missing value
fn run(parser: Parser, ast: &Ast, input: Value, options: &ParseOptions) -> SchemaResult<Value> {
    let annotations = Some(ast.key_annotations());
    parser(Some(input), options).and_then(move |out| match out {
        Some(value) => SchemaResult::succeed(value),
        None => SchemaResult::fail(Issue::MissingKey { annotations }),
    })
}

pub fn decode_unknown_result(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    run(go(ast), ast, input, options).force()
}

pub fn decode_unknown_sync(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, ParseError> {
    decode_unknown_result(ast, input, options).map_err(ParseError::new)
}

/// Decode, awaiting any suspended transformation
pub async fn decode_unknown_effect(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    run(go(ast), ast, input, options).into_effect().await
}

pub fn encode_unknown_result(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    let flipped = flip(ast);
    run(go(&flipped), ast, input, options).force()
}

pub fn encode_unknown_sync(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, ParseError> {
    encode_unknown_result(ast, input, options).map_err(ParseError::new)
}

pub async fn encode_unknown_effect(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    let flipped = flip(ast);
    run(go(&flipped), ast, input, options).into_effect().await
}

/// Check `input` against the decoded type, running no transformations
pub fn validate_unknown_result(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    decode_unknown_result(&type_ast(ast), input, options)
}

pub fn validate_unknown_sync(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, ParseError> {
    validate_unknown_result(ast, input, options).map_err(ParseError::new)
}

pub async fn validate_unknown_effect(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    decode_unknown_effect(&type_ast(ast), input, options).await
}

/// A type guard for the decoded type
pub fn is(ast: &Ast) -> impl Fn(&Value) -> bool + Send + Sync {
    let parser = decoder(&type_ast(ast));
    move |value| {
        matches!(
            parser(Some(value.clone()), &ParseOptions::default()).force(),
            Ok(Some(_))
        )
    }
}

pub fn is_value(ast: &Ast, value: &Value) -> bool {
    is(ast)(value)
}

/// Build a value of the decoded type: absent keys take their constructor
/// defaults, then the result is validated
pub fn make(ast: &Ast, input: Value, options: &ParseOptions) -> Result<Value, Issue> {
    let typed = type_ast(ast);
    let filled = fill_defaults(&typed, input);
    decode_unknown_result(&typed, filled, options)
}

fn fill_defaults(ast: &Ast, value: Value) -> Value {
    match (&ast.kind, &value) {
        (AstKind::TypeLiteral(literal), Value::Object(record)) => {
            let mut out = (**record).clone();
            for signature in &literal.property_signatures {
                match out.get(&signature.name).cloned() {
                    Some(present) => {
                        out.insert(signature.name.clone(), fill_defaults(&signature.ty, present));
                    }
                    None => {
                        let default = signature
                            .ty
                            .context
                            .as_ref()
                            .and_then(|c| c.default_value.clone());
                        if let Some(default) = default {
                            out.insert(signature.name.clone(), default);
                        }
                    }
                }
            }
            Value::Object(Arc::new(out))
        }
        (AstKind::Suspend(suspend), _) => fill_defaults(&suspend.resolve(), value),
        _ => value,
    }
}

/// Decode collecting every issue, reporting failures in the standard shape
pub fn standard_validate(ast: &Ast, input: Value) -> Result<Value, StandardFailure> {
    decode_unknown_result(ast, input, &ParseOptions::all_errors())
        .map_err(|issue| Formatter::default().standard(&issue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, annotations, check, Annotations};
    use crate::transformation;
    use crate::value::PropertyKey;

    fn decode(ast: &Ast, input: Value) -> Result<Value, Issue> {
        decode_unknown_result(ast, input, &ParseOptions::default())
    }

    #[test]
    fn test_keywords() {
        assert!(is_value(&ast::string(), &Value::from("a")));
        assert!(!is_value(&ast::string(), &Value::from(1)));
        assert!(is_value(&ast::unknown(), &Value::Undefined));
        assert!(!is_value(&ast::never(), &Value::Null));
        assert!(is_value(&ast::object_keyword(), &Value::array(vec![])));
        assert!(is_value(&ast::literal("a"), &Value::from("a")));
        assert!(!is_value(&ast::literal(1.0), &Value::from("1")));
    }

    #[test]
    fn test_checks_first_and_all() {
        let s = ast::string().with_checks(vec![check::is_min_length(3), check::is_uppercased()]);
        let first = decode(&s, Value::from("ab")).unwrap_err();
        assert_eq!(first.tag(), "Filter");
        let all = decode_unknown_result(&s, Value::from("ab"), &ParseOptions::all_errors()).unwrap_err();
        match all {
            Issue::Composite { issues, .. } => assert_eq!(issues.len(), 2),
            other => panic!("expected composite, got {:?}", other),
        }
    }

    #[test]
    fn test_abort_stops_all_mode() {
        let filter = ast::Filter::from_meta(ast::CheckMeta::MinLength { min_length: 3 }).abort();
        let s = ast::string().with_checks(vec![Check::Filter(filter), check::is_uppercased()]);
        let issue = decode_unknown_result(&s, Value::from("ab"), &ParseOptions::all_errors()).unwrap_err();
        assert_eq!(issue.tag(), "Filter");
    }

    #[test]
    fn test_encoding_chain_decodes_and_encodes() {
        let n = ast::string().decode_to(&ast::number(), transformation::number_from_string());
        assert_eq!(decode(&n, Value::from("1.5")).unwrap(), Value::from(1.5));
        let encoded = encode_unknown_result(&n, Value::from(2), &ParseOptions::default()).unwrap();
        assert_eq!(encoded, Value::from("2"));
    }

    #[test]
    fn test_encoding_failure_is_wrapped() {
        let n = ast::string().decode_to(&ast::bigint(), transformation::bigint_from_string());
        let issue = decode(&n, Value::from("nope")).unwrap_err();
        assert_eq!(issue.tag(), "Encoding");
        // the source type fails before any transformation runs
        let issue = decode(&n, Value::from(1)).unwrap_err();
        assert_eq!(issue.tag(), "InvalidType");
    }

    #[test]
    fn test_multi_link_chain() {
        let trimmed = ast::string().decode_to(&ast::string(), transformation::trim());
        let n = trimmed.decode_to(&ast::number(), transformation::number_from_string());
        assert_eq!(n.encoding.as_ref().unwrap().len(), 1);
        assert_eq!(decode(&n, Value::from(" 7 ")).unwrap(), Value::from(7));
    }

    #[test]
    fn test_template_literal() {
        let t = ast::template_literal("id-", vec![(ast::number(), "-x".to_string())]);
        assert!(is_value(&t, &Value::from("id-12-x")));
        assert!(!is_value(&t, &Value::from("id-a-x")));
        let u = ast::template_literal("", vec![(ast::literals(vec!["a".into(), "b".into()]), String::new())]);
        assert!(is_value(&u, &Value::from("b")));
        assert!(!is_value(&u, &Value::from("c")));
    }

    #[test]
    fn test_suspend_recursion() {
        fn tree() -> Ast {
            ast::struct_(vec![
                ("value", ast::number()),
                ("children", ast::array(ast::suspend(tree))),
            ])
        }
        let schema = tree();
        let leaf = Value::object([("value", Value::from(1)), ("children", Value::array(vec![]))]);
        let root = Value::object([("value", Value::from(0)), ("children", Value::array(vec![leaf]))]);
        assert!(decode(&schema, root).is_ok());
        let bad = Value::object([
            ("value", Value::from(0)),
            ("children", Value::array(vec![Value::from("x")])),
        ]);
        let issue = decode(&schema, bad).unwrap_err();
        let text = Formatter::default().format(&issue);
        assert!(text.contains("[\"children\"][0]"), "{}", text);
    }

    fn sample_schema() -> Ast {
        ast::struct_(vec![
            ("name", ast::string().with_checks(vec![check::is_min_length(1)])),
            ("n", ast::string().decode_to(&ast::number(), transformation::number_from_string())),
            ("kind", ast::literals(vec!["a".into(), "b".into()])),
            (
                "pair",
                ast::tuple(vec![
                    ast::number(),
                    ast::template_literal("id-", vec![(ast::number(), String::new())]),
                ]),
            ),
        ])
    }

    fn sample_input() -> Value {
        Value::object([
            ("name", Value::from("x")),
            ("n", Value::from("3")),
            ("kind", Value::from("b")),
            ("pair", Value::array(vec![Value::from(1), Value::from("id-2")])),
        ])
    }

    #[test]
    fn test_compiled_parsers_do_not_keep_schemas_alive() {
        let schema = sample_schema();
        let decoded = decode(&schema, sample_input()).unwrap();
        let encoded = encode_unknown_result(&schema, decoded.clone(), &ParseOptions::default()).unwrap();
        assert_eq!(encoded, sample_input());
        assert!(validate_unknown_result(&schema, decoded, &ParseOptions::default()).is_ok());
        assert!(decode(&schema, Value::from(1)).is_err());

        let weak = schema.downgrade();
        drop(schema);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_returned_parsers_hold_their_schema() {
        let schema = sample_schema();
        let weak = schema.downgrade();
        let decode_parser = decoder(&schema);
        let encode_parser = encoder(&schema);
        drop(schema);
        assert!(weak.is_alive());

        let options = ParseOptions::default();
        let decoded = decode_parser(Some(sample_input()), &options).force().unwrap();
        assert!(decoded.is_some());
        let issue = decode_parser(Some(Value::from(1)), &options).force().unwrap_err();
        match issue {
            Issue::InvalidType { ast, .. } => assert_eq!(ast.tag(), "TypeLiteral"),
            other => panic!("expected an invalid type, got {:?}", other),
        }
        let encoded = encode_parser(decoded, &options).force().unwrap();
        assert_eq!(encoded, Some(sample_input()));

        drop(decode_parser);
        drop(encode_parser);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_make_fills_constructor_defaults() {
        let schema = ast::struct_(vec![
            ("a", ast::string()),
            ("b", ast::number().with_constructor_default(Value::from(0))),
        ]);
        let out = make(&schema, Value::object([("a", Value::from("x"))]), &ParseOptions::default()).unwrap();
        assert_eq!(out.get(&PropertyKey::from("b")), Some(&Value::from(0)));
    }

    #[test]
    fn test_standard_validate_collects() {
        let schema = ast::struct_(vec![("a", ast::string()), ("b", ast::number())]);
        let failure = standard_validate(&schema, Value::empty_object()).unwrap_err();
        assert_eq!(failure.issues.len(), 2);
        assert_eq!(failure.issues[0].message, "Missing key");
    }

    #[test]
    fn test_missing_key_message_annotation() {
        let schema = ast::struct_(vec![(
            "a",
            ast::string().annotate_key(Annotations::new().with(annotations::MESSAGE_MISSING_KEY, "a is required")),
        )]);
        let issue = decode(&schema, Value::empty_object()).unwrap_err();
        assert_eq!(Formatter::default().format(&issue), "a is required\n  at [\"a\"]");
    }

    #[test]
    fn test_suspended_transformation() {
        let slow = crate::transformation::Transformation::new(
            crate::getter::Getter::new(|input, _| SchemaResult::suspend(async move { Ok(input) })),
            crate::getter::Getter::passthrough(),
        );
        let s = ast::string().decode_to(&ast::string(), slow);
        let value = futures::executor::block_on(decode_unknown_effect(&s, Value::from("a"), &ParseOptions::default()));
        assert_eq!(value.unwrap(), Value::from("a"));
    }
}
