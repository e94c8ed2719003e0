//! JSON serializer bridge
//!
//! [`json`] rewrites a schema so its encoded side only holds JSON-safe
//! values. Primitives pass through; bigints and symbols get a string link;
//! declarations use their `defaultJsonSerializer` annotation or become
//! forbidden to encode. Structural nodes recurse into their children, and a
//! node that already has an encoding is serialized at its innermost source.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::ast::{self, annotations, map_children, memo_rewrite, Ast, AstKind, Literal, RewriteMemo};
use crate::getter::Getter;
use crate::issue::Issue;
use crate::memo::IdentityMemo;
use crate::transformation::{self, Link, Transformation};

/// Builds the JSON link of a declaration from its (serialized) type parameters
#[derive(Clone)]
pub struct DefaultJsonSerializer(pub Arc<dyn Fn(&[Ast]) -> Link + Send + Sync>);

impl DefaultJsonSerializer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Ast]) -> Link + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn link(&self, type_parameters: &[Ast]) -> Link {
        (self.0)(type_parameters)
    }
}

impl fmt::Debug for DefaultJsonSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultJsonSerializer")
    }
}

static JSON_MEMO: Lazy<RewriteMemo> = Lazy::new(IdentityMemo::new);

/// The same schema with a JSON-safe encoded side
pub fn json(ast: &Ast) -> Ast {
    memo_rewrite(&JSON_MEMO, ast, || go(ast))
}

fn go(ast: &Ast) -> Ast {
    if let Some(links) = &ast.encoding {
        let last = links.len() - 1;
        let source = json(&links[last].to);
        if Ast::ptr_eq(&source, &links[last].to) {
            return ast.clone();
        }
        let mut links = links.clone();
        links[last].to = source;
        return ast.replace_encoding(Some(links));
    }

    match &ast.kind {
        AstKind::BigInt => attach(ast, ast::string(), transformation::bigint_from_string()),
        AstKind::Literal(Literal::BigInt(n)) => attach(
            ast,
            ast::literal(Literal::String(n.to_string())),
            transformation::bigint_from_string(),
        ),
        AstKind::Symbol => attach(ast, ast::string(), transformation::symbol_from_string()),
        AstKind::UniqueSymbol(symbol) => {
            let wire = match symbol.key_for() {
                Some(key) => ast::literal(Literal::String(key.to_string())),
                None => ast::string(),
            };
            attach(ast, wire, transformation::symbol_from_string())
        }
        AstKind::Declaration(declaration) => {
            let type_parameters: Vec<Ast> = declaration.type_parameters.iter().map(json).collect();
            let link = match ast
                .annotations
                .get_opaque::<DefaultJsonSerializer>(annotations::DEFAULT_JSON_SERIALIZER)
            {
                Some(serializer) => {
                    let link = serializer.link(&type_parameters);
                    Link::new(json(&link.to), link.transformation)
                }
                None => {
                    trace!(declaration = %ast, "no defaultJsonSerializer, encoding is forbidden");
                    forbidden_link(ast)
                }
            };
            let mut declaration = declaration.clone();
            declaration.type_parameters = type_parameters;
            ast.with_node(|node| {
                node.kind = AstKind::Declaration(declaration);
                node.encoding = Some(vec![link]);
            })
        }
        _ => map_children(ast, &json, false),
    }
}

/// `ast` decodes from `wire`; an optional key stays optional on the wire
fn attach(ast: &Ast, wire: Ast, transformation: Transformation) -> Ast {
    let wire = if ast.is_optional() { wire.optional_key() } else { wire };
    ast.replace_encoding(Some(vec![Link::new(wire, transformation)]))
}

fn forbidden_link(ast: &Ast) -> Link {
    let shown = ast.to_string();
    Link::new(
        ast::unknown(),
        Transformation::new(
            Getter::passthrough(),
            Getter::fail(move |input| {
                Issue::forbidden(
                    input,
                    format!("cannot serialize to JSON, required `defaultJsonSerializer` annotation for {}", shown),
                )
            }),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builtins;
    use crate::parser::{self, ParseOptions};
    use crate::value::{Symbol, Value};
    use chrono::TimeZone;

    fn encode(ast: &Ast, value: Value) -> Result<Value, Issue> {
        parser::encode_unknown_result(&json(ast), value, &ParseOptions::default())
    }

    fn decode(ast: &Ast, value: Value) -> Result<Value, Issue> {
        parser::decode_unknown_result(&json(ast), value, &ParseOptions::default())
    }

    #[test]
    fn test_primitives_pass_through() {
        let schema = ast::struct_(vec![("a", ast::string()), ("b", ast::number())]);
        assert!(Ast::ptr_eq(&json(&schema), &schema));
    }

    #[test]
    fn test_bigint_round_trips_as_string() {
        let schema = ast::struct_(vec![("n", ast::bigint())]);
        let encoded = encode(&schema, Value::object([("n", Value::BigInt(42))])).unwrap();
        assert_eq!(encoded.to_json(), Some(serde_json::json!({"n": "42"})));
        let decoded = decode(&schema, Value::object([("n", Value::from("42"))])).unwrap();
        assert_eq!(decoded, Value::object([("n", Value::BigInt(42))]));
    }

    #[test]
    fn test_unregistered_symbol_is_forbidden_on_encode() {
        let schema = ast::symbol();
        assert_eq!(
            encode(&schema, Value::Symbol(Symbol::for_key("k"))).unwrap(),
            Value::from("k")
        );
        match encode(&schema, Value::Symbol(Symbol::new(Some("local")))).unwrap_err() {
            Issue::Encoding { issue, .. } => assert_eq!(issue.tag(), "Forbidden", "{:?}", issue),
            other => panic!("expected an encoding failure, got {:?}", other),
        }
        match decode(&schema, Value::from("anything")).unwrap() {
            Value::Symbol(symbol) => assert_eq!(symbol.key_for(), Some("anything")),
            other => panic!("expected a symbol, got {:?}", other),
        }
    }

    #[test]
    fn test_date_uses_default_serializer() {
        let when = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let encoded = encode(&builtins::date(), Value::Date(when)).unwrap();
        assert_eq!(encoded, Value::from("2024-05-06T07:08:09.000Z"));
    }

    #[test]
    fn test_declaration_without_serializer_is_forbidden() {
        let run: ast::DeclarationRun = Arc::new(|_: &[Ast]| -> ast::DeclarationParser {
            Arc::new(|input: &Value, _: &Ast, _: &ParseOptions| crate::effect::SchemaResult::succeed(input.clone()))
        });
        let opaque = ast::declaration(Vec::new(), run);
        let when = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert!(encode(&opaque, Value::Date(when)).is_err());
    }
}
