//! Type-level rendering of schema nodes (`readonly [string, number?]`)

use once_cell::sync::Lazy;
use std::sync::Arc;

use super::annotations;
use super::{Ast, AstKind, AstNode, TypeLiteral};
use crate::memo::IdentityMemo;
use crate::value::quote;

static FORMAT_MEMO: Lazy<IdentityMemo<AstNode, Arc<str>>> = Lazy::new(IdentityMemo::new);

/// Render a node as a type expression; memoized per node.
///
/// An `identifier` annotation replaces the structural rendering, which is
/// also how suspended (recursive) nodes stay finite.
pub fn format(ast: &Ast) -> Arc<str> {
    FORMAT_MEMO.get_or_insert_with(ast.arc(), || Arc::from(render(ast)))
}

fn render(ast: &Ast) -> String {
    if let Some(identifier) = ast.identifier() {
        return identifier.to_string();
    }
    let base = match &ast.kind {
        AstKind::Null => "null".to_string(),
        AstKind::Undefined => "undefined".to_string(),
        AstKind::Void => "void".to_string(),
        AstKind::Never => "never".to_string(),
        AstKind::Unknown => "unknown".to_string(),
        AstKind::Any => "any".to_string(),
        AstKind::String => "string".to_string(),
        AstKind::Number => "number".to_string(),
        AstKind::Boolean => "boolean".to_string(),
        AstKind::BigInt => "bigint".to_string(),
        AstKind::Symbol => "symbol".to_string(),
        AstKind::ObjectKeyword => "object".to_string(),
        AstKind::Literal(literal) => literal.to_string(),
        AstKind::UniqueSymbol(symbol) => symbol.to_string(),
        AstKind::Enums(members) => format!(
            "<enum {} value(s): {}>",
            members.len(),
            members
                .iter()
                .map(|(_, value)| value.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        ),
        AstKind::TemplateLiteral(t) => {
            let mut out = String::from("`");
            out.push_str(&t.head);
            for span in &t.spans {
                out.push_str("${");
                out.push_str(&format(&span.ast));
                out.push('}');
                out.push_str(&span.literal);
            }
            out.push('`');
            out
        }
        AstKind::Tuple(t) => {
            let mut parts: Vec<String> = t
                .elements
                .iter()
                .map(|e| {
                    if e.is_optional() {
                        format!("{}?", format(e))
                    } else {
                        format(e).to_string()
                    }
                })
                .collect();
            if let Some((head, tail)) = t.rest.split_first() {
                parts.push(format!("...{}[]", array_item(head)));
                parts.extend(tail.iter().map(|e| format(e).to_string()));
            }
            let body = if t.elements.is_empty() && t.rest.len() == 1 {
                format!("{}[]", array_item(&t.rest[0]))
            } else {
                format!("[{}]", parts.join(", "))
            };
            if t.is_mutable {
                body
            } else {
                format!("readonly {}", body)
            }
        }
        AstKind::TypeLiteral(t) => render_type_literal(t),
        AstKind::Union(u) => {
            if u.types.is_empty() {
                "never".to_string()
            } else {
                u.types
                    .iter()
                    .map(|m| format(m).to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
        }
        AstKind::Declaration(d) => {
            let name = ast
                .annotations
                .get_str(annotations::TITLE)
                .unwrap_or("Declaration");
            if d.type_parameters.is_empty() {
                name.to_string()
            } else {
                format!(
                    "{}<{}>",
                    name,
                    d.type_parameters
                        .iter()
                        .map(|p| format(p).to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
        AstKind::Suspend(_) => "Suspend".to_string(),
    };
    if ast.checks.is_empty() {
        base
    } else {
        let checks: Vec<String> = ast.checks.iter().map(|c| c.label()).collect();
        format!("{} & {}", base, checks.join(" & "))
    }
}

fn array_item(ast: &Ast) -> String {
    let text = format(ast);
    if matches!(ast.kind, AstKind::Union(_)) || !ast.checks.is_empty() {
        format!("({})", text)
    } else {
        text.to_string()
    }
}

fn render_type_literal(t: &TypeLiteral) -> String {
    if t.property_signatures.is_empty() && t.index_signatures.is_empty() {
        return "{}".to_string();
    }
    let mut parts: Vec<String> = t
        .property_signatures
        .iter()
        .map(|p| {
            let readonly = if p.ty.is_mutable_key() { "" } else { "readonly " };
            let optional = if p.ty.is_optional() { "?" } else { "" };
            let name = match &p.name {
                crate::value::PropertyKey::String(s) => quote(s),
                other => format!("[{}]", other),
            };
            format!("{}{}{}: {}", readonly, name, optional, format(&p.ty))
        })
        .collect();
    parts.extend(
        t.index_signatures
            .iter()
            .map(|s| format!("readonly [x: {}]: {}", format(&s.parameter), format(&s.ty))),
    );
    format!("{{ {} }}", parts.join("; "))
}
