//! Union parsing with candidate filtering
//!
//! Before any member is tried, members are filtered by what their *encoded*
//! shape could possibly accept: a type-tag set, plus "sentinel" literals
//! (required literal properties such as `_tag: "A"`) that the input must
//! carry. Both are computed once per member node.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::trace;

use super::{go, KindParser, Parser};
use crate::ast::{encoded_ast, Ast, AstKind, AstNode, Literal, Union, UnionMode};
use crate::effect::{sequence_until, SchemaResult, Step};
use crate::issue::Issue;
use crate::memo::IdentityMemo;
use crate::value::{PropertyKey, TypeTag, Value};

struct Candidate {
    tags: u16,
    sentinels: Vec<(PropertyKey, Literal)>,
}

impl Candidate {
    fn accepts(&self, input: &Value) -> bool {
        self.tags & bit(input.type_tag()) != 0
            && self
                .sentinels
                .iter()
                .all(|(key, literal)| input.get(key).map_or(false, |v| literal.matches(v)))
    }
}

static CANDIDATE_MEMO: Lazy<IdentityMemo<AstNode, Arc<Candidate>>> = Lazy::new(IdentityMemo::new);

fn candidate(member: &Ast) -> Arc<Candidate> {
    CANDIDATE_MEMO.get_or_insert_with(member.arc(), || {
        let encoded = encoded_ast(member);
        Arc::new(Candidate {
            tags: tag_mask(&encoded),
            sentinels: sentinels(&encoded),
        })
    })
}

fn bit(tag: TypeTag) -> u16 {
    1 << (tag as u16)
}

const ALL_TAGS: u16 = (1 << TypeTag::ALL.len()) - 1;

fn tag_mask(ast: &Ast) -> u16 {
    match &ast.kind {
        AstKind::Null => bit(TypeTag::Null),
        AstKind::Undefined | AstKind::Void => bit(TypeTag::Undefined),
        AstKind::Never => 0,
        AstKind::String | AstKind::TemplateLiteral(_) => bit(TypeTag::String),
        AstKind::Number => bit(TypeTag::Number),
        AstKind::Boolean => bit(TypeTag::Boolean),
        AstKind::BigInt => bit(TypeTag::BigInt),
        AstKind::Symbol | AstKind::UniqueSymbol(_) => bit(TypeTag::Symbol),
        AstKind::ObjectKeyword => bit(TypeTag::Object) | bit(TypeTag::Array),
        AstKind::Literal(literal) => bit(literal.type_tag()),
        AstKind::Enums(members) => members.iter().fold(0, |acc, (_, l)| acc | bit(l.type_tag())),
        AstKind::Tuple(_) => bit(TypeTag::Array),
        AstKind::TypeLiteral(_) => bit(TypeTag::Object),
        AstKind::Union(u) => u.types.iter().fold(0, |acc, member| acc | tag_mask(member)),
        // opaque or lazy: anything could match
        AstKind::Unknown | AstKind::Any | AstKind::Declaration(_) | AstKind::Suspend(_) => ALL_TAGS,
    }
}

/// Host type tags a node's encoded side can accept
pub fn candidate_tags(ast: &Ast) -> Vec<TypeTag> {
    let mask = tag_mask(&encoded_ast(ast));
    TypeTag::ALL
        .iter()
        .copied()
        .filter(|tag| mask & bit(*tag) != 0)
        .collect()
}

fn sentinels(ast: &Ast) -> Vec<(PropertyKey, Literal)> {
    match &ast.kind {
        AstKind::TypeLiteral(literal) => literal
            .property_signatures
            .iter()
            .filter(|p| !p.ty.is_optional())
            .filter_map(|p| match &p.ty.kind {
                AstKind::Literal(l) => Some((p.name.clone(), l.clone())),
                _ => None,
            })
            .collect(),
        AstKind::Tuple(tuple) => tuple
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_optional())
            .filter_map(|(i, e)| match &e.kind {
                AstKind::Literal(l) => Some((PropertyKey::Index(i), l.clone())),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub(super) fn union(ast: &Ast, union: &Union) -> KindParser {
    let node = ast.downgrade();
    let members: Arc<Vec<(Ast, Parser, Arc<Candidate>)>> = Arc::new(
        union
            .types
            .iter()
            .map(|m| (m.clone(), go(m), candidate(m)))
            .collect(),
    );
    let mode = union.mode;
    trace!(members = members.len(), ?mode, "compiled union candidate index");

    Arc::new(move |input, options| {
        let mut candidates: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, (_, _, c))| c.accepts(&input))
            .map(|(i, _)| i)
            .collect();
        let fallback = candidates.is_empty();
        if fallback {
            candidates = (0..members.len()).collect();
        }

        let steps: Vec<Step<Option<Value>>> = candidates
            .iter()
            .map(|&i| {
                let parser = members[i].1.clone();
                let input = input.clone();
                let options = *options;
                Box::new(move || parser(Some(input), &options)) as Step<Option<Value>>
            })
            .collect();

        let results = match mode {
            UnionMode::AnyOf => sequence_until(steps, |results| matches!(results.last(), Some(Ok(_)))),
            UnionMode::OneOf => {
                sequence_until(steps, |results| results.iter().filter(|r| r.is_ok()).count() > 1)
            }
        };

        let ast = node.upgrade();
        let members = members.clone();
        results.and_then(move |results| {
            SchemaResult::from_result(settle(&ast, &members, &candidates, input, results, fallback, mode))
        })
    })
}

fn settle(
    ast: &Ast,
    members: &[(Ast, Parser, Arc<Candidate>)],
    candidates: &[usize],
    input: Value,
    results: Vec<Result<Option<Value>, Issue>>,
    fallback: bool,
    mode: UnionMode,
) -> Result<Option<Value>, Issue> {
    let mut successes = Vec::new();
    let mut issues = Vec::new();
    for (slot, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => successes.push((candidates[slot], value)),
            Err(issue) => issues.push(issue),
        }
    }

    if successes.len() > 1 && mode == UnionMode::OneOf {
        return Err(Issue::OneOf {
            ast: ast.clone(),
            actual: input,
            successes: successes.iter().map(|(i, _)| members[*i].0.clone()).collect(),
        });
    }
    if let Some((_, value)) = successes.into_iter().next() {
        return Ok(value);
    }

    if fallback {
        return Err(Issue::invalid_type(ast, Some(input)));
    }
    if issues.len() == 1 {
        return Err(issues.remove(0));
    }
    Err(Issue::AnyOf {
        ast: ast.clone(),
        actual: input,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::super::{decode_unknown_result, ParseOptions};
    use super::*;
    use crate::ast;

    fn decode(ast: &Ast, input: Value) -> Result<Value, Issue> {
        decode_unknown_result(ast, input, &ParseOptions::default())
    }

    fn a_and_b() -> (Ast, Ast) {
        (
            ast::struct_(vec![("a", ast::string())]),
            ast::struct_(vec![("b", ast::number())]),
        )
    }

    #[test]
    fn test_any_of_returns_first_match() {
        let (a, b) = a_and_b();
        let u = ast::union(vec![a, b]);
        let input = Value::object([("a", Value::from("x")), ("b", Value::from(1))]);
        let out = decode(&u, input).unwrap();
        assert_eq!(out, Value::object([("a", Value::from("x"))]));
    }

    #[test]
    fn test_one_of_rejects_ambiguity() {
        let (a, b) = a_and_b();
        let u = ast::one_of(vec![a, b]);
        let input = Value::object([("a", Value::from("x")), ("b", Value::from(1))]);
        match decode(&u, input).unwrap_err() {
            Issue::OneOf { successes, .. } => assert_eq!(successes.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        let only_a = Value::object([("a", Value::from("x"))]);
        assert!(decode(&u, only_a).is_ok());
    }

    #[test]
    fn test_no_candidates_is_invalid_type() {
        let u = ast::union(vec![ast::string(), ast::number()]);
        let issue = decode(&u, Value::Null).unwrap_err();
        assert_eq!(issue.tag(), "InvalidType");
    }

    #[test]
    fn test_single_candidate_reports_its_issue() {
        let u = ast::union(vec![ast::string().check(ast::check::is_min_length(2)), ast::number()]);
        let issue = decode(&u, Value::from("a")).unwrap_err();
        assert_eq!(issue.tag(), "Filter");
    }

    #[test]
    fn test_several_candidates_report_any_of() {
        let (a, b) = a_and_b();
        let u = ast::union(vec![a, b]);
        let issue = decode(&u, Value::empty_object()).unwrap_err();
        match issue {
            Issue::AnyOf { issues, .. } => assert_eq!(issues.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sentinels_discriminate() {
        let circle = ast::struct_(vec![("_tag", ast::literal("Circle")), ("radius", ast::number())]);
        let square = ast::struct_(vec![("_tag", ast::literal("Square")), ("side", ast::number())]);
        let u = ast::union(vec![circle, square]);
        let bad = Value::object([("_tag", Value::from("Square")), ("side", Value::from("x"))]);
        // only the square member is attempted, so its issue comes back alone
        let issue = decode(&u, bad).unwrap_err();
        assert!(matches!(issue, Issue::Pointer { ref path, .. } if path == &vec![PropertyKey::from("side")]));
    }

    #[test]
    fn test_candidate_tags_follow_encoded_side() {
        let n = ast::string().decode_to(&ast::number(), crate::transformation::number_from_string());
        assert_eq!(candidate_tags(&n), vec![TypeTag::String]);
        assert_eq!(candidate_tags(&ast::object_keyword()), vec![TypeTag::Array, TypeTag::Object]);
    }
}
