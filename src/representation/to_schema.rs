//! Representation to Schema AST
//!
//! References resolve through slots. A slot is `NotStarted` until first
//! use, `Building` while its definition is being rebuilt and `Done` after.
//! A reference met while its own slot is `Building` is a cycle: it becomes
//! a `Suspend` reading the slot's cell once the build has finished. A
//! failed build puts the slot back to `NotStarted`, so nothing broken is
//! cached; a placeholder whose cell is never filled reads as `Never`.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Document, MultiDocument, References, Representation, RepresentationCheck, RepresentationFilter, RepresentationKind};
use crate::ast::annotations::{self, Annotations};
use crate::ast::{self, builtins, Ast, Check, Filter};
use crate::error::{Result, SchemaError};
use crate::value::Symbol;

pub fn to_schema(document: &Document) -> Result<Ast> {
    let mut resolver = Resolver::new(&document.references);
    resolver.build(&document.representation)
}

pub fn to_schemas(document: &MultiDocument) -> Result<Vec<Ast>> {
    let mut resolver = Resolver::new(&document.references);
    document
        .representations
        .iter()
        .map(|rep| resolver.build(rep))
        .collect()
}

/// Rebuild every named definition, in table order
pub fn to_schema_references(references: &References) -> Result<Vec<(String, Ast)>> {
    let mut resolver = Resolver::new(references);
    references
        .keys()
        .map(|name| Ok((name.clone(), resolver.reference(name)?)))
        .collect()
}

enum SlotState {
    NotStarted,
    Building,
    Done(Ast),
}

struct Slot {
    state: SlotState,
    cell: Arc<OnceCell<Ast>>,
}

struct Resolver<'a> {
    references: &'a References,
    slots: HashMap<String, Slot>,
}

impl<'a> Resolver<'a> {
    fn new(references: &'a References) -> Self {
        Self {
            references,
            slots: HashMap::new(),
        }
    }

    fn reference(&mut self, name: &str) -> Result<Ast> {
        let references = self.references;
        let definition = references
            .get(name)
            .ok_or_else(|| SchemaError::UnresolvedReference(name.to_string()))?;

        let slot = self.slots.entry(name.to_string()).or_insert_with(|| Slot {
            state: SlotState::NotStarted,
            cell: Arc::new(OnceCell::new()),
        });
        let pending = match &slot.state {
            SlotState::Done(ast) => return Ok(ast.clone()),
            SlotState::Building => Some(slot.cell.clone()),
            SlotState::NotStarted => None,
        };
        if let Some(cell) = pending {
            trace!(reference = name, "cyclic reference, suspending");
            return Ok(ast::suspend(move || cell.get().cloned().unwrap_or_else(ast::never)));
        }
        slot.state = SlotState::Building;

        match self.build(definition) {
            Ok(built) => {
                let built = if built.identifier() == Some(name) {
                    built
                } else {
                    built.annotate(Annotations::new().with(annotations::IDENTIFIER, name))
                };
                if let Some(slot) = self.slots.get_mut(name) {
                    // already set only if a previous build of this name succeeded
                    let _ = slot.cell.set(built.clone());
                    slot.state = SlotState::Done(built.clone());
                }
                debug!(reference = name, "resolved reference");
                Ok(built)
            }
            Err(error) => {
                if let Some(slot) = self.slots.get_mut(name) {
                    slot.state = SlotState::NotStarted;
                }
                Err(error)
            }
        }
    }

    fn build(&mut self, rep: &Representation) -> Result<Ast> {
        use RepresentationKind as K;

        let out = match &rep.kind {
            K::Null => ast::null(),
            K::Undefined => ast::undefined(),
            K::Void => ast::void(),
            K::Never => ast::never(),
            K::Unknown => ast::unknown(),
            K::Any => ast::any(),
            K::String => ast::string(),
            K::Number => ast::number(),
            K::Boolean => ast::boolean(),
            K::BigInt => ast::bigint(),
            K::Symbol => ast::symbol(),
            K::ObjectKeyword => ast::object_keyword(),
            K::Literal { literal } => ast::literal(literal.clone()),
            K::UniqueSymbol { key } => ast::unique_symbol(Symbol::for_key(key)),
            K::Enums { enums } => ast::enums(enums.clone()),
            K::TemplateLiteral { head, spans } => ast::template_literal(
                head.clone(),
                spans
                    .iter()
                    .map(|span| Ok((self.build(&span.ty)?, span.literal.clone())))
                    .collect::<Result<_>>()?,
            ),
            K::Tuple {
                elements,
                rest,
                is_mutable,
            } => {
                let elements = elements
                    .iter()
                    .map(|element| {
                        let ty = self.build(&element.ty)?;
                        Ok(if element.is_optional { ty.optional_key() } else { ty })
                    })
                    .collect::<Result<_>>()?;
                let rest = rest.iter().map(|r| self.build(r)).collect::<Result<_>>()?;
                let tuple = ast::tuple_with_rest(elements, rest);
                if *is_mutable {
                    tuple.mutable()
                } else {
                    tuple
                }
            }
            K::TypeLiteral {
                property_signatures,
                index_signatures,
            } => {
                let mut properties = Vec::with_capacity(property_signatures.len());
                for property in property_signatures {
                    let mut ty = self.build(&property.ty)?;
                    if property.is_optional {
                        ty = ty.optional_key();
                    }
                    if property.is_mutable {
                        ty = ty.mutable_key();
                    }
                    if !property.key_annotations.is_empty() {
                        ty = ty.annotate_key(Annotations::from_json_map(&property.key_annotations));
                    }
                    properties.push(ast::property(property.name.clone(), ty));
                }
                let mut signatures = Vec::with_capacity(index_signatures.len());
                for signature in index_signatures {
                    signatures.push(ast::index_signature(
                        self.build(&signature.parameter)?,
                        self.build(&signature.ty)?,
                    ));
                }
                ast::type_literal(properties, signatures)
            }
            K::Union { types, mode } => ast::union_with_mode(
                types.iter().map(|t| self.build(t)).collect::<Result<_>>()?,
                *mode,
            ),
            K::Declaration { type_parameters } => {
                let parameters: Vec<Ast> = type_parameters.iter().map(|p| self.build(p)).collect::<Result<_>>()?;
                construct(rep, parameters)?
            }
            K::Reference { reference } => return self.reference(reference),
        };

        let out = if rep.annotations.is_empty() {
            out
        } else {
            out.annotate(Annotations::from_json_map(&rep.annotations))
        };
        Ok(if rep.checks.is_empty() {
            out
        } else {
            out.with_checks(rep.checks.iter().map(check).collect())
        })
    }
}

/// Rebuild a declaration from its `typeConstructor` tag
fn construct(rep: &Representation, parameters: Vec<Ast>) -> Result<Ast> {
    let tag = rep
        .annotations
        .get(annotations::TYPE_CONSTRUCTOR)
        .and_then(|c| c.get("_tag"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| SchemaError::missing_annotation("a declaration", annotations::TYPE_CONSTRUCTOR))?;
    match (tag, parameters.as_slice()) {
        ("Date", []) => Ok(builtins::date()),
        ("Option", [value]) => Ok(builtins::option(value.clone())),
        _ => Err(SchemaError::InvalidRepresentation(format!(
            "unknown type constructor {} with {} type parameter(s)",
            tag,
            parameters.len()
        ))),
    }
}

fn filter(rep: &RepresentationFilter) -> Filter {
    let filter = Filter::from_meta(rep.meta.clone()).annotate(&Annotations::from_json_map(&rep.annotations));
    if rep.abort {
        filter.abort()
    } else {
        filter
    }
}

fn check(rep: &RepresentationCheck) -> Check {
    match rep {
        RepresentationCheck::Filter(f) => Check::Filter(filter(f)),
        RepresentationCheck::FilterGroup { checks, annotations } => {
            Check::group(checks.iter().map(filter).collect(), Annotations::from_json_map(annotations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::from_ast;
    use super::*;
    use crate::ast::{check, AstKind};
    use crate::parser::{self, ParseOptions};
    use crate::value::Value;
    use serde_json::json;

    fn document(json: serde_json::Value) -> Document {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_rebuilds_checks() {
        let doc = document(json!({
            "representation": {
                "_tag": "String",
                "checks": [{"_tag": "Filter", "meta": {"_tag": "isMinLength", "minLength": 2}}]
            }
        }));
        let schema = to_schema(&doc).unwrap();
        assert!(parser::is_value(&schema, &Value::from("ab")));
        assert!(!parser::is_value(&schema, &Value::from("a")));
    }

    #[test]
    fn test_cyclic_reference_suspends() {
        let doc = document(json!({
            "representation": {"_tag": "Reference", "$ref": "List"},
            "references": {
                "List": {
                    "_tag": "TypeLiteral",
                    "propertySignatures": [
                        {"name": "head", "type": {"_tag": "Number"}},
                        {"name": "tail", "type": {"_tag": "Reference", "$ref": "List"}, "isOptional": true}
                    ]
                }
            }
        }));
        let schema = to_schema(&doc).unwrap();
        assert_eq!(schema.identifier(), Some("List"));
        let list = Value::object([
            ("head", Value::from(1)),
            ("tail", Value::object([("head", Value::from(2))])),
        ]);
        assert!(parser::is_value(&schema, &list));
        let bad = Value::object([("head", Value::from(1)), ("tail", Value::object([("head", Value::from("x"))]))]);
        assert!(!parser::is_value(&schema, &bad));
    }

    #[test]
    fn test_unresolved_reference() {
        let doc = document(json!({"representation": {"_tag": "Reference", "$ref": "Missing"}}));
        assert!(matches!(to_schema(&doc), Err(SchemaError::UnresolvedReference(name)) if name == "Missing"));
    }

    #[test]
    fn test_failed_build_leaves_slot_unfilled() {
        let doc = document(json!({
            "representation": {"_tag": "Reference", "$ref": "Bad"},
            "references": {
                "Bad": {"_tag": "Declaration", "typeParameters": [], "annotations": {"typeConstructor": {"_tag": "Nope"}}}
            }
        }));
        let mut resolver = Resolver::new(&doc.references);
        assert!(resolver.reference("Bad").is_err());
        assert!(matches!(resolver.slots["Bad"].state, SlotState::NotStarted));
        assert!(resolver.slots["Bad"].cell.get().is_none());
    }

    #[test]
    fn test_round_trip_decodes_the_same() {
        let schema = ast::struct_(vec![
            ("name", ast::string().check(check::is_min_length(1))),
            ("tags", ast::array(ast::literals(vec!["a".into(), "b".into()]))),
            ("when", builtins::date().optional_key()),
        ]);
        let (doc, _) = from_ast(&schema).unwrap();
        let rebuilt = to_schema(&doc).unwrap();
        assert!(matches!(rebuilt.kind, AstKind::TypeLiteral(_)));
        let samples = [
            Value::object([("name", Value::from("x")), ("tags", Value::array(vec![Value::from("a")]))]),
            Value::object([("name", Value::from("")), ("tags", Value::array(vec![]))]),
            Value::object([("name", Value::from("x")), ("tags", Value::array(vec![Value::from("c")]))]),
        ];
        for sample in samples {
            let options = ParseOptions::default();
            assert_eq!(
                parser::decode_unknown_result(&schema, sample.clone(), &options).is_ok(),
                parser::decode_unknown_result(&rebuilt, sample, &options).is_ok()
            );
        }
    }
}
