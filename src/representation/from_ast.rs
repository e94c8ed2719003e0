//! Schema AST to Representation
//!
//! One walk over the AST. Nodes carrying an `identifier` annotation and the
//! targets of `Suspend` nodes are lowered once into the reference table and
//! replaced by a `$ref` everywhere they occur, which is also what breaks
//! cycles. Encodings are lowered as their decoded type.
//!
//! A schema function that rebuilds itself on every call (`fn tree() -> Ast`
//! with `suspend(tree)` inside) yields a new node each time, so identity alone
//! never closes the cycle. An identifier met again while its own definition
//! is still being lowered refers back to that definition. Without an
//! identifier, nesting stops after [`MAX_SUSPEND_DEPTH`] suspends with an error.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{
    Document, Element, IndexSignature, JsonMap, MultiDocument, PropertySignature, References, Representation,
    RepresentationCheck, RepresentationFilter, RepresentationKind, TemplateSpan,
};
use crate::ast::annotations::{self, Annotation, Annotations};
use crate::ast::{type_ast, Ast, AstKind, Check, Filter};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::value::PropertyKey;

/// Lower one schema. Lossy steps are reported, not fatal.
pub fn from_ast(ast: &Ast) -> Result<(Document, Diagnostics)> {
    let mut lowering = Lowering::default();
    let representation = lowering.go(ast, "#")?;
    debug!(references = lowering.references.len(), "lowered schema to representation");
    Ok((
        Document {
            representation,
            references: lowering.references,
        },
        lowering.diagnostics,
    ))
}

/// Lower several schemas into one shared reference table
pub fn from_asts(asts: &[Ast]) -> Result<(MultiDocument, Diagnostics)> {
    let mut lowering = Lowering::default();
    let representations = asts
        .iter()
        .enumerate()
        .map(|(i, ast)| lowering.go(ast, &format!("#/{}", i)))
        .collect::<Result<Vec<_>>>()?;
    Ok((
        MultiDocument {
            representations,
            references: lowering.references,
        },
        lowering.diagnostics,
    ))
}

/// Suspends lowered inside each other before giving up on an anonymous cycle
pub const MAX_SUSPEND_DEPTH: usize = 64;

#[derive(Default)]
struct Lowering {
    references: References,
    /// node identity -> reference name
    names: HashMap<usize, String>,
    taken: HashSet<String>,
    /// identifier -> reference name, while that definition is being lowered
    in_progress: HashMap<String, String>,
    suspend_depth: usize,
    /// keeps named nodes alive so their identities are not reused
    held: Vec<Ast>,
    suspends: usize,
    diagnostics: Diagnostics,
}

impl Lowering {
    fn go(&mut self, ast: &Ast, location: &str) -> Result<Representation> {
        if let AstKind::Suspend(suspend) = &ast.kind {
            if self.suspend_depth >= MAX_SUSPEND_DEPTH {
                return Err(SchemaError::InvalidRepresentation(format!(
                    "{}: more than {} nested suspends; a recursive schema needs an identifier",
                    location, MAX_SUSPEND_DEPTH
                )));
            }
            let target = suspend.resolve();
            self.suspend_depth += 1;
            let representation = self.named(&target, location);
            self.suspend_depth -= 1;
            return representation;
        }
        if ast.identifier().is_some() {
            return self.named(ast, location);
        }
        self.lower(ast, location)
    }

    fn named(&mut self, ast: &Ast, location: &str) -> Result<Representation> {
        if let Some(name) = self.names.get(&ast.id()) {
            return Ok(Representation::reference(name.clone()));
        }
        let identifier = ast.identifier().map(str::to_string);
        if let Some(name) = identifier.as_ref().and_then(|id| self.in_progress.get(id)) {
            return Ok(Representation::reference(name.clone()));
        }
        let name = self.fresh_name(ast);
        self.names.insert(ast.id(), name.clone());
        self.held.push(ast.clone());
        if let Some(identifier) = &identifier {
            self.in_progress.insert(identifier.clone(), name.clone());
        }
        let representation = self.lower(ast, &name);
        if let Some(identifier) = &identifier {
            self.in_progress.remove(identifier);
        }
        let representation = representation?;
        debug!(reference = %name, from = location, "lowered reference");
        self.references.insert(name.clone(), representation);
        Ok(Representation::reference(name))
    }

    fn fresh_name(&mut self, ast: &Ast) -> String {
        let seed = match ast.identifier() {
            Some(identifier) => identifier.to_string(),
            None => {
                self.suspends += 1;
                format!("Suspend{}", self.suspends)
            }
        };
        let mut name = seed.clone();
        let mut n = 1;
        while self.taken.contains(&name) {
            name = format!("{}{}", seed, n);
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }

    fn lower(&mut self, ast: &Ast, location: &str) -> Result<Representation> {
        if ast.encoding.is_some() {
            self.diagnostics.dropped_encoding(location);
            let decoded = type_ast(ast);
            self.held.push(decoded.clone());
            return self.lower(&decoded, location);
        }

        let kind = match &ast.kind {
            AstKind::Null => RepresentationKind::Null,
            AstKind::Undefined => RepresentationKind::Undefined,
            AstKind::Void => RepresentationKind::Void,
            AstKind::Never => RepresentationKind::Never,
            AstKind::Unknown => RepresentationKind::Unknown,
            AstKind::Any => RepresentationKind::Any,
            AstKind::String => RepresentationKind::String,
            AstKind::Number => RepresentationKind::Number,
            AstKind::Boolean => RepresentationKind::Boolean,
            AstKind::BigInt => RepresentationKind::BigInt,
            AstKind::Symbol => RepresentationKind::Symbol,
            AstKind::ObjectKeyword => RepresentationKind::ObjectKeyword,
            AstKind::Literal(literal) => RepresentationKind::Literal {
                literal: literal.clone(),
            },
            AstKind::UniqueSymbol(symbol) => match symbol.key_for() {
                Some(key) => RepresentationKind::UniqueSymbol { key: key.to_string() },
                None => {
                    self.diagnostics.unrepresentable(location, "an unregistered unique symbol");
                    RepresentationKind::Symbol
                }
            },
            AstKind::Enums(members) => RepresentationKind::Enums {
                enums: members.clone(),
            },
            AstKind::TemplateLiteral(template) => RepresentationKind::TemplateLiteral {
                head: template.head.clone(),
                spans: template
                    .spans
                    .iter()
                    .enumerate()
                    .map(|(i, span)| {
                        Ok(TemplateSpan {
                            ty: self.go(&span.ast, &format!("{}/spans/{}", location, i))?,
                            literal: span.literal.clone(),
                        })
                    })
                    .collect::<Result<_>>()?,
            },
            AstKind::Tuple(tuple) => RepresentationKind::Tuple {
                elements: tuple
                    .elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| {
                        Ok(Element {
                            ty: self.go(element, &format!("{}/{}", location, i))?,
                            is_optional: element.is_optional(),
                        })
                    })
                    .collect::<Result<_>>()?,
                rest: tuple
                    .rest
                    .iter()
                    .enumerate()
                    .map(|(i, rest)| self.go(rest, &format!("{}/rest/{}", location, i)))
                    .collect::<Result<_>>()?,
                is_mutable: tuple.is_mutable,
            },
            AstKind::TypeLiteral(literal) => {
                let mut property_signatures = Vec::with_capacity(literal.property_signatures.len());
                for property in &literal.property_signatures {
                    let at = format!("{}/{}", location, key_segment(&property.name));
                    let key_annotations = match &property.ty.context {
                        Some(context) => self.json_annotations(&context.annotations, &at),
                        None => JsonMap::new(),
                    };
                    property_signatures.push(PropertySignature {
                        name: property.name.clone(),
                        ty: self.go(&property.ty, &at)?,
                        is_optional: property.ty.is_optional(),
                        is_mutable: property.ty.is_mutable_key(),
                        key_annotations,
                    });
                }
                let mut index_signatures = Vec::with_capacity(literal.index_signatures.len());
                for (i, signature) in literal.index_signatures.iter().enumerate() {
                    let at = format!("{}/[{}]", location, i);
                    if signature.merge.is_some() {
                        self.diagnostics.unrepresentable(&at, "an index signature merge function");
                    }
                    index_signatures.push(IndexSignature {
                        parameter: self.go(&signature.parameter, &at)?,
                        ty: self.go(&signature.ty, &at)?,
                    });
                }
                RepresentationKind::TypeLiteral {
                    property_signatures,
                    index_signatures,
                }
            }
            AstKind::Union(union) => RepresentationKind::Union {
                types: union
                    .types
                    .iter()
                    .enumerate()
                    .map(|(i, member)| self.go(member, &format!("{}/{}", location, i)))
                    .collect::<Result<_>>()?,
                mode: union.mode,
            },
            AstKind::Declaration(declaration) => {
                if !ast.annotations.contains_key(annotations::TYPE_CONSTRUCTOR) {
                    return Err(SchemaError::missing_annotation(
                        format!("a representation for the declaration at {}", location),
                        annotations::TYPE_CONSTRUCTOR,
                    ));
                }
                RepresentationKind::Declaration {
                    type_parameters: declaration
                        .type_parameters
                        .iter()
                        .enumerate()
                        .map(|(i, parameter)| self.go(parameter, &format!("{}/<{}>", location, i)))
                        .collect::<Result<_>>()?,
                }
            }
            AstKind::Suspend(_) => return self.go(ast, location),
        };

        Ok(Representation {
            kind,
            annotations: self.json_annotations(&ast.annotations, location),
            checks: self.checks(&ast.checks, location),
        })
    }

    fn json_annotations(&mut self, annotations: &Annotations, location: &str) -> JsonMap {
        for (key, value) in annotations.iter() {
            // rebuilt from typeConstructor
            if matches!(value, Annotation::Opaque(_)) && key != annotations::DEFAULT_JSON_SERIALIZER {
                self.diagnostics.dropped_annotation(location, key);
            }
        }
        annotations.to_json_map()
    }

    fn checks(&mut self, checks: &[Check], location: &str) -> Vec<RepresentationCheck> {
        let mut out = Vec::with_capacity(checks.len());
        for check in checks {
            match check {
                Check::Filter(filter) => {
                    if let Some(filter) = self.filter(filter, location) {
                        out.push(RepresentationCheck::Filter(filter));
                    }
                }
                Check::FilterGroup(group) => {
                    let filters: Vec<RepresentationFilter> =
                        group.checks.iter().filter_map(|f| self.filter(f, location)).collect();
                    if !filters.is_empty() {
                        out.push(RepresentationCheck::FilterGroup {
                            checks: filters,
                            annotations: self.json_annotations(&group.annotations, location),
                        });
                    }
                }
            }
        }
        out
    }

    fn filter(&mut self, filter: &Filter, location: &str) -> Option<RepresentationFilter> {
        match &filter.meta {
            Some(meta) => Some(RepresentationFilter {
                meta: meta.clone(),
                annotations: self.json_annotations(&filter.annotations, location),
                abort: filter.abort,
            }),
            None => {
                self.diagnostics.dropped_check(location, &filter.label());
                None
            }
        }
    }
}

fn key_segment(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, builtins, check};
    use crate::diagnostics::DiagnosticCode;
    use crate::transformation;
    use once_cell::sync::Lazy;

    static CATEGORY: Lazy<Ast> = Lazy::new(|| {
        ast::struct_(vec![
            ("name", ast::string()),
            ("children", ast::array(ast::suspend(|| CATEGORY.clone()))),
        ])
        .annotate(Annotations::new().with(annotations::IDENTIFIER, "Category"))
    });

    #[test]
    fn test_identified_nodes_become_references() {
        let (document, diagnostics) = from_ast(&CATEGORY).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(document.representation, Representation::reference("Category"));
        let category = &document.references["Category"];
        assert_eq!(category.references(), vec!["Category".to_string()]);
    }

    fn tree() -> Ast {
        ast::array(ast::suspend(tree)).annotate(Annotations::new().with(annotations::IDENTIFIER, "Tree"))
    }

    fn anonymous_tree() -> Ast {
        ast::array(ast::suspend(anonymous_tree))
    }

    #[test]
    fn test_rebuilt_identified_schema_refers_to_itself() {
        let (document, _) = from_ast(&tree()).unwrap();
        assert_eq!(document.representation, Representation::reference("Tree"));
        assert_eq!(document.references.keys().collect::<Vec<_>>(), vec!["Tree"]);
        assert_eq!(document.references["Tree"].references(), vec!["Tree".to_string()]);
    }

    #[test]
    fn test_rebuilt_anonymous_schema_is_an_error() {
        let err = from_ast(&anonymous_tree()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRepresentation(_)), "{:?}", err);
    }

    #[test]
    fn test_anonymous_suspend_gets_generated_name() {
        let s = ast::suspend(ast::number);
        let (document, _) = from_ast(&ast::tuple(vec![s.clone(), s])).unwrap();
        assert_eq!(document.references.len(), 1);
        assert!(document.references.contains_key("Suspend1"));
    }

    #[test]
    fn test_custom_checks_and_encodings_are_reported() {
        let schema = ast::struct_(vec![
            (
                "age",
                ast::number()
                    .check(check::is_int())
                    .check(check::make_filter(|_| true, Annotations::new())),
            ),
            ("n", ast::string().decode_to(&ast::number(), transformation::number_from_string())),
        ]);
        let (document, diagnostics) = from_ast(&schema).unwrap();
        let codes: Vec<DiagnosticCode> = diagnostics.all().iter().map(|d| d.code).collect();
        assert!(codes.contains(&DiagnosticCode::DroppedCheck));
        assert!(codes.contains(&DiagnosticCode::DroppedEncoding));
        let RepresentationKind::TypeLiteral { property_signatures, .. } = &document.representation.kind else {
            panic!("expected a type literal");
        };
        assert_eq!(property_signatures[0].ty.checks.len(), 1);
        assert_eq!(property_signatures[1].ty.tag(), "Number");
    }

    #[test]
    fn test_declaration_requires_type_constructor() {
        let (document, _) = from_ast(&builtins::date()).unwrap();
        assert_eq!(document.representation.tag(), "Declaration");

        let bare = ast::declaration(Vec::new(), std::sync::Arc::new(|_: &[Ast]| -> ast::DeclarationParser {
            std::sync::Arc::new(|v: &crate::value::Value, _: &Ast, _: &crate::parser::ParseOptions| {
                crate::effect::SchemaResult::succeed(v.clone())
            })
        }));
        match from_ast(&bare) {
            Err(SchemaError::MissingAnnotation { annotation, .. }) => {
                assert_eq!(annotation, annotations::TYPE_CONSTRUCTOR)
            }
            other => panic!("unexpected {:?}", other.map(|(d, _)| d)),
        }
    }

    #[test]
    fn test_property_context_is_kept() {
        let schema = ast::struct_(vec![(
            "a",
            ast::string()
                .optional_key()
                .annotate_key(Annotations::new().with(annotations::MESSAGE_MISSING_KEY, "need a")),
        )]);
        let (document, _) = from_ast(&schema).unwrap();
        let RepresentationKind::TypeLiteral { property_signatures, .. } = &document.representation.kind else {
            panic!("expected a type literal");
        };
        assert!(property_signatures[0].is_optional);
        assert_eq!(
            property_signatures[0].key_annotations.get(annotations::MESSAGE_MISSING_KEY),
            Some(&serde_json::json!("need a"))
        );
    }
}
