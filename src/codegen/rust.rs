//! Rust Code Emitter
//!
//! Turns a Representation into a Rust expression that rebuilds it with this
//! crate's constructors, plus the type text shown in doc comments.
//!
//! Key constraints:
//! - References are emitted as calls to their resolved function names
//! - Helper items (symbols, enum member lists, imports) go through
//!   [`Artifacts`] so identical ones are emitted once

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::trace;

use super::config::CodegenConfig;
use super::names::NameResolver;
use crate::ast::annotations;
use crate::ast::{CheckMeta, Filter, Literal, UnionMode};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::representation::{JsonMap, Representation, RepresentationCheck, RepresentationFilter, RepresentationKind};
use crate::value::{quote, PropertyKey};

// =============================================================================
// Artifacts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ArtifactKind {
    Import,
    Symbol,
    Enum,
}

/// A top-level item the generated module needs
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Function name for symbols and enums; the `use` path for imports
    pub identifier: String,
    pub code: String,
}

/// Deduplicated by generated body: the same symbol or member list is
/// emitted once however many nodes use it
#[derive(Debug, Default)]
pub struct Artifacts {
    by_body: IndexMap<String, Artifact>,
}

impl Artifacts {
    pub fn import(&mut self, line: String) {
        if !self.by_body.contains_key(&line) {
            self.by_body.insert(
                line.clone(),
                Artifact {
                    kind: ArtifactKind::Import,
                    identifier: line.clone(),
                    code: line,
                },
            );
        }
    }

    /// The function name of the item with this body, declaring it if new
    fn item(
        &mut self,
        kind: ArtifactKind,
        seed: &str,
        signature: &str,
        body: String,
        names: &mut NameResolver,
    ) -> String {
        let key = format!("{}{}", signature, body);
        if let Some(existing) = self.by_body.get(&key) {
            trace!(artifact = %existing.identifier, "reusing deduplicated artifact");
            return existing.identifier.clone();
        }
        let identifier = names.fresh(seed);
        let code = format!("fn {}() -> {} {{\n    {}\n}}\n", identifier, signature, body);
        self.by_body.insert(
            key,
            Artifact {
                kind,
                identifier: identifier.clone(),
                code,
            },
        );
        identifier
    }

    pub fn into_vec(self) -> Vec<Artifact> {
        self.by_body.into_values().collect()
    }
}

// =============================================================================
// Emitter
// =============================================================================

pub struct Emitter<'a> {
    pub config: &'a CodegenConfig,
    pub names: &'a mut NameResolver,
    pub artifacts: &'a mut Artifacts,
    pub diagnostics: &'a mut Diagnostics,
}

impl Emitter<'_> {
    /// A Rust expression of type `Ast`
    pub fn runtime(&mut self, rep: &Representation) -> Result<String> {
        use RepresentationKind as K;

        let base = match &rep.kind {
            K::Null => "ast::null()".to_string(),
            K::Undefined => "ast::undefined()".to_string(),
            K::Void => "ast::void()".to_string(),
            K::Never => "ast::never()".to_string(),
            K::Unknown => "ast::unknown()".to_string(),
            K::Any => "ast::any()".to_string(),
            K::String => "ast::string()".to_string(),
            K::Number => "ast::number()".to_string(),
            K::Boolean => "ast::boolean()".to_string(),
            K::BigInt => "ast::bigint()".to_string(),
            K::Symbol => "ast::symbol()".to_string(),
            K::ObjectKeyword => "ast::object_keyword()".to_string(),
            K::Literal { literal } => match literal {
                Literal::BigInt(n) => format!("ast::bigint_literal({})", n),
                other => format!("ast::literal({})", literal_expr(other)),
            },
            K::UniqueSymbol { key } => format!("ast::unique_symbol({}())", self.symbol(key)),
            K::Enums { enums } => {
                self.import("ast::Literal");
                let members: Vec<String> = enums
                    .iter()
                    .map(|(name, value)| format!("({:?}.to_string(), {})", name, literal_value_expr(value)))
                    .collect();
                let body = format!("vec![{}]", members.join(", "));
                let seed = format!("{}_members", rep.annotations.get(annotations::IDENTIFIER).and_then(Json::as_str).unwrap_or("enum"));
                let identifier = self
                    .artifacts
                    .item(ArtifactKind::Enum, &seed, "Vec<(String, Literal)>", body, self.names);
                format!("ast::enums({}())", identifier)
            }
            K::TemplateLiteral { head, spans } => {
                let spans = spans
                    .iter()
                    .map(|span| Ok(format!("({}, {:?}.to_string())", self.runtime(&span.ty)?, span.literal)))
                    .collect::<Result<Vec<_>>>()?;
                format!("ast::template_literal({:?}, vec![{}])", head, spans.join(", "))
            }
            K::Tuple {
                elements,
                rest,
                is_mutable,
            } => {
                let elements = elements
                    .iter()
                    .map(|e| {
                        let runtime = self.runtime(&e.ty)?;
                        Ok(if e.is_optional {
                            format!("{}.optional_key()", runtime)
                        } else {
                            runtime
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let rest = rest.iter().map(|r| self.runtime(r)).collect::<Result<Vec<_>>>()?;
                let tuple = match (elements.is_empty(), rest.as_slice()) {
                    (true, [item]) => format!("ast::array({})", item),
                    (_, []) => format!("ast::tuple(vec![{}])", elements.join(", ")),
                    _ => format!(
                        "ast::tuple_with_rest(vec![{}], vec![{}])",
                        elements.join(", "),
                        rest.join(", ")
                    ),
                };
                if *is_mutable {
                    format!("{}.mutable()", tuple)
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
                    let mut ty = self.runtime(&property.ty)?;
                    if property.is_optional {
                        ty.push_str(".optional_key()");
                    }
                    if property.is_mutable {
                        ty.push_str(".mutable_key()");
                    }
                    if !property.key_annotations.is_empty() {
                        ty = format!("{}.annotate_key({})", ty, self.annotations(&property.key_annotations));
                    }
                    properties.push((self.key(&property.name)?, ty));
                }
                let mut signatures = Vec::with_capacity(index_signatures.len());
                for signature in index_signatures {
                    signatures.push((self.runtime(&signature.parameter)?, self.runtime(&signature.ty)?));
                }
                let string_keys = property_signatures
                    .iter()
                    .all(|p| matches!(p.name, PropertyKey::String(_)));
                match (properties.is_empty(), signatures.as_slice()) {
                    (_, []) if string_keys => format!(
                        "ast::struct_(vec![{}])",
                        properties
                            .iter()
                            .map(|(k, v)| format!("({}, {})", k, v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    (true, [(k, v)]) => format!("ast::record({}, {})", k, v),
                    _ => format!(
                        "ast::type_literal(vec![{}], vec![{}])",
                        properties
                            .iter()
                            .map(|(k, v)| format!("ast::property({}, {})", k, v))
                            .collect::<Vec<_>>()
                            .join(", "),
                        signatures
                            .iter()
                            .map(|(k, v)| format!("ast::index_signature({}, {})", k, v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            }
            K::Union { types, mode } => {
                let members = types.iter().map(|t| self.runtime(t)).collect::<Result<Vec<_>>>()?;
                let constructor = match mode {
                    UnionMode::AnyOf => "ast::union",
                    UnionMode::OneOf => "ast::one_of",
                };
                format!("{}(vec![{}])", constructor, members.join(", "))
            }
            K::Declaration { type_parameters } => {
                let parameters = type_parameters
                    .iter()
                    .map(|p| self.runtime(p))
                    .collect::<Result<Vec<_>>>()?;
                self.declaration(rep, &parameters)?
            }
            K::Reference { reference } => {
                let identifier = self.names.resolve(reference, self.diagnostics);
                format!("{}()", identifier)
            }
        };

        let mut out = base;
        let annotations = emitted_annotations(rep);
        if !annotations.is_empty() {
            out = format!("{}.annotate({})", out, self.annotations(&annotations));
        }
        for check in &rep.checks {
            out = format!("{}.check({})", out, self.check(check)?);
        }
        Ok(out)
    }

    fn import(&mut self, path: &str) {
        let line = self.config.use_line(path);
        self.artifacts.import(line);
    }

    fn symbol(&mut self, key: &str) -> String {
        self.import("value::Symbol");
        let body = format!("Symbol::for_key({:?})", key);
        self.artifacts
            .item(ArtifactKind::Symbol, &format!("symbol_{}", key), "Symbol", body, self.names)
    }

    fn key(&mut self, key: &PropertyKey) -> Result<String> {
        match key {
            PropertyKey::String(s) => Ok(format!("{:?}", s)),
            PropertyKey::Index(i) => Ok(format!("{}usize", i)),
            PropertyKey::Symbol(symbol) => match symbol.key_for() {
                Some(registered) => {
                    let registered = registered.to_string();
                    Ok(format!("{}()", self.symbol(&registered)))
                }
                None => Err(SchemaError::InvalidRepresentation(format!(
                    "cannot generate code for the unregistered symbol key {}",
                    symbol
                ))),
            },
        }
    }

    fn annotations(&mut self, map: &JsonMap) -> String {
        self.import("ast::Annotations");
        let mut out = "Annotations::new()".to_string();
        for (key, value) in map {
            let value = match value {
                Json::String(s) => format!("{:?}", s),
                Json::Bool(b) => b.to_string(),
                other => format!("serde_json::json!({})", other),
            };
            out.push_str(&format!(".with({:?}, {})", key, value));
        }
        out
    }

    fn declaration(&mut self, rep: &Representation, parameters: &[String]) -> Result<String> {
        if let Some(generation) = rep.annotations.get(annotations::GENERATION) {
            if let Some(runtime) = generation.get("runtime").and_then(Json::as_str) {
                match generation.get("import").and_then(Json::as_str) {
                    Some(import) => self.artifacts.import(import.to_string()),
                    None => self.import("ast::builtins"),
                }
                let mut out = runtime.to_string();
                // highest index first so `$1` does not clobber `$10`
                for (i, parameter) in parameters.iter().enumerate().rev() {
                    out = out.replace(&format!("${}", i), parameter);
                }
                return Ok(out);
            }
        }
        let tag = rep
            .annotations
            .get(annotations::TYPE_CONSTRUCTOR)
            .and_then(|c| c.get("_tag"))
            .and_then(Json::as_str);
        match (tag, parameters) {
            (Some("Date"), []) => {
                self.import("ast::builtins");
                Ok("builtins::date()".to_string())
            }
            (Some("Option"), [value]) => {
                self.import("ast::builtins");
                Ok(format!("builtins::option({})", value))
            }
            _ => Err(SchemaError::missing_annotation(
                "code for a declaration",
                annotations::GENERATION,
            )),
        }
    }

    fn check(&mut self, check: &RepresentationCheck) -> Result<String> {
        self.import("ast::check");
        match check {
            RepresentationCheck::Filter(filter) => self.filter(filter),
            RepresentationCheck::FilterGroup { checks, annotations } => {
                let members = checks.iter().map(|f| self.filter(f)).collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "check::group(vec![{}], {})",
                    members.join(", "),
                    self.annotations(annotations)
                ))
            }
        }
    }

    fn filter(&mut self, filter: &RepresentationFilter) -> Result<String> {
        let mut out = check_expr(&filter.meta)?;
        if !filter.annotations.is_empty() {
            out = format!("{}.annotate(&{})", out, self.annotations(&filter.annotations));
        }
        if filter.abort {
            out.push_str(".abort()");
        }
        Ok(out)
    }
}

/// Annotations the constructor does not already set
fn emitted_annotations(rep: &Representation) -> JsonMap {
    match rep.kind {
        RepresentationKind::Declaration { .. } => rep
            .annotations
            .iter()
            .filter(|(key, _)| {
                ![annotations::GENERATION, annotations::TYPE_CONSTRUCTOR, annotations::TITLE].contains(&key.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => rep.annotations.clone(),
    }
}

fn f64_expr(n: f64) -> String {
    if n.is_nan() {
        "f64::NAN".to_string()
    } else if n == f64::INFINITY {
        "f64::INFINITY".to_string()
    } else if n == f64::NEG_INFINITY {
        "f64::NEG_INFINITY".to_string()
    } else {
        format!("{:?}", n)
    }
}

/// Argument for `ast::literal`
fn literal_expr(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => format!("{:?}", s),
        Literal::Number(n) => f64_expr(*n),
        Literal::Boolean(b) => b.to_string(),
        Literal::BigInt(n) => format!("Literal::BigInt({})", n),
    }
}

/// A `Literal` value
fn literal_value_expr(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => format!("Literal::String({:?}.to_string())", s),
        Literal::Number(n) => format!("Literal::Number({})", f64_expr(*n)),
        Literal::Boolean(b) => format!("Literal::Boolean({})", b),
        Literal::BigInt(n) => format!("Literal::BigInt({})", n),
    }
}

fn bigint_bound(text: &str) -> Result<i128> {
    text.parse()
        .map_err(|_| SchemaError::InvalidRepresentation(format!("invalid bigint bound {:?}", text)))
}

fn date_expr(date: &chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "{:?}.parse::<chrono::DateTime<chrono::Utc>>().expect(\"valid date literal\")",
        date.to_rfc3339()
    )
}

/// A `check::is_*` call
pub fn check_expr(meta: &CheckMeta) -> Result<String> {
    Ok(match meta {
        CheckMeta::MinLength { min_length } => format!("check::is_min_length({})", min_length),
        CheckMeta::MaxLength { max_length } => format!("check::is_max_length({})", max_length),
        CheckMeta::Length { length } => format!("check::is_length({})", length),
        CheckMeta::Pattern { regex } => format!("check::is_pattern({:?})", regex),
        CheckMeta::Trimmed => "check::is_trimmed()".to_string(),
        CheckMeta::Lowercased => "check::is_lowercased()".to_string(),
        CheckMeta::Uppercased => "check::is_uppercased()".to_string(),
        CheckMeta::StartsWith { starts_with } => format!("check::is_starts_with({:?})", starts_with),
        CheckMeta::EndsWith { ends_with } => format!("check::is_ends_with({:?})", ends_with),
        CheckMeta::Includes { includes } => format!("check::is_includes({:?})", includes),
        CheckMeta::Int => "check::is_int()".to_string(),
        CheckMeta::Finite => "check::is_finite()".to_string(),
        CheckMeta::GreaterThan { exclusive_minimum } => {
            format!("check::is_greater_than({})", f64_expr(*exclusive_minimum))
        }
        CheckMeta::GreaterThanOrEqualTo { minimum } => {
            format!("check::is_greater_than_or_equal_to({})", f64_expr(*minimum))
        }
        CheckMeta::LessThan { exclusive_maximum } => format!("check::is_less_than({})", f64_expr(*exclusive_maximum)),
        CheckMeta::LessThanOrEqualTo { maximum } => {
            format!("check::is_less_than_or_equal_to({})", f64_expr(*maximum))
        }
        CheckMeta::Between { minimum, maximum } => {
            format!("check::is_between({}, {})", f64_expr(*minimum), f64_expr(*maximum))
        }
        CheckMeta::MultipleOf { divisor } => format!("check::is_multiple_of({})", f64_expr(*divisor)),
        CheckMeta::GreaterThanOrEqualToBigInt { minimum } => {
            format!("check::is_greater_than_or_equal_to_bigint({})", bigint_bound(minimum)?)
        }
        CheckMeta::LessThanOrEqualToBigInt { maximum } => {
            format!("check::is_less_than_or_equal_to_bigint({})", bigint_bound(maximum)?)
        }
        CheckMeta::Unique => "check::is_unique()".to_string(),
        CheckMeta::MinProperties { min_properties } => format!("check::is_min_properties({})", min_properties),
        CheckMeta::MaxProperties { max_properties } => format!("check::is_max_properties({})", max_properties),
        CheckMeta::PropertiesLength { length } => format!("check::is_properties_length({})", length),
        CheckMeta::ValidDate => "check::is_valid_date()".to_string(),
        CheckMeta::GreaterThanDate { date } => format!("check::is_greater_than_date({})", date_expr(date)),
        CheckMeta::LessThanDate { date } => format!("check::is_less_than_date({})", date_expr(date)),
        CheckMeta::MinSize { min_size } => format!("check::is_min_size({})", min_size),
        CheckMeta::MaxSize { max_size } => format!("check::is_max_size({})", max_size),
        CheckMeta::Size { size } => format!("check::is_size({})", size),
    })
}

// =============================================================================
// Type text
// =============================================================================

/// The static type a runtime expression describes, for doc comments
pub fn type_text(rep: &Representation) -> String {
    use RepresentationKind as K;

    let base = match &rep.kind {
        K::Null => "null".to_string(),
        K::Undefined => "undefined".to_string(),
        K::Void => "void".to_string(),
        K::Never => "never".to_string(),
        K::Unknown => "unknown".to_string(),
        K::Any => "any".to_string(),
        K::String => "string".to_string(),
        K::Number => "number".to_string(),
        K::Boolean => "boolean".to_string(),
        K::BigInt => "bigint".to_string(),
        K::Symbol => "symbol".to_string(),
        K::ObjectKeyword => "object".to_string(),
        K::Literal { literal } => literal.to_string(),
        K::UniqueSymbol { key } => format!("Symbol({})", key),
        K::Enums { enums } => enums
            .iter()
            .map(|(_, l)| l.to_string())
            .collect::<Vec<_>>()
            .join(" | "),
        K::TemplateLiteral { head, spans } => {
            let mut out = format!("`{}", head);
            for span in spans {
                out.push_str(&format!("${{{}}}{}", type_text(&span.ty), span.literal));
            }
            out.push('`');
            out
        }
        K::Tuple {
            elements,
            rest,
            is_mutable,
        } => {
            let body = if elements.is_empty() && rest.len() == 1 {
                format!("{}[]", grouped(&rest[0]))
            } else {
                let mut parts: Vec<String> = elements
                    .iter()
                    .map(|e| format!("{}{}", type_text(&e.ty), if e.is_optional { "?" } else { "" }))
                    .collect();
                if let Some((head, tail)) = rest.split_first() {
                    parts.push(format!("...{}[]", grouped(head)));
                    parts.extend(tail.iter().map(type_text));
                }
                format!("[{}]", parts.join(", "))
            };
            if *is_mutable {
                body
            } else {
                format!("readonly {}", body)
            }
        }
        K::TypeLiteral {
            property_signatures,
            index_signatures,
        } => {
            let mut parts: Vec<String> = property_signatures
                .iter()
                .map(|p| {
                    let name = match &p.name {
                        PropertyKey::String(s) => quote(s),
                        other => format!("[{}]", other),
                    };
                    format!(
                        "{}{}{}: {}",
                        if p.is_mutable { "" } else { "readonly " },
                        name,
                        if p.is_optional { "?" } else { "" },
                        type_text(&p.ty)
                    )
                })
                .collect();
            parts.extend(
                index_signatures
                    .iter()
                    .map(|s| format!("readonly [x: {}]: {}", type_text(&s.parameter), type_text(&s.ty))),
            );
            if parts.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", parts.join("; "))
            }
        }
        K::Union { types, .. } if types.is_empty() => "never".to_string(),
        K::Union { types, .. } => types.iter().map(type_text).collect::<Vec<_>>().join(" | "),
        K::Declaration { type_parameters } => {
            let generation = rep
                .annotations
                .get(annotations::GENERATION)
                .and_then(|g| g.get("type"))
                .and_then(Json::as_str);
            let parameters: Vec<String> = type_parameters.iter().map(type_text).collect();
            match generation {
                Some(template) => {
                    let mut out = template.to_string();
                    for (i, parameter) in parameters.iter().enumerate().rev() {
                        out = out.replace(&format!("${}", i), parameter);
                    }
                    out
                }
                None => {
                    let name = rep
                        .annotations
                        .get(annotations::TITLE)
                        .and_then(Json::as_str)
                        .unwrap_or("Declaration");
                    if parameters.is_empty() {
                        name.to_string()
                    } else {
                        format!("{}<{}>", name, parameters.join(", "))
                    }
                }
            }
        }
        K::Reference { reference } => reference.clone(),
    };
    let labels: Vec<String> = rep
        .checks
        .iter()
        .flat_map(|c| c.metas())
        .map(|meta| Filter::from_meta(meta.clone()).label())
        .collect();
    if labels.is_empty() {
        base
    } else {
        format!("{} & {}", base, labels.join(" & "))
    }
}

fn grouped(rep: &Representation) -> String {
    let text = type_text(rep);
    if matches!(rep.kind, RepresentationKind::Union { .. }) || !rep.checks.is_empty() {
        format!("({})", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, check, builtins};
    use crate::representation::from_ast;

    fn emit(schema: &ast::Ast) -> (String, Artifacts) {
        let (document, _) = from_ast(schema).unwrap();
        let config = CodegenConfig::default();
        let mut names = NameResolver::new();
        let mut artifacts = Artifacts::default();
        let mut diagnostics = Diagnostics::new();
        let runtime = Emitter {
            config: &config,
            names: &mut names,
            artifacts: &mut artifacts,
            diagnostics: &mut diagnostics,
        }
        .runtime(&document.representation)
        .unwrap();
        (runtime, artifacts)
    }

    #[test]
    fn test_struct_with_checks() {
        let schema = ast::struct_(vec![
            ("name", ast::string().check(check::is_min_length(1))),
            ("age", ast::number().optional_key()),
        ]);
        let (runtime, artifacts) = emit(&schema);
        assert_eq!(
            runtime,
            "ast::struct_(vec![(\"name\", ast::string().check(check::is_min_length(1))), (\"age\", ast::number().optional_key())])"
        );
        let imports: Vec<String> = artifacts.into_vec().into_iter().map(|a| a.code).collect();
        assert_eq!(imports, vec!["use familiar_schema_engine::ast::check;"]);
    }

    #[test]
    fn test_symbols_are_deduplicated() {
        let key = crate::value::Symbol::for_key("app.kind");
        let schema = ast::tuple(vec![ast::unique_symbol(key.clone()), ast::unique_symbol(key)]);
        let (runtime, artifacts) = emit(&schema);
        assert_eq!(
            runtime,
            "ast::tuple(vec![ast::unique_symbol(symbol_app_kind()), ast::unique_symbol(symbol_app_kind())])"
        );
        let symbols: Vec<Artifact> = artifacts
            .into_vec()
            .into_iter()
            .filter(|a| a.kind == ArtifactKind::Symbol)
            .collect();
        assert_eq!(symbols.len(), 1);
        assert_eq!(
            symbols[0].code,
            "fn symbol_app_kind() -> Symbol {\n    Symbol::for_key(\"app.kind\")\n}\n"
        );
    }

    #[test]
    fn test_declarations_use_generation() {
        let (runtime, _) = emit(&builtins::option(builtins::date()));
        assert_eq!(runtime, "builtins::option(builtins::date())");
    }

    #[test]
    fn test_type_text() {
        let schema = ast::struct_(vec![
            ("tags", ast::array(ast::union(vec![ast::string(), ast::null()]))),
            ("when", builtins::date().optional_key()),
        ]);
        let (document, _) = from_ast(&schema).unwrap();
        assert_eq!(
            type_text(&document.representation),
            "{ readonly \"tags\": readonly (string | null)[]; readonly \"when\"?: Date }"
        );
    }
}
