//! JSON Schema bridge (Draft 2020-12)
//!
//! Export lowers a [`Document`] to `{schema, definitions}` with `$ref`s into
//! the definitions table. Only JSON-expressible nodes are accepted; run the
//! serializer first (as [`to_json_schema`] does) to turn dates, bigints and
//! symbols into their wire forms.
//!
//! Import reads a JSON Schema document back into a Representation. Unknown
//! keywords are reported as diagnostics and `allOf` is folded with
//! [`combine`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{
    from_ast, to_schema, Document, Element, IndexSignature, JsonMap, MultiDocument, PropertySignature, References,
    Representation, RepresentationCheck, RepresentationFilter, RepresentationKind,
};
use crate::ast::{annotations, encoded_ast, Ast, AstKind, CheckMeta, Literal, UnionMode};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::parser;
use crate::serializer;
use crate::value::{PropertyKey, Value};

pub const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// Annotations copied between JSON Schema and Representation
const CARRIED_ANNOTATIONS: [&str; 5] = [
    annotations::TITLE,
    annotations::DESCRIPTION,
    annotations::DEFAULT,
    annotations::EXAMPLES,
    "format",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonSchemaOptions {
    /// Export closed objects as `additionalProperties: false`, and import
    /// objects without `additionalProperties` as closed
    pub additional_properties_false: bool,
    /// Where definitions live in a root document, e.g. `$defs`
    pub definitions_key: String,
}

impl Default for JsonSchemaOptions {
    fn default() -> Self {
        Self {
            additional_properties_false: false,
            definitions_key: "$defs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaDocument {
    pub schema: Json,
    #[serde(default)]
    pub definitions: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaMultiDocument {
    pub schemas: Vec<Json>,
    #[serde(default)]
    pub definitions: Map<String, Json>,
}

impl JsonSchemaDocument {
    /// A single self-contained schema with definitions inlined under the
    /// configured key
    pub fn to_root(&self, options: &JsonSchemaOptions) -> Json {
        let mut root = match &self.schema {
            Json::Object(map) => map.clone(),
            Json::Bool(true) => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("allOf".to_string(), json!([other]));
                map
            }
        };
        root.insert("$schema".to_string(), json!(DRAFT_2020_12));
        if !self.definitions.is_empty() {
            root.insert(options.definitions_key.clone(), Json::Object(self.definitions.clone()));
        }
        Json::Object(root)
    }

    /// Split a root schema into its body and definitions table
    pub fn from_root(root: &Json, options: &JsonSchemaOptions) -> Self {
        let mut schema = root.clone();
        let mut definitions = Map::new();
        if let Json::Object(map) = &mut schema {
            map.remove("$schema");
            for key in [options.definitions_key.as_str(), "$defs", "definitions"] {
                if let Some(Json::Object(defs)) = map.remove(key) {
                    definitions.extend(defs);
                }
            }
        }
        Self { schema, definitions }
    }
}

// =============================================================================
// Export
// =============================================================================

/// Serializer, then encoded side, then Representation, then JSON Schema
pub fn to_json_schema(ast: &Ast, options: &JsonSchemaOptions) -> Result<(JsonSchemaDocument, Diagnostics)> {
    let wire = encoded_ast(&serializer::json(ast));
    let (document, diagnostics) = from_ast(&wire)?;
    Ok((to_json_schema_document(&document, options)?, diagnostics))
}

pub fn to_json_schema_document(document: &Document, options: &JsonSchemaOptions) -> Result<JsonSchemaDocument> {
    let exporter = Exporter { options };
    Ok(JsonSchemaDocument {
        schema: exporter.go(&document.representation)?,
        definitions: exporter.definitions(&document.references)?,
    })
}

pub fn to_json_schema_multi_document(
    document: &MultiDocument,
    options: &JsonSchemaOptions,
) -> Result<JsonSchemaMultiDocument> {
    let exporter = Exporter { options };
    Ok(JsonSchemaMultiDocument {
        schemas: document
            .representations
            .iter()
            .map(|rep| exporter.go(rep))
            .collect::<Result<_>>()?,
        definitions: exporter.definitions(&document.references)?,
    })
}

struct Exporter<'a> {
    options: &'a JsonSchemaOptions,
}

fn unsupported(tag: &str) -> SchemaError {
    SchemaError::UnsupportedJsonSchema { tag: tag.to_string() }
}

impl Exporter<'_> {
    fn definitions(&self, references: &References) -> Result<Map<String, Json>> {
        references
            .iter()
            .map(|(name, rep)| Ok((name.clone(), self.go(rep)?)))
            .collect()
    }

    fn go(&self, rep: &Representation) -> Result<Json> {
        use RepresentationKind as K;

        let mut out = Map::new();
        let mut is_array = false;
        match &rep.kind {
            K::Undefined | K::Void | K::Symbol | K::UniqueSymbol { .. } | K::BigInt | K::Declaration { .. } => {
                return Err(unsupported(rep.tag()))
            }
            K::Null => {
                out.insert("type".into(), json!("null"));
            }
            K::Never => {
                out.insert("not".into(), json!({}));
            }
            K::Unknown | K::Any => {}
            K::String => {
                out.insert("type".into(), json!("string"));
            }
            K::Number => {
                out.insert("type".into(), json!("number"));
            }
            K::Boolean => {
                out.insert("type".into(), json!("boolean"));
            }
            K::ObjectKeyword => {
                out.insert("anyOf".into(), json!([{"type": "object"}, {"type": "array"}]));
            }
            K::Literal { literal } => {
                let (ty, value) = literal_json(literal).ok_or_else(|| unsupported("BigInt"))?;
                out.insert("type".into(), json!(ty));
                out.insert("const".into(), value);
            }
            K::Enums { enums } => {
                let members = enums
                    .iter()
                    .map(|(name, literal)| {
                        let (_, value) = literal_json(literal).ok_or_else(|| unsupported("BigInt"))?;
                        Ok(json!({"title": name, "const": value}))
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.insert("anyOf".into(), Json::Array(members));
            }
            K::TemplateLiteral { .. } => {
                let template = to_schema(&Document {
                    representation: Representation::new(rep.kind.clone()),
                    references: References::new(),
                })?;
                let AstKind::TemplateLiteral(template) = &template.kind else {
                    return Err(SchemaError::InvalidRepresentation("template literal did not rebuild".into()));
                };
                out.insert("type".into(), json!("string"));
                out.insert("pattern".into(), json!(format!("^{}$", parser::template_pattern(template))));
            }
            K::Tuple { elements, rest, .. } => {
                is_array = true;
                out.insert("type".into(), json!("array"));
                if !elements.is_empty() {
                    let items = elements.iter().map(|e| self.go(&e.ty)).collect::<Result<Vec<_>>>()?;
                    out.insert("prefixItems".into(), Json::Array(items));
                }
                let required = elements.iter().take_while(|e| !e.is_optional).count();
                match rest.as_slice() {
                    [] => {
                        out.insert("items".into(), json!(false));
                    }
                    [item] => {
                        out.insert("items".into(), self.go(item)?);
                    }
                    [_, tail @ ..] => {
                        warn!(tail = tail.len(), "tuple tail elements have no JSON Schema form; widening items");
                        let members = rest.iter().map(|r| self.go(r)).collect::<Result<Vec<_>>>()?;
                        out.insert("items".into(), json!({ "anyOf": members }));
                    }
                }
                let min_items = required + rest.len().saturating_sub(1);
                if min_items > 0 {
                    out.insert("minItems".into(), json!(min_items));
                }
            }
            K::TypeLiteral {
                property_signatures,
                index_signatures,
            } => {
                out.insert("type".into(), json!("object"));
                let mut properties = Map::new();
                let mut required = Vec::new();
                for property in property_signatures {
                    let name = match &property.name {
                        PropertyKey::String(s) => s.clone(),
                        PropertyKey::Index(i) => i.to_string(),
                        PropertyKey::Symbol(_) => return Err(unsupported("Symbol")),
                    };
                    properties.insert(name.clone(), self.go(&property.ty)?);
                    if !property.is_optional {
                        required.push(Json::String(name));
                    }
                }
                if !properties.is_empty() {
                    out.insert("properties".into(), Json::Object(properties));
                }
                if !required.is_empty() {
                    out.insert("required".into(), Json::Array(required));
                }
                for signature in index_signatures {
                    self.index_signature(&mut out, signature)?;
                }
                if index_signatures.is_empty() && self.options.additional_properties_false {
                    out.insert("additionalProperties".into(), json!(false));
                }
            }
            K::Union { types, mode } => {
                if types.is_empty() {
                    out.insert("not".into(), json!({}));
                } else {
                    let members = types.iter().map(|t| self.go(t)).collect::<Result<Vec<_>>>()?;
                    let keyword = match mode {
                        UnionMode::AnyOf => "anyOf",
                        UnionMode::OneOf => "oneOf",
                    };
                    out.insert(keyword.into(), Json::Array(members));
                }
            }
            K::Reference { reference } => {
                out.insert(
                    "$ref".into(),
                    json!(format!("#/{}/{}", self.options.definitions_key, reference)),
                );
            }
        }

        for check in &rep.checks {
            for meta in check.metas() {
                apply_meta(&mut out, meta, is_array);
            }
        }
        for key in CARRIED_ANNOTATIONS {
            if let Some(value) = rep.annotations.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        Ok(Json::Object(out))
    }

    fn index_signature(&self, out: &mut Map<String, Json>, signature: &IndexSignature) -> Result<()> {
        let value = self.go(&signature.ty)?;
        let parameter = &signature.parameter;
        let pattern = match &parameter.kind {
            RepresentationKind::String => parameter.checks.iter().flat_map(|c| c.metas()).find_map(|m| match m {
                CheckMeta::Pattern { regex } => Some(regex.clone()),
                _ => None,
            }),
            RepresentationKind::TemplateLiteral { .. } => self
                .go(parameter)?
                .get("pattern")
                .and_then(Json::as_str)
                .map(str::to_string),
            _ => None,
        };
        match pattern {
            Some(pattern) => {
                let entry = out
                    .entry("patternProperties")
                    .or_insert_with(|| Json::Object(Map::new()));
                if let Json::Object(map) = entry {
                    map.insert(pattern, value);
                }
            }
            None => {
                if !matches!(parameter.kind, RepresentationKind::String) || !parameter.checks.is_empty() {
                    out.insert("propertyNames".into(), self.go(parameter)?);
                }
                let merged = match out.remove("additionalProperties") {
                    Some(existing) => json!({ "anyOf": [existing, value] }),
                    None => value,
                };
                out.insert("additionalProperties".into(), merged);
            }
        }
        Ok(())
    }
}

fn literal_json(literal: &Literal) -> Option<(&'static str, Json)> {
    match literal {
        Literal::String(s) => Some(("string", json!(s))),
        Literal::Number(_) => Some(("number", literal.to_value().to_json()?)),
        Literal::Boolean(b) => Some(("boolean", json!(b))),
        Literal::BigInt(_) => None,
    }
}

/// Insert `key`, moving a conflicting value into `allOf`
fn constrain(out: &mut Map<String, Json>, key: &str, value: Json) {
    match out.get(key) {
        Some(existing) if existing != &value => {
            let entry = out.entry("allOf").or_insert_with(|| Json::Array(Vec::new()));
            if let Json::Array(items) = entry {
                items.push(json!({ key: value }));
            }
        }
        _ => {
            out.insert(key.to_string(), value);
        }
    }
}

fn apply_meta(out: &mut Map<String, Json>, meta: &CheckMeta, is_array: bool) {
    let (min_length, max_length) = if is_array {
        ("minItems", "maxItems")
    } else {
        ("minLength", "maxLength")
    };
    match meta {
        CheckMeta::MinLength { min_length: n } => constrain(out, min_length, json!(n)),
        CheckMeta::MaxLength { max_length: n } => constrain(out, max_length, json!(n)),
        CheckMeta::Length { length } => {
            constrain(out, min_length, json!(length));
            constrain(out, max_length, json!(length));
        }
        CheckMeta::Pattern { regex } => constrain(out, "pattern", json!(regex)),
        CheckMeta::Trimmed => constrain(out, "pattern", json!(r"^\S[\s\S]*\S$|^\S$|^$")),
        CheckMeta::Lowercased => constrain(out, "pattern", json!("^[^A-Z]*$")),
        CheckMeta::Uppercased => constrain(out, "pattern", json!("^[^a-z]*$")),
        CheckMeta::StartsWith { starts_with } => {
            constrain(out, "pattern", json!(format!("^{}", regex::escape(starts_with))))
        }
        CheckMeta::EndsWith { ends_with } => constrain(out, "pattern", json!(format!("{}$", regex::escape(ends_with)))),
        CheckMeta::Includes { includes } => constrain(out, "pattern", json!(regex::escape(includes))),
        CheckMeta::Int => {
            out.insert("type".into(), json!("integer"));
        }
        CheckMeta::GreaterThan { exclusive_minimum } => constrain(out, "exclusiveMinimum", json!(exclusive_minimum)),
        CheckMeta::GreaterThanOrEqualTo { minimum } => constrain(out, "minimum", json!(minimum)),
        CheckMeta::LessThan { exclusive_maximum } => constrain(out, "exclusiveMaximum", json!(exclusive_maximum)),
        CheckMeta::LessThanOrEqualTo { maximum } => constrain(out, "maximum", json!(maximum)),
        CheckMeta::Between { minimum, maximum } => {
            constrain(out, "minimum", json!(minimum));
            constrain(out, "maximum", json!(maximum));
        }
        CheckMeta::MultipleOf { divisor } => constrain(out, "multipleOf", json!(divisor)),
        CheckMeta::Unique => constrain(out, "uniqueItems", json!(true)),
        CheckMeta::MinProperties { min_properties } => constrain(out, "minProperties", json!(min_properties)),
        CheckMeta::MaxProperties { max_properties } => constrain(out, "maxProperties", json!(max_properties)),
        CheckMeta::PropertiesLength { length } => {
            constrain(out, "minProperties", json!(length));
            constrain(out, "maxProperties", json!(length));
        }
        CheckMeta::MinSize { min_size } => {
            constrain(out, if is_array { "minItems" } else { "minProperties" }, json!(min_size))
        }
        CheckMeta::MaxSize { max_size } => {
            constrain(out, if is_array { "maxItems" } else { "maxProperties" }, json!(max_size))
        }
        CheckMeta::Size { size } => {
            let (min, max) = if is_array {
                ("minItems", "maxItems")
            } else {
                ("minProperties", "maxProperties")
            };
            constrain(out, min, json!(size));
            constrain(out, max, json!(size));
        }
        // JSON numbers are finite; bigint and date bounds never reach here
        CheckMeta::Finite
        | CheckMeta::GreaterThanOrEqualToBigInt { .. }
        | CheckMeta::LessThanOrEqualToBigInt { .. }
        | CheckMeta::ValidDate
        | CheckMeta::GreaterThanDate { .. }
        | CheckMeta::LessThanDate { .. } => {}
    }
}

// =============================================================================
// Import
// =============================================================================

/// Keywords read by the importer; anything else is reported
const KNOWN_KEYWORDS: &[&str] = &[
    "$schema", "$id", "$comment", "$ref", "$defs", "definitions", "type", "const", "enum", "anyOf", "oneOf",
    "allOf", "properties", "required", "additionalProperties", "patternProperties", "propertyNames",
    "minProperties", "maxProperties", "prefixItems", "items", "minItems", "maxItems", "uniqueItems", "minLength",
    "maxLength", "pattern", "minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf", "title",
    "description", "default", "examples", "format",
];

pub fn from_json_schema_document(
    document: &JsonSchemaDocument,
    options: &JsonSchemaOptions,
) -> Result<(Document, Diagnostics)> {
    let mut importer = Importer::new(&document.definitions, options);
    let references = importer.definitions()?;
    let representation = importer.go(&document.schema, "#")?;
    Ok((
        Document {
            representation,
            references,
        },
        importer.diagnostics,
    ))
}

pub fn from_json_schema_multi_document(
    document: &JsonSchemaMultiDocument,
    options: &JsonSchemaOptions,
) -> Result<(MultiDocument, Diagnostics)> {
    let mut importer = Importer::new(&document.definitions, options);
    let references = importer.definitions()?;
    let representations = document
        .schemas
        .iter()
        .enumerate()
        .map(|(i, schema)| importer.go(schema, &format!("#/{}", i)))
        .collect::<Result<_>>()?;
    Ok((
        MultiDocument {
            representations,
            references,
        },
        importer.diagnostics,
    ))
}

struct Importer<'a> {
    definitions: &'a Map<String, Json>,
    options: &'a JsonSchemaOptions,
    /// definitions being inlined into an `allOf`
    inlining: HashSet<String>,
    diagnostics: Diagnostics,
}

impl<'a> Importer<'a> {
    fn new(definitions: &'a Map<String, Json>, options: &'a JsonSchemaOptions) -> Self {
        Self {
            definitions,
            options,
            inlining: HashSet::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn definitions(&mut self) -> Result<References> {
        let definitions = self.definitions;
        let mut references = References::new();
        for (name, schema) in definitions {
            let location = format!("#/{}/{}", self.options.definitions_key, name);
            references.insert(name.clone(), self.go(schema, &location)?);
        }
        debug!(definitions = references.len(), "imported JSON Schema definitions");
        Ok(references)
    }

    fn reference_name<'r>(&self, reference: &'r str) -> Option<&'r str> {
        let key_prefix = format!("#/{}/", self.options.definitions_key);
        [key_prefix.as_str(), "#/$defs/", "#/definitions/"]
            .iter()
            .find_map(|prefix| reference.strip_prefix(prefix))
    }

    fn go(&mut self, schema: &Json, location: &str) -> Result<Representation> {
        let map = match schema {
            Json::Bool(true) => return Ok(Representation::unknown()),
            Json::Bool(false) => return Ok(Representation::never()),
            Json::Object(map) => map,
            other => {
                return Err(SchemaError::InvalidJsonSchema(format!(
                    "expected an object or boolean at {}, got {}",
                    location, other
                )))
            }
        };

        for key in map.keys() {
            if !KNOWN_KEYWORDS.contains(&key.as_str()) && *key != self.options.definitions_key {
                self.diagnostics.ignored_keyword(location, key);
            }
        }

        let mut rep = self.body(map, location)?;

        if let Some(Json::Array(members)) = map.get("allOf") {
            for (i, member) in members.iter().enumerate() {
                let at = format!("{}/allOf/{}", location, i);
                let member = self.go(member, &at)?;
                let member = self.inline_reference(member, &at)?;
                let current = self.inline_reference(rep, location)?;
                rep = combine(&current, &member);
            }
        }

        for key in CARRIED_ANNOTATIONS {
            if let Some(value) = map.get(key) {
                rep.annotations.insert(key.to_string(), value.clone());
            }
        }
        Ok(rep)
    }

    /// The node described by everything but `allOf` and annotations
    fn body(&mut self, map: &Map<String, Json>, location: &str) -> Result<Representation> {
        if let Some(reference) = map.get("$ref").and_then(Json::as_str) {
            return Ok(match self.reference_name(reference) {
                Some(name) if self.definitions.contains_key(name) => Representation::reference(name),
                _ => {
                    self.diagnostics.unresolved_ref(location, reference);
                    Representation::unknown()
                }
            });
        }
        if let Some(value) = map.get("const") {
            return Ok(const_representation(value));
        }
        if let Some(Json::Array(values)) = map.get("enum") {
            let mut members: Vec<Representation> = values.iter().map(const_representation).collect();
            return Ok(match members.len() {
                1 => members.remove(0),
                _ => Representation::new(RepresentationKind::Union {
                    types: members,
                    mode: UnionMode::AnyOf,
                }),
            });
        }
        for (keyword, mode) in [("anyOf", UnionMode::AnyOf), ("oneOf", UnionMode::OneOf)] {
            if let Some(Json::Array(members)) = map.get(keyword) {
                if mode == UnionMode::AnyOf {
                    if let Some(enums) = titled_consts(members) {
                        return Ok(Representation::new(RepresentationKind::Enums { enums }));
                    }
                }
                let types = members
                    .iter()
                    .enumerate()
                    .map(|(i, member)| self.go(member, &format!("{}/{}/{}", location, keyword, i)))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Representation::new(RepresentationKind::Union { types, mode }));
            }
        }

        match map.get("type") {
            Some(Json::String(ty)) => self.typed(ty, map, location),
            Some(Json::Array(types)) => {
                let types = types
                    .iter()
                    .filter_map(Json::as_str)
                    .map(|ty| self.typed(ty, map, location))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Representation::new(RepresentationKind::Union {
                    types,
                    mode: UnionMode::AnyOf,
                }))
            }
            Some(other) => Err(SchemaError::InvalidJsonSchema(format!(
                "invalid type {} at {}",
                other, location
            ))),
            None => {
                let inferred = if ["properties", "required", "additionalProperties", "patternProperties", "propertyNames"]
                    .iter()
                    .any(|k| map.contains_key(*k))
                {
                    Some("object")
                } else if ["prefixItems", "items"].iter().any(|k| map.contains_key(*k)) {
                    Some("array")
                } else if ["minLength", "maxLength", "pattern"].iter().any(|k| map.contains_key(*k)) {
                    Some("string")
                } else if ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"]
                    .iter()
                    .any(|k| map.contains_key(*k))
                {
                    Some("number")
                } else {
                    None
                };
                match inferred {
                    Some(ty) => self.typed(ty, map, location),
                    None => Ok(Representation::unknown()),
                }
            }
        }
    }

    fn typed(&mut self, ty: &str, map: &Map<String, Json>, location: &str) -> Result<Representation> {
        let usize_of = |key: &str| map.get(key).and_then(Json::as_u64).map(|n| n as usize);
        let f64_of = |key: &str| map.get(key).and_then(Json::as_f64);
        let mut metas = Vec::new();

        let kind = match ty {
            "null" => RepresentationKind::Null,
            "boolean" => RepresentationKind::Boolean,
            "string" => {
                if let Some(n) = usize_of("minLength") {
                    metas.push(CheckMeta::MinLength { min_length: n });
                }
                if let Some(n) = usize_of("maxLength") {
                    metas.push(CheckMeta::MaxLength { max_length: n });
                }
                if let Some(pattern) = map.get("pattern").and_then(Json::as_str) {
                    metas.push(CheckMeta::Pattern {
                        regex: pattern.to_string(),
                    });
                }
                RepresentationKind::String
            }
            "number" | "integer" => {
                if ty == "integer" {
                    metas.push(CheckMeta::Int);
                }
                if let Some(n) = f64_of("minimum") {
                    metas.push(CheckMeta::GreaterThanOrEqualTo { minimum: n });
                }
                if let Some(n) = f64_of("maximum") {
                    metas.push(CheckMeta::LessThanOrEqualTo { maximum: n });
                }
                if let Some(n) = f64_of("exclusiveMinimum") {
                    metas.push(CheckMeta::GreaterThan { exclusive_minimum: n });
                }
                if let Some(n) = f64_of("exclusiveMaximum") {
                    metas.push(CheckMeta::LessThan { exclusive_maximum: n });
                }
                if let Some(n) = f64_of("multipleOf") {
                    metas.push(CheckMeta::MultipleOf { divisor: n });
                }
                RepresentationKind::Number
            }
            "object" => {
                if let Some(n) = usize_of("minProperties") {
                    metas.push(CheckMeta::MinProperties { min_properties: n });
                }
                if let Some(n) = usize_of("maxProperties") {
                    metas.push(CheckMeta::MaxProperties { max_properties: n });
                }
                self.object(map, location)?
            }
            "array" => {
                let kind = self.array(map, location)?;
                if let RepresentationKind::Tuple { elements, rest, .. } = &kind {
                    if !rest.is_empty() {
                        if let Some(n) = usize_of("minItems").filter(|n| *n > elements.len()) {
                            metas.push(CheckMeta::MinLength { min_length: n });
                        }
                        if let Some(n) = usize_of("maxItems") {
                            metas.push(CheckMeta::MaxLength { max_length: n });
                        }
                    }
                }
                if map.get("uniqueItems") == Some(&Json::Bool(true)) {
                    metas.push(CheckMeta::Unique);
                }
                kind
            }
            other => {
                return Err(SchemaError::InvalidJsonSchema(format!(
                    "unknown type {:?} at {}",
                    other, location
                )))
            }
        };
        Ok(Representation::new(kind).with_checks(metas.into_iter().map(filter).collect()))
    }

    fn object(&mut self, map: &Map<String, Json>, location: &str) -> Result<RepresentationKind> {
        let required: HashSet<&str> = map
            .get("required")
            .and_then(Json::as_array)
            .map(|r| r.iter().filter_map(Json::as_str).collect())
            .unwrap_or_default();

        let mut property_signatures = Vec::new();
        if let Some(Json::Object(properties)) = map.get("properties") {
            for (name, schema) in properties {
                property_signatures.push(PropertySignature {
                    name: PropertyKey::from(name.as_str()),
                    ty: self.go(schema, &format!("{}/properties/{}", location, name))?,
                    is_optional: !required.contains(name.as_str()),
                    is_mutable: false,
                    key_annotations: JsonMap::new(),
                });
            }
        }

        let mut index_signatures = Vec::new();
        if let Some(Json::Object(patterns)) = map.get("patternProperties") {
            for (pattern, schema) in patterns {
                index_signatures.push(IndexSignature {
                    parameter: Representation::new(RepresentationKind::String).with_checks(vec![filter(
                        CheckMeta::Pattern {
                            regex: pattern.clone(),
                        },
                    )]),
                    ty: self.go(schema, &format!("{}/patternProperties/{}", location, pattern))?,
                });
            }
        }

        let parameter = match map.get("propertyNames") {
            Some(names) => self.go(names, &format!("{}/propertyNames", location))?,
            None => Representation::new(RepresentationKind::String),
        };
        match map.get("additionalProperties") {
            Some(Json::Bool(false)) => {}
            Some(schema) => index_signatures.push(IndexSignature {
                parameter,
                ty: self.go(schema, &format!("{}/additionalProperties", location))?,
            }),
            None if self.options.additional_properties_false || !index_signatures.is_empty() => {}
            None => index_signatures.push(IndexSignature {
                parameter,
                ty: Representation::unknown(),
            }),
        }

        Ok(RepresentationKind::TypeLiteral {
            property_signatures,
            index_signatures,
        })
    }

    fn array(&mut self, map: &Map<String, Json>, location: &str) -> Result<RepresentationKind> {
        let min_items = map.get("minItems").and_then(Json::as_u64).unwrap_or(0) as usize;
        let mut elements = Vec::new();
        if let Some(Json::Array(prefix)) = map.get("prefixItems") {
            for (i, schema) in prefix.iter().enumerate() {
                elements.push(Element {
                    ty: self.go(schema, &format!("{}/prefixItems/{}", location, i))?,
                    is_optional: i >= min_items,
                });
            }
        }
        let rest = match map.get("items") {
            Some(Json::Bool(false)) => Vec::new(),
            Some(schema) => vec![self.go(schema, &format!("{}/items", location))?],
            None => vec![Representation::unknown()],
        };
        Ok(RepresentationKind::Tuple {
            elements,
            rest,
            is_mutable: false,
        })
    }

    /// Replace a top-level `$ref` by its definition so `combine` can see
    /// through it; recursive definitions stay references
    fn inline_reference(&mut self, rep: Representation, location: &str) -> Result<Representation> {
        let RepresentationKind::Reference { reference } = &rep.kind else {
            return Ok(rep);
        };
        let name = reference.clone();
        let definitions = self.definitions;
        let Some(schema) = definitions.get(&name) else {
            return Ok(rep);
        };
        if !self.inlining.insert(name.clone()) {
            warn!(reference = %name, at = location, "recursive reference inside allOf kept as-is");
            return Ok(rep);
        }
        let inlined = self.go(schema, location);
        self.inlining.remove(&name);
        inlined
    }
}

fn filter(meta: CheckMeta) -> RepresentationCheck {
    RepresentationCheck::Filter(RepresentationFilter {
        meta,
        annotations: JsonMap::new(),
        abort: false,
    })
}

fn const_representation(value: &Json) -> Representation {
    match Literal::from_value(&Value::from_json(value)) {
        Some(literal) => Representation::new(RepresentationKind::Literal { literal }),
        None if value.is_null() => Representation::new(RepresentationKind::Null),
        // objects and arrays have no literal form
        None => Representation::unknown(),
    }
}

/// `anyOf: [{title, const}, ...]` is how enums are exported
fn titled_consts(members: &[Json]) -> Option<Vec<(String, Literal)>> {
    if members.is_empty() {
        return None;
    }
    members
        .iter()
        .map(|member| {
            let map = member.as_object()?;
            if map.len() != 2 {
                return None;
            }
            let title = map.get("title")?.as_str()?;
            let literal = Literal::from_value(&Value::from_json(map.get("const")?))?;
            Some((title.to_string(), literal))
        })
        .collect()
}

// =============================================================================
// combine
// =============================================================================

/// Intersection of two representations (`allOf`).
///
/// `Unknown` and `Any` absorb; `Never` wins; unions distribute and drop the
/// members that collapse; same-tag nodes merge structurally; anything else
/// is `Never`.
pub fn combine(a: &Representation, b: &Representation) -> Representation {
    use RepresentationKind as K;

    let kind = match (&a.kind, &b.kind) {
        (K::Never, _) | (_, K::Never) => return Representation::never(),
        (K::Unknown | K::Any, _) => return with_meta(b, a, b),
        (_, K::Unknown | K::Any) => return with_meta(a, a, b),
        (K::Union { types, mode }, _) => return distribute(types, *mode, a, |m| combine(m, b)),
        (_, K::Union { types, mode }) => return distribute(types, *mode, b, |m| combine(a, m)),
        (K::Literal { literal: x }, K::Literal { literal: y }) => {
            if x != y {
                return Representation::never();
            }
            a.kind.clone()
        }
        (K::Literal { literal }, other) | (other, K::Literal { literal }) => {
            if !literal_fits(literal, other) {
                return Representation::never();
            }
            K::Literal {
                literal: literal.clone(),
            }
        }
        (K::Enums { enums: x }, K::Enums { enums: y }) => {
            let enums: Vec<(String, Literal)> = x.iter().filter(|(_, l)| y.iter().any(|(_, m)| m == l)).cloned().collect();
            if enums.is_empty() {
                return Representation::never();
            }
            K::Enums { enums }
        }
        (K::TemplateLiteral { .. }, K::String) => a.kind.clone(),
        (K::String, K::TemplateLiteral { .. }) => b.kind.clone(),
        (
            K::TypeLiteral {
                property_signatures: ps,
                index_signatures: is,
            },
            K::TypeLiteral {
                property_signatures: qs,
                index_signatures: js,
            },
        ) => {
            let mut property_signatures: Vec<PropertySignature> = ps
                .iter()
                .map(|p| match qs.iter().find(|q| q.name == p.name) {
                    Some(q) => PropertySignature {
                        name: p.name.clone(),
                        ty: combine(&p.ty, &q.ty),
                        is_optional: p.is_optional && q.is_optional,
                        is_mutable: p.is_mutable && q.is_mutable,
                        key_annotations: merge_maps(&p.key_annotations, &q.key_annotations),
                    },
                    None => p.clone(),
                })
                .collect();
            property_signatures.extend(qs.iter().filter(|q| !ps.iter().any(|p| p.name == q.name)).cloned());
            let mut index_signatures = is.clone();
            for signature in js {
                if !index_signatures.contains(signature) {
                    index_signatures.push(signature.clone());
                }
            }
            K::TypeLiteral {
                property_signatures,
                index_signatures,
            }
        }
        (
            K::Tuple {
                elements: xs,
                rest: xr,
                is_mutable: xm,
            },
            K::Tuple {
                elements: ys,
                rest: yr,
                is_mutable: ym,
            },
        ) => {
            let len = xs.len().max(ys.len());
            let mut elements = Vec::with_capacity(len);
            for i in 0..len {
                let element = match (xs.get(i), ys.get(i)) {
                    (Some(x), Some(y)) => Some(Element {
                        ty: combine(&x.ty, &y.ty),
                        is_optional: x.is_optional && y.is_optional,
                    }),
                    (Some(e), None) => beyond_elements(e, yr),
                    (None, Some(e)) => beyond_elements(e, xr),
                    (None, None) => None,
                };
                match element {
                    Some(element) => elements.push(element),
                    // a required position the other tuple has no room for
                    None => return Representation::never(),
                }
            }
            let rest = match (xr.split_first(), yr.split_first()) {
                (Some((x, tail)), Some((y, _))) => std::iter::once(combine(x, y)).chain(tail.iter().cloned()).collect(),
                _ => Vec::new(),
            };
            K::Tuple {
                elements,
                rest,
                is_mutable: *xm && *ym,
            }
        }
        (K::Reference { reference: x }, K::Reference { reference: y }) if x == y => a.kind.clone(),
        (K::Reference { .. }, _) | (_, K::Reference { .. }) => {
            warn!(left = a.tag(), right = b.tag(), "cannot merge through a reference; keeping the left side");
            a.kind.clone()
        }
        (K::UniqueSymbol { key: x }, K::UniqueSymbol { key: y }) if x == y => a.kind.clone(),
        (x, y) if is_keyword(x) && std::mem::discriminant(x) == std::mem::discriminant(y) => x.clone(),
        _ => return Representation::never(),
    };

    Representation {
        kind,
        annotations: merge_maps(&a.annotations, &b.annotations),
        checks: merge_checks(&a.checks, &b.checks),
    }
}

/// An element past the end of the other tuple's elements: it meets that
/// tuple's rest, or only absence when the other tuple is closed
fn beyond_elements(element: &Element, other_rest: &[Representation]) -> Option<Element> {
    match other_rest.first() {
        Some(rest) => {
            let ty = combine(&element.ty, rest);
            if ty.is_never() && !element.is_optional {
                return None;
            }
            Some(Element {
                ty,
                is_optional: element.is_optional,
            })
        }
        None if element.is_optional => Some(Element {
            ty: Representation::never(),
            is_optional: true,
        }),
        None => None,
    }
}

fn is_keyword(kind: &RepresentationKind) -> bool {
    use RepresentationKind as K;
    matches!(
        kind,
        K::Null
            | K::Undefined
            | K::Void
            | K::String
            | K::Number
            | K::Boolean
            | K::BigInt
            | K::Symbol
            | K::ObjectKeyword
    )
}

fn literal_fits(literal: &Literal, kind: &RepresentationKind) -> bool {
    matches!(
        (literal, kind),
        (Literal::String(_), RepresentationKind::String)
            | (Literal::Number(_), RepresentationKind::Number)
            | (Literal::Boolean(_), RepresentationKind::Boolean)
            | (Literal::BigInt(_), RepresentationKind::BigInt)
    )
}

/// `kind` from `base`, annotations and checks from both sides
fn with_meta(base: &Representation, a: &Representation, b: &Representation) -> Representation {
    Representation {
        kind: base.kind.clone(),
        annotations: merge_maps(&a.annotations, &b.annotations),
        checks: merge_checks(&a.checks, &b.checks),
    }
}

fn distribute(
    types: &[Representation],
    mode: UnionMode,
    union: &Representation,
    f: impl Fn(&Representation) -> Representation,
) -> Representation {
    let mut members: Vec<Representation> = types.iter().map(f).filter(|m| !m.is_never()).collect();
    match members.len() {
        0 => Representation::never(),
        1 => members.remove(0),
        _ => Representation {
            kind: RepresentationKind::Union { types: members, mode },
            annotations: union.annotations.clone(),
            checks: union.checks.clone(),
        },
    }
}

fn merge_maps(a: &JsonMap, b: &JsonMap) -> JsonMap {
    let mut out = a.clone();
    for (key, value) in b {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// Concatenate; a later repeat of a unit check suppresses the earlier one
fn merge_checks(a: &[RepresentationCheck], b: &[RepresentationCheck]) -> Vec<RepresentationCheck> {
    let all: Vec<&RepresentationCheck> = a.iter().chain(b.iter()).collect();
    all.iter()
        .enumerate()
        .filter(|(i, check)| {
            let unit = match check {
                RepresentationCheck::Filter(f) if f.meta.is_unit() => &f.meta,
                _ => return true,
            };
            !all[i + 1..].iter().any(|later| match later {
                RepresentationCheck::Filter(f) => &f.meta == unit,
                _ => false,
            })
        })
        .map(|(_, check)| (*check).clone())
        .collect()
}
