//! Representation
//!
//! A serializable mirror of the schema AST. Every node kind has a JSON-safe
//! counterpart; cycles and named definitions go through
//! [`Representation::Reference`] into a flat reference table. Transformations,
//! closures and opaque annotations have no representation: lowering drops
//! them with a diagnostic, and declarations survive through their
//! `typeConstructor` annotation.
//!
//! ```text
//! Ast ──from_ast──▶ Document ──json_schema::to_json_schema_document──▶ JSON Schema
//!  ▲                   │  ▲                                                 │
//!  └────to_schema──────┘  └──────json_schema::from_json_schema_document─────┘
//! ```

pub mod from_ast;
pub mod json_schema;
pub mod to_schema;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::{CheckMeta, Literal, UnionMode};
use crate::value::PropertyKey;

pub use from_ast::{from_ast, from_asts};
pub use to_schema::{to_schema, to_schemas};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

fn is_false(b: &bool) -> bool {
    !*b
}

// =============================================================================
// Nodes
// =============================================================================

/// A JSON-safe schema node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    #[serde(flatten)]
    pub kind: RepresentationKind,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub annotations: JsonMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<RepresentationCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag")]
pub enum RepresentationKind {
    Null,
    Undefined,
    Void,
    Never,
    Unknown,
    Any,
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    ObjectKeyword,
    Literal {
        literal: Literal,
    },
    /// Only registered symbols can be rebuilt; `key` is the registry key
    UniqueSymbol {
        key: String,
    },
    Enums {
        enums: Vec<(String, Literal)>,
    },
    TemplateLiteral {
        head: String,
        spans: Vec<TemplateSpan>,
    },
    #[serde(rename_all = "camelCase")]
    Tuple {
        elements: Vec<Element>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rest: Vec<Representation>,
        #[serde(default, skip_serializing_if = "is_false")]
        is_mutable: bool,
    },
    #[serde(rename_all = "camelCase")]
    TypeLiteral {
        property_signatures: Vec<PropertySignature>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        index_signatures: Vec<IndexSignature>,
    },
    Union {
        types: Vec<Representation>,
        mode: UnionMode,
    },
    /// Rebuilt through the node's `typeConstructor` annotation
    #[serde(rename_all = "camelCase")]
    Declaration {
        type_parameters: Vec<Representation>,
    },
    Reference {
        #[serde(rename = "$ref")]
        reference: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpan {
    #[serde(rename = "type")]
    pub ty: Representation,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    #[serde(rename = "type")]
    pub ty: Representation,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySignature {
    pub name: PropertyKey,
    #[serde(rename = "type")]
    pub ty: Representation,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_mutable: bool,
    /// Key-level annotations, e.g. `messageMissingKey`
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub key_annotations: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSignature {
    pub parameter: Representation,
    #[serde(rename = "type")]
    pub ty: Representation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag")]
pub enum RepresentationCheck {
    Filter(RepresentationFilter),
    FilterGroup {
        checks: Vec<RepresentationFilter>,
        #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
        annotations: JsonMap,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationFilter {
    pub meta: CheckMeta,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub annotations: JsonMap,
    #[serde(default, skip_serializing_if = "is_false")]
    pub abort: bool,
}

impl RepresentationCheck {
    pub fn metas(&self) -> Vec<&CheckMeta> {
        match self {
            RepresentationCheck::Filter(filter) => vec![&filter.meta],
            RepresentationCheck::FilterGroup { checks, .. } => checks.iter().map(|f| &f.meta).collect(),
        }
    }
}

impl Representation {
    pub fn new(kind: RepresentationKind) -> Self {
        Self {
            kind,
            annotations: JsonMap::new(),
            checks: Vec::new(),
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(RepresentationKind::Reference {
            reference: name.into(),
        })
    }

    pub fn never() -> Self {
        Self::new(RepresentationKind::Never)
    }

    pub fn unknown() -> Self {
        Self::new(RepresentationKind::Unknown)
    }

    pub fn with_checks(mut self, checks: Vec<RepresentationCheck>) -> Self {
        self.checks.extend(checks);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self) -> &'static str {
        match &self.kind {
            RepresentationKind::Null => "Null",
            RepresentationKind::Undefined => "Undefined",
            RepresentationKind::Void => "Void",
            RepresentationKind::Never => "Never",
            RepresentationKind::Unknown => "Unknown",
            RepresentationKind::Any => "Any",
            RepresentationKind::String => "String",
            RepresentationKind::Number => "Number",
            RepresentationKind::Boolean => "Boolean",
            RepresentationKind::BigInt => "BigInt",
            RepresentationKind::Symbol => "Symbol",
            RepresentationKind::ObjectKeyword => "ObjectKeyword",
            RepresentationKind::Literal { .. } => "Literal",
            RepresentationKind::UniqueSymbol { .. } => "UniqueSymbol",
            RepresentationKind::Enums { .. } => "Enums",
            RepresentationKind::TemplateLiteral { .. } => "TemplateLiteral",
            RepresentationKind::Tuple { .. } => "Tuple",
            RepresentationKind::TypeLiteral { .. } => "TypeLiteral",
            RepresentationKind::Union { .. } => "Union",
            RepresentationKind::Declaration { .. } => "Declaration",
            RepresentationKind::Reference { .. } => "Reference",
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self.kind, RepresentationKind::Never)
    }

    /// Direct children, in declaration order
    pub fn children(&self) -> Vec<&Representation> {
        match &self.kind {
            RepresentationKind::TemplateLiteral { spans, .. } => spans.iter().map(|s| &s.ty).collect(),
            RepresentationKind::Tuple { elements, rest, .. } => {
                elements.iter().map(|e| &e.ty).chain(rest.iter()).collect()
            }
            RepresentationKind::TypeLiteral {
                property_signatures,
                index_signatures,
            } => property_signatures
                .iter()
                .map(|p| &p.ty)
                .chain(index_signatures.iter().flat_map(|s| [&s.parameter, &s.ty]))
                .collect(),
            RepresentationKind::Union { types, .. } => types.iter().collect(),
            RepresentationKind::Declaration { type_parameters } => type_parameters.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Every `$ref` reachable without crossing into the reference table
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<String>) {
        if let RepresentationKind::Reference { reference } = &self.kind {
            if !out.contains(reference) {
                out.push(reference.clone());
            }
        }
        for child in self.children() {
            child.collect_references(out);
        }
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Named definitions by reference name, in insertion order
pub type References = IndexMap<String, Representation>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub representation: Representation,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub references: References,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiDocument {
    pub representations: Vec<Representation>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub references: References,
}

impl Document {
    pub fn to_multi(&self) -> MultiDocument {
        MultiDocument {
            representations: vec![self.representation.clone()],
            references: self.references.clone(),
        }
    }
}

impl MultiDocument {
    /// The dependency edges between reference definitions
    pub fn reference_graph(&self) -> IndexMap<String, Vec<String>> {
        self.references
            .iter()
            .map(|(name, rep)| (name.clone(), rep.references()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_tagged() {
        let rep = Representation::new(RepresentationKind::String)
            .with_annotation("title", "Name")
            .with_checks(vec![RepresentationCheck::Filter(RepresentationFilter {
                meta: CheckMeta::MinLength { min_length: 1 },
                annotations: JsonMap::new(),
                abort: false,
            })]);
        assert_eq!(
            serde_json::to_value(&rep).unwrap(),
            json!({
                "_tag": "String",
                "annotations": {"title": "Name"},
                "checks": [{"_tag": "Filter", "meta": {"_tag": "isMinLength", "minLength": 1}}]
            })
        );
    }

    #[test]
    fn test_reference_round_trips_through_json() {
        let rep = Representation::new(RepresentationKind::TypeLiteral {
            property_signatures: vec![PropertySignature {
                name: PropertyKey::from("next"),
                ty: Representation::reference("Node"),
                is_optional: true,
                is_mutable: false,
                key_annotations: JsonMap::new(),
            }],
            index_signatures: Vec::new(),
        });
        let json = serde_json::to_value(&rep).unwrap();
        assert_eq!(json["propertySignatures"][0]["type"], json!({"_tag": "Reference", "$ref": "Node"}));
        let back: Representation = serde_json::from_value(json).unwrap();
        assert_eq!(back, rep);
        assert_eq!(back.references(), vec!["Node".to_string()]);
    }
}
