//! Representation and JSON Schema Tests
//!
//! Import fixtures, rebuild schemas, export them again and check the
//! exported documents with an independent JSON Schema validator.

use familiar_schema_engine::ast::{self, annotations, check, Annotations, Ast};
use familiar_schema_engine::graph::{topological_sort, ReferenceGraph};
use familiar_schema_engine::issue::Formatter;
use familiar_schema_engine::parser::{self, ParseOptions};
use familiar_schema_engine::representation::json_schema::{
    from_json_schema_document, to_json_schema, JsonSchemaDocument, JsonSchemaOptions,
};
use familiar_schema_engine::representation::{from_ast, to_schema, Document, RepresentationKind};
use familiar_schema_engine::{PropertyKey, Value};
use serde_json::json;

fn fixture(content: &str) -> serde_json::Value {
    serde_json::from_str(content).unwrap()
}

fn import(content: &str) -> Document {
    let options = JsonSchemaOptions::default();
    let root = JsonSchemaDocument::from_root(&fixture(content), &options);
    let (document, diagnostics) = from_json_schema_document(&root, &options).unwrap();
    assert!(!diagnostics.has_errors(), "{}", diagnostics);
    document
}

/// Validate with the jsonschema crate, draft 7 keywords only
fn externally_valid(schema: &serde_json::Value, instance: &serde_json::Value) -> bool {
    let mut schema = schema.clone();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
    }
    let compiled = jsonschema::JSONSchema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .compile(&schema)
        .expect("exported schema compiles");
    compiled.is_valid(instance)
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_person_fixture() {
    let document = import(include_str!("fixtures/person.schema.json"));
    assert_eq!(
        document.representation.kind,
        RepresentationKind::Reference {
            reference: "Person".to_string()
        }
    );
    assert_eq!(
        document.references.keys().collect::<Vec<_>>(),
        vec!["Person", "Address"]
    );
    let person = &document.references["Person"];
    assert_eq!(
        person.annotations.get("description"),
        Some(&json!("A person with an optional postal address"))
    );
    assert_eq!(person.references(), vec!["Address".to_string()]);

    let sort = topological_sort(&document.references);
    assert_eq!(sort.non_recursives, vec!["Address", "Person"]);
    assert!(sort.recursives.is_empty());
}

#[test]
fn test_imported_schema_decodes_fixtures() {
    let document = import(include_str!("fixtures/person.schema.json"));
    let person = to_schema(&document).unwrap();

    let valid = Value::from_json(&fixture(include_str!("fixtures/person_valid.json")));
    assert_eq!(
        parser::decode_unknown_result(&person, valid.clone(), &ParseOptions::default()).unwrap(),
        valid
    );

    let invalid = Value::from_json(&fixture(include_str!("fixtures/person_invalid.json")));
    let issue = parser::decode_unknown_result(&person, invalid, &ParseOptions::all_errors()).unwrap_err();
    let leaves = Formatter::new().leaves(&issue);
    let mut paths: Vec<PropertyKey> = leaves.iter().map(|leaf| leaf.path[0].clone()).collect();
    paths.dedup();
    assert_eq!(
        paths,
        vec![PropertyKey::from("name"), PropertyKey::from("age"), PropertyKey::from("tags")]
    );
}

#[test]
fn test_graph_fixture_orders_and_finds_cycle() {
    let document = import(include_str!("fixtures/graph.schema.json"));
    let graph = ReferenceGraph::from_references(&document.references);
    assert_eq!(
        graph.cycles(),
        vec![vec!["Product".to_string(), "Bundle".to_string(), "Part".to_string()]]
    );
    let sort = graph.topological_sort();
    assert_eq!(sort.non_recursives, vec!["Line", "Customer", "Order"]);
    assert_eq!(sort.recursives, vec!["Product", "Bundle", "Part"]);
    assert_eq!(graph.refs_out("Order"), vec!["Line", "Customer"]);
}

#[test]
fn test_recursive_fixture_round_trips_through_json() {
    let document = import(include_str!("fixtures/tree.schema.json"));
    let json = serde_json::to_value(&document).unwrap();
    let back: Document = serde_json::from_value(json).unwrap();
    assert_eq!(back, document);

    let tree = to_schema(&back).unwrap();
    let input = Value::from_json(&json!({
        "value": 1,
        "children": [{"value": 2, "children": []}, {"value": 3, "children": [{"value": 4, "children": []}]}]
    }));
    assert!(parser::is_value(&tree, &input));
    let bad = Value::from_json(&json!({"value": 1, "children": [{"value": "2", "children": []}]}));
    let issue = parser::decode_unknown_result(&tree, bad, &ParseOptions::default()).unwrap_err();
    assert_eq!(
        Formatter::new().format(&issue),
        "Expected number, got \"2\"\n  at [\"children\"][0][\"value\"]"
    );
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_export_is_accepted_by_jsonschema() {
    let document = import(include_str!("fixtures/person.schema.json"));
    let person = to_schema(&document).unwrap();

    let options = JsonSchemaOptions::default();
    let (exported, _) = to_json_schema(&person, &options).unwrap();
    let root = exported.to_root(&options);
    assert_eq!(root["$ref"], json!("#/$defs/Person"));
    assert_eq!(root["$defs"]["Person"]["required"], json!(["name", "age"]));
    assert_eq!(root["$defs"]["Person"]["properties"]["age"]["type"], json!("integer"));

    let valid = fixture(include_str!("fixtures/person_valid.json"));
    let invalid = fixture(include_str!("fixtures/person_invalid.json"));
    assert!(externally_valid(&root, &valid));
    assert!(!externally_valid(&root, &invalid));
}

#[test]
fn test_exported_schema_agrees_with_decoder() {
    let schema = ast::struct_(vec![
        ("id", ast::string().check(check::is_pattern("^[a-z]+-[0-9]+$"))),
        ("score", ast::number().check(check::is_between(0.0, 10.0))),
        (
            "labels",
            ast::array(ast::string().check(check::is_max_length(4))).check(check::is_max_length(2)),
        ),
        ("note", ast::union(vec![ast::string(), ast::null()]).optional_key()),
    ]);
    let options = JsonSchemaOptions::default();
    let (exported, diagnostics) = to_json_schema(&schema, &options).unwrap();
    assert!(diagnostics.is_empty(), "{}", diagnostics);
    let root = exported.to_root(&options);

    let samples = [
        json!({"id": "ab-1", "score": 3, "labels": ["x"]}),
        json!({"id": "ab-1", "score": 3, "labels": [], "note": null}),
        json!({"id": "AB-1", "score": 3, "labels": []}),
        json!({"id": "ab-1", "score": 11, "labels": []}),
        json!({"id": "ab-1", "score": 3, "labels": ["x", "y", "z"]}),
        json!({"id": "ab-1", "score": 3, "labels": ["toolong"]}),
        json!({"id": "ab-1", "labels": []}),
        json!({"id": "ab-1", "score": 3, "labels": [], "note": 1}),
    ];
    for sample in samples {
        let decoded = parser::is_value(&schema, &Value::from_json(&sample));
        assert_eq!(externally_valid(&root, &sample), decoded, "disagreement on {}", sample);
    }
}

#[test]
fn test_export_serializes_dates_and_bigints() {
    let schema = ast::struct_(vec![
        ("at", ast::builtins::date()),
        ("count", ast::bigint()),
    ]);
    let options = JsonSchemaOptions::default();
    let (exported, _) = to_json_schema(&schema, &options).unwrap();
    assert_eq!(
        exported.schema,
        json!({
            "type": "object",
            "properties": {
                "at": {"type": "string"},
                "count": {"type": "string"}
            },
            "required": ["at", "count"]
        })
    );
}

#[test]
fn test_lowering_keeps_named_nodes_shared() {
    let id = ast::string().annotate(Annotations::new().with(annotations::IDENTIFIER, "Id"));
    let pair: Ast = ast::struct_(vec![("left", id.clone()), ("right", id)]);
    let (document, diagnostics) = from_ast(&pair).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(document.references.len(), 1);
    assert_eq!(document.representation.references(), vec!["Id".to_string()]);
    assert_eq!(
        serde_json::to_value(&document.representation).unwrap()["propertySignatures"][1]["type"],
        json!({"_tag": "Reference", "$ref": "Id"})
    );
}
