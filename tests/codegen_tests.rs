//! Code Generation Tests
//!
//! Generate modules from the JSON Schema fixtures and check their layout.

use familiar_schema_engine::codegen::{to_code_document, CodegenConfig};
use familiar_schema_engine::representation::json_schema::{
    from_json_schema_document, JsonSchemaDocument, JsonSchemaOptions,
};
use familiar_schema_engine::representation::Document;

fn import(content: &str) -> Document {
    let options = JsonSchemaOptions::default();
    let json: serde_json::Value = serde_json::from_str(content).unwrap();
    let root = JsonSchemaDocument::from_root(&json, &options);
    from_json_schema_document(&root, &options).unwrap().0
}

fn position(source: &str, needle: &str) -> usize {
    source
        .find(needle)
        .unwrap_or_else(|| panic!("{:?} not found in:\n{}", needle, source))
}

#[test]
fn test_person_module_orders_dependencies_first() {
    let document = import(include_str!("fixtures/person.schema.json")).to_multi();
    let config = CodegenConfig::default();
    let (code, diagnostics) = to_code_document(&document, &config).unwrap();
    assert!(!diagnostics.has_errors(), "{}", diagnostics);

    let identifiers: Vec<&str> = code
        .references
        .non_recursives
        .iter()
        .map(|named| named.identifier.as_str())
        .collect();
    assert_eq!(identifiers, vec!["address", "person"]);
    assert!(code.references.recursives.is_empty());
    assert_eq!(code.codes.len(), 1);
    assert_eq!(code.codes[0].runtime, "person()");

    let source = code.render(&config);
    assert!(source.starts_with("// @generated by schema-tool. Do not edit.\n"));
    assert!(position(&source, "pub fn address() -> Ast") < position(&source, "pub fn person() -> Ast"));
    assert!(source.contains("static SCHEMA: Lazy<Ast>"));
    assert!(source.ends_with("    ]\n}\n"));
}

#[test]
fn test_recursive_fixture_generates_suspended_definition() {
    let document = import(include_str!("fixtures/tree.schema.json")).to_multi();
    let config = CodegenConfig::default();
    let (code, _) = to_code_document(&document, &config).unwrap();

    assert!(code.references.non_recursives.is_empty());
    let tree = &code.references.recursives["Tree"];
    assert_eq!(tree.identifier, "tree");
    assert!(tree.code.runtime.contains("ast::array(tree())"), "{}", tree.code.runtime);

    let source = code.render(&config);
    assert!(source.contains("Lazy::new(|| ast::suspend(|| "), "{}", source);
}

#[test]
fn test_cyclic_definitions_are_all_suspended() {
    let document = import(include_str!("fixtures/graph.schema.json")).to_multi();
    let config = CodegenConfig::default();
    let (code, _) = to_code_document(&document, &config).unwrap();

    assert_eq!(
        code.references.recursives.keys().collect::<Vec<_>>(),
        vec!["Product", "Bundle", "Part"]
    );
    let source = code.render(&config);
    assert_eq!(source.matches("ast::suspend(|| ").count(), 3);
    assert!(position(&source, "pub fn line() -> Ast") < position(&source, "pub fn order() -> Ast"));
}
