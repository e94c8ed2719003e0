//! Code Generation
//!
//! Turns a [`MultiDocument`] into a Rust module that rebuilds the same
//! schemas with this crate's constructors.
//!
//! Architecture:
//! - graph::topological_sort: emission order and which definitions recurse
//! - NameResolver: every reference gets its function name BEFORE emission
//! - Emitter: one runtime expression plus type text per node
//!
//! Every named definition becomes a `pub fn name() -> Ast` backed by a
//! `Lazy` so repeated calls share one node. Recursive definitions are
//! wrapped in `ast::suspend` so building them never re-enters the `Lazy`.

pub mod config;
pub mod names;
pub mod rust;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ast::annotations;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::graph::topological_sort;
use crate::representation::{MultiDocument, Representation};

pub use config::CodegenConfig;
pub use names::NameResolver;
pub use rust::{Artifact, ArtifactKind, Artifacts, Emitter};

// =============================================================================
// Code Document
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// A Rust expression of type `Ast`
    pub runtime: String,
    /// The described type, as shown in doc comments
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCode {
    /// The reference name in the source document
    pub name: String,
    /// The generated function name
    pub identifier: String,
    pub code: Code,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReferences {
    /// Dependencies before dependents
    pub non_recursives: Vec<NamedCode>,
    /// Keyed by reference name
    pub recursives: IndexMap<String, NamedCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDocument {
    /// One per top-level representation
    pub codes: Vec<Code>,
    pub references: CodeReferences,
    pub artifacts: Vec<Artifact>,
}

/// Generate code for every representation and reference in `document`
pub fn to_code_document(document: &MultiDocument, config: &CodegenConfig) -> Result<(CodeDocument, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let sort = topological_sort(&document.references);
    let mut names = NameResolver::build(document.references.keys().map(String::as_str), &mut diagnostics);
    let mut artifacts = Artifacts::default();
    artifacts.import(config.use_line("ast::{self, Ast}"));

    let mut emitter = Emitter {
        config,
        names: &mut names,
        artifacts: &mut artifacts,
        diagnostics: &mut diagnostics,
    };

    let mut references = CodeReferences::default();
    for name in &sort.non_recursives {
        let code = emit_definition(&mut emitter, name, &document.references[name])?;
        references.non_recursives.push(code);
    }
    for name in &sort.recursives {
        let code = emit_definition(&mut emitter, name, &document.references[name])?;
        references.recursives.insert(name.clone(), code);
    }
    let codes = document
        .representations
        .iter()
        .map(|rep| {
            Ok(Code {
                runtime: emitter.runtime(rep)?,
                ty: rust::type_text(rep),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let artifacts = artifacts.into_vec();
    debug!(
        codes = codes.len(),
        references = references.non_recursives.len() + references.recursives.len(),
        artifacts = artifacts.len(),
        "generated code document"
    );
    Ok((
        CodeDocument {
            codes,
            references,
            artifacts,
        },
        diagnostics,
    ))
}

fn emit_definition(emitter: &mut Emitter<'_>, name: &str, rep: &Representation) -> Result<NamedCode> {
    let identifier = emitter.names.resolve(name, emitter.diagnostics);
    // the rebuilt definition keeps its reference name
    let mut rep = rep.clone();
    if !rep.annotations.contains_key(annotations::IDENTIFIER) {
        rep.annotations
            .insert(annotations::IDENTIFIER.to_string(), serde_json::Value::from(name));
    }
    Ok(NamedCode {
        name: name.to_string(),
        identifier,
        code: Code {
            runtime: emitter.runtime(&rep)?,
            ty: rust::type_text(&rep),
        },
    })
}

// =============================================================================
// Rendering
// =============================================================================

impl CodeDocument {
    /// The full module source
    pub fn render(&self, config: &CodegenConfig) -> String {
        let mut out = String::new();
        if config.emit_header {
            out.push_str("// @generated by schema-tool. Do not edit.\n");
        }
        if let Some(doc) = &config.module_doc {
            for line in doc.lines() {
                out.push_str(&format!("//! {}\n", line).replace("//! \n", "//!\n"));
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }

        let (imports, items): (Vec<&Artifact>, Vec<&Artifact>) =
            self.artifacts.iter().partition(|a| a.kind == ArtifactKind::Import);
        let has_definitions = !self.references.non_recursives.is_empty() || !self.references.recursives.is_empty();
        if has_definitions {
            out.push_str("use once_cell::sync::Lazy;\n");
        }
        for import in imports {
            out.push_str(&import.code);
            out.push('\n');
        }
        for item in items {
            out.push('\n');
            out.push_str(&item.code);
        }

        for named in &self.references.non_recursives {
            out.push('\n');
            render_definition(&mut out, named, false);
        }
        for named in self.references.recursives.values() {
            out.push('\n');
            render_definition(&mut out, named, true);
        }

        out.push('\n');
        out.push_str("pub fn schemas() -> Vec<Ast> {\n    vec![\n");
        for code in &self.codes {
            out.push_str(&format!("        // {}\n        {},\n", code.ty, code.runtime));
        }
        out.push_str("    ]\n}\n");
        info!(bytes = out.len(), "rendered generated module");
        out
    }
}

fn render_definition(out: &mut String, named: &NamedCode, recursive: bool) {
    let body = if recursive {
        format!("ast::suspend(|| {})", named.code.runtime)
    } else {
        named.code.runtime.clone()
    };
    out.push_str(&format!("/// `{}`\n", named.code.ty.replace('`', "\\`")));
    out.push_str(&format!("pub fn {}() -> Ast {{\n", named.identifier));
    out.push_str(&format!("    static SCHEMA: Lazy<Ast> = Lazy::new(|| {});\n", body));
    out.push_str("    SCHEMA.clone()\n}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, check, Ast};
    use crate::representation::from_asts;

    fn generate(schemas: &[Ast]) -> (CodeDocument, Diagnostics) {
        let (document, _) = from_asts(schemas).unwrap();
        to_code_document(&document, &CodegenConfig::default()).unwrap()
    }

    #[test]
    fn test_references_are_ordered_and_named() {
        let user_id = ast::string().check(check::is_min_length(1)).annotate(
            crate::ast::Annotations::new().with(annotations::IDENTIFIER, "UserId"),
        );
        let user = ast::struct_(vec![("id", user_id.clone())])
            .annotate(crate::ast::Annotations::new().with(annotations::IDENTIFIER, "User"));
        let (document, diagnostics) = generate(&[ast::array(user), user_id]);

        let order: Vec<&str> = document
            .references
            .non_recursives
            .iter()
            .map(|n| n.identifier.as_str())
            .collect();
        assert_eq!(order, vec!["user_id", "user"]);
        assert_eq!(document.codes[0].runtime, "ast::array(user())");
        assert_eq!(document.codes[1].runtime, "user_id()");
        assert_eq!(document.codes[0].ty, "readonly User[]");
        assert!(!diagnostics.has_errors());
        assert_eq!(diagnostics.warnings().count(), 0);
    }

    #[test]
    fn test_recursive_definitions_are_suspended() {
        fn tree_schema() -> Ast {
            static TREE: once_cell::sync::Lazy<Ast> = once_cell::sync::Lazy::new(|| {
                ast::struct_(vec![
                    ("value", ast::number()),
                    ("children", ast::array(ast::suspend(tree_schema))),
                ])
                .annotate(crate::ast::Annotations::new().with(annotations::IDENTIFIER, "Tree"))
            });
            TREE.clone()
        }

        let (document, _) = generate(&[tree_schema()]);
        assert!(document.references.non_recursives.is_empty());
        let named = &document.references.recursives["Tree"];
        assert_eq!(named.identifier, "tree");
        assert!(named.code.runtime.contains("ast::array(tree())"));

        let source = document.render(&CodegenConfig::default());
        assert!(source.starts_with("// @generated by schema-tool. Do not edit.\n"));
        assert!(source.contains("use once_cell::sync::Lazy;\n"));
        assert!(source.contains("use familiar_schema_engine::ast::{self, Ast};\n"));
        assert!(source.contains("pub fn tree() -> Ast {\n    static SCHEMA: Lazy<Ast> = Lazy::new(|| ast::suspend(|| ast::struct_("));
        assert!(source.contains("pub fn schemas() -> Vec<Ast> {\n    vec![\n"));
    }

    #[test]
    fn test_module_doc_is_rendered() {
        let (document, _) = generate(&[ast::string()]);
        let config = CodegenConfig::default().with_module_doc("Shared schemas.\n\nRegenerate with schema-tool.");
        let source = document.render(&config);
        assert!(source.contains("//! Shared schemas.\n//!\n//! Regenerate with schema-tool.\n"));
        assert!(!source.contains("once_cell"));
        assert!(source.ends_with("    vec![\n        // string\n        ast::string(),\n    ]\n}\n"));
    }
}
