//! Codegen Configuration
//!
//! Emission settings only. Ordering, naming and artifact deduplication are
//! config-free; these options shape the rendered module text.

use serde::{Deserialize, Serialize};

/// Settings for [`super::CodeDocument::render`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Path the generated module imports the engine from
    pub crate_path: String,

    /// Prefix the module with a `@generated` marker
    pub emit_header: bool,

    /// Inner doc comment for the generated module
    pub module_doc: Option<String>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            crate_path: "familiar_schema_engine".to_string(),
            emit_header: true,
            module_doc: None,
        }
    }
}

impl CodegenConfig {
    pub fn with_crate_path(mut self, crate_path: impl Into<String>) -> Self {
        self.crate_path = crate_path.into();
        self
    }

    pub fn with_module_doc(mut self, doc: impl Into<String>) -> Self {
        self.module_doc = Some(doc.into());
        self
    }

    /// `use` line for an item under the engine crate
    pub fn use_line(&self, path: &str) -> String {
        format!("use {}::{};", self.crate_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: CodegenConfig = toml::from_str("module_doc = \"Schemas\"").unwrap();
        assert_eq!(config.crate_path, "familiar_schema_engine");
        assert!(config.emit_header);
        assert_eq!(config.module_doc.as_deref(), Some("Schemas"));
    }

    #[test]
    fn test_use_line() {
        let config = CodegenConfig::default().with_crate_path("engine");
        assert_eq!(config.use_line("ast::check"), "use engine::ast::check;");
    }
}
