//! Configuration management for the schema engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-engine.toml)
//! - Environment variables (SCHEMA_ENGINE__*)
//!
//! ## Example config file (schema-engine.toml):
//! ```toml
//! [parse]
//! errors = "all"
//! on_excess_property = "error"
//!
//! [json_schema]
//! additional_properties_false = true
//! definitions_key = "definitions"
//!
//! [codegen]
//! crate_path = "familiar_schema_engine"
//! emit_header = true
//! module_doc = "Generated schemas."
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::codegen::CodegenConfig;
use crate::error::Result;
use crate::parser::{ErrorsMode, ExcessPropertyPolicy, ParseOptions};
use crate::representation::json_schema::JsonSchemaOptions;

/// Main configuration for the schema engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default parse options
    #[serde(default)]
    pub parse: ParseConfig,

    /// JSON Schema import and export
    #[serde(default)]
    pub json_schema: JsonSchemaOptions,

    /// Rust code generation
    #[serde(default)]
    pub codegen: CodegenConfig,
}

/// Parse configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Stop at the first issue or collect all of them
    #[serde(default)]
    pub errors: ErrorsMode,

    /// What type literals do with undeclared keys
    #[serde(default)]
    pub on_excess_property: ExcessPropertyPolicy,
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an explicit file taking precedence over the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["schema-engine.toml", ".schema-engine.toml", "config/schema-engine.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-engine") {
            let xdg_config = config_dir.config_dir().join("schema-engine.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_ENGINE__PARSE__ERRORS=all
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_ENGINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        debug!(?config, "loaded engine configuration");
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::default()
            .with_errors(self.parse.errors)
            .with_excess_property(self.parse.on_excess_property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.parse_options(), ParseOptions::default());
        assert_eq!(config.json_schema.definitions_key, "$defs");
        assert!(config.codegen.emit_header);
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[parse]"));
        assert!(toml_str.contains("[json_schema]"));
        assert!(toml_str.contains("[codegen]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[parse]\nerrors = \"all\"\non_excess_property = \"error\"\n\n[json_schema]\ndefinitions_key = \"definitions\"\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(path.to_str()).unwrap();
        assert_eq!(
            config.parse_options(),
            ParseOptions::all_errors().with_excess_property(ExcessPropertyPolicy::Error)
        );
        assert_eq!(config.json_schema.definitions_key, "definitions");
        assert!(!config.json_schema.additional_properties_false);
    }

    #[test]
    fn test_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = EngineConfig::default();
        config.codegen = config.codegen.with_module_doc("Schemas");
        config.parse.errors = ErrorsMode::All;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded, config);
    }
}
