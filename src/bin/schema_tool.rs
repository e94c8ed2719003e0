//! Schema Tool CLI
//!
//! Imports JSON Schema, generates Rust schema modules, orders definitions
//! and validates data.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use familiar_schema_engine::codegen::to_code_document;
use familiar_schema_engine::graph::ReferenceGraph;
use familiar_schema_engine::issue::Formatter;
use familiar_schema_engine::parser::{self, ErrorsMode};
use familiar_schema_engine::representation::json_schema::{
    from_json_schema_document, from_json_schema_multi_document, JsonSchemaDocument, JsonSchemaMultiDocument,
};
use familiar_schema_engine::representation::{to_schema, MultiDocument};
use familiar_schema_engine::{Diagnostics, EngineConfig, Value};
use serde_json::{Map, Value as Json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "schema-tool")]
#[command(about = "Import, generate, order and validate schemas")]
struct Cli {
    /// Configuration file (defaults to schema-engine.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Representation document of a JSON Schema
    Import {
        /// JSON Schema file
        schema: PathBuf,

        /// Compact output
        #[arg(long)]
        compact: bool,
    },

    /// Generate a Rust module that rebuilds the schemas
    Codegen {
        /// JSON Schema file, or a directory of them (one definition per file)
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print definitions in dependency order
    Order {
        /// JSON Schema file
        schema: PathBuf,

        /// GraphViz DOT instead of JSON
        #[arg(long)]
        dot: bool,
    },

    /// Decode a data file against a schema
    Validate {
        /// JSON Schema file
        #[arg(short, long)]
        schema: PathBuf,

        /// JSON data file
        #[arg(short, long)]
        data: PathBuf,

        /// Report every issue instead of the first
        #[arg(long)]
        all: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_ref().map(|p| p.display().to_string());
    let config = EngineConfig::load_from(config_path.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Import { schema, compact } => {
            let document = JsonSchemaDocument::from_root(&read_json(&schema)?, &config.json_schema);
            let (document, diagnostics) = from_json_schema_document(&document, &config.json_schema)
                .with_context(|| format!("failed to import {}", schema.display()))?;
            report(&diagnostics);
            let output = if compact {
                serde_json::to_string(&document)?
            } else {
                serde_json::to_string_pretty(&document)?
            };
            println!("{}", output);
            Ok(())
        }

        Commands::Codegen { input, output } => {
            let (document, mut diagnostics) = if input.is_dir() {
                load_directory(&input, &config)?
            } else {
                let root = JsonSchemaDocument::from_root(&read_json(&input)?, &config.json_schema);
                let (document, diagnostics) = from_json_schema_document(&root, &config.json_schema)
                    .with_context(|| format!("failed to import {}", input.display()))?;
                (document.to_multi(), diagnostics)
            };
            let (code, codegen_diagnostics) = to_code_document(&document, &config.codegen)?;
            diagnostics.merge(codegen_diagnostics);
            report(&diagnostics);

            let source = code.render(&config.codegen);
            match output {
                Some(path) => {
                    std::fs::write(&path, source).with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "wrote generated module");
                    println!("✅ Generated {} definition(s) into {}", document.references.len(), path.display());
                }
                None => print!("{}", source),
            }
            Ok(())
        }

        Commands::Order { schema, dot } => {
            let root = JsonSchemaDocument::from_root(&read_json(&schema)?, &config.json_schema);
            let (document, diagnostics) = from_json_schema_document(&root, &config.json_schema)
                .with_context(|| format!("failed to import {}", schema.display()))?;
            report(&diagnostics);
            let graph = ReferenceGraph::from_references(&document.references);
            if dot {
                print!("{}", graph.to_dot());
            } else {
                println!("{}", serde_json::to_string_pretty(&graph.topological_sort())?);
            }
            Ok(())
        }

        Commands::Validate { schema, data, all } => {
            let root = JsonSchemaDocument::from_root(&read_json(&schema)?, &config.json_schema);
            let (document, diagnostics) = from_json_schema_document(&root, &config.json_schema)
                .with_context(|| format!("failed to import {}", schema.display()))?;
            report(&diagnostics);
            let ast = to_schema(&document)?;

            let mut options = config.parse_options();
            if all {
                options = options.with_errors(ErrorsMode::All);
            }
            let input = Value::from_json(&read_json(&data)?);
            match parser::decode_unknown_result(&ast, input, &options) {
                Ok(_) => {
                    println!("✅ {} is valid", data.display());
                    Ok(())
                }
                Err(issue) => {
                    println!("❌ {} is invalid", data.display());
                    println!("{}", Formatter::new().format(&issue));
                    std::process::exit(1);
                }
            }
        }
    }
}

fn read_json(path: &Path) -> Result<Json> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Every `*.json` file under `dir` becomes a definition named after its stem
fn load_directory(dir: &Path, config: &EngineConfig) -> Result<(MultiDocument, Diagnostics)> {
    let options = &config.json_schema;
    let mut definitions = Map::new();
    let mut schemas = Vec::new();

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().map_or(false, |ext| ext == "json"))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let root = JsonSchemaDocument::from_root(&read_json(&path)?, options);
        for (nested, schema) in root.definitions {
            if definitions.contains_key(&nested) {
                debug!(definition = %nested, file = %path.display(), "definition already loaded, keeping the first");
                continue;
            }
            definitions.insert(nested, schema);
        }
        if definitions.contains_key(&name) {
            bail!("duplicate definition {} from {}", name, path.display());
        }
        definitions.insert(name.clone(), root.schema);
        schemas.push(serde_json::json!({ "$ref": format!("#/{}/{}", options.definitions_key, name) }));
        debug!(definition = %name, file = %path.display(), "loaded schema file");
    }

    let document = JsonSchemaMultiDocument { schemas, definitions };
    let (document, diagnostics) = from_json_schema_multi_document(&document, options)
        .with_context(|| format!("failed to import {}", dir.display()))?;
    Ok((document, diagnostics))
}

fn report(diagnostics: &Diagnostics) {
    if !diagnostics.is_empty() {
        eprintln!("{}", diagnostics);
    }
}
