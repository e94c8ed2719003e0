//! Familiar Schema Engine
//!
//! A structural schema engine: schemas are immutable ASTs that validate,
//! decode and encode dynamically-typed [`Value`]s, and that round-trip
//! through a serializable Representation, JSON Schema and generated Rust.
//!
//! ## Features
//!
//! - **Bidirectional codecs**: every node can carry an encoding chain;
//!   encoding is decoding of the flipped schema
//! - **Checks**: refinements with data descriptions that survive export
//! - **Optics**: composable Iso/Lens/Prism/Optional accessors with
//!   structural sharing
//! - **Interchange**: Representation documents, JSON Schema 2020-12 import
//!   and export, Rust code generation
//!
//! ## Architecture
//!
//! ```text
//! ast/            schema nodes, checks, annotations, builtins
//! parser/         compiled (memoized) decoders and encoders
//! issue/          validation failures and their formatting
//! transformation  getters, links and built-in codecs
//! serializer      JSON-safe encoded side of a schema
//! optic/          accessors over Values
//! representation/ Representation documents and JSON Schema
//! graph/          reference graph ordering
//! codegen/        Rust module generation
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod effect;
pub mod error;
pub mod getter;
pub mod graph;
pub mod issue;
pub mod memo;
pub mod optic;
pub mod parser;
pub mod representation;
pub mod serializer;
pub mod transformation;
pub mod tree;
pub mod value;

pub use ast::{Annotations, Ast, AstKind, Check, Literal};
pub use codegen::{to_code_document, CodeDocument, CodegenConfig};
pub use config::EngineConfig;
pub use diagnostics::Diagnostics;
pub use error::{Result, SchemaError};
pub use issue::{Issue, ParseError};
pub use optic::Optic;
pub use parser::{ErrorsMode, ExcessPropertyPolicy, ParseOptions};
pub use representation::{Document, MultiDocument, Representation};
pub use value::{PropertyKey, Symbol, Value};
